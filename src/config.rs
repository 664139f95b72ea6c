use clap::Parser;
use std::time::Duration;

use crate::error::ConfigError;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "sliding-gate")]
#[command(about = "Per-client sliding window rate limiting gateway")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // How often idle clients are evicted, in seconds
    #[arg(long, env = "SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval: u64,

    // Use X-Forwarded-For / X-Real-IP to identify clients
    #[arg(
        long,
        env = "TRUST_PROXY_HEADERS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub trust_proxy_headers: bool,
}

impl Args {
    pub fn limiter_config(&self) -> Result<LimiterConfig, ConfigError> {
        let config = LimiterConfig {
            limit: self.rate_limit,
            window: Duration::from_secs(self.rate_window),
            sweep_interval: Duration::from_secs(self.sweep_interval),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Settings fixed for the lifetime of a [`RateLimiter`](crate::rate_limit::RateLimiter).
///
/// A `limit` of zero is legal and denies every request. The two durations
/// must be non-zero and at most [`LimiterConfig::MAX_DURATION`]; call [`LimiterConfig::validate`] before constructing a
/// limiter from hand-built values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    pub limit: u32,
    pub window: Duration,
    pub sweep_interval: Duration,
}

impl LimiterConfig {
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
    // Keeps `Instant::now() + duration` from overflowing.
    pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if self.window > Self::MAX_DURATION {
            return Err(ConfigError::WindowTooLarge {
                max: Self::MAX_DURATION,
            });
        }
        if self.sweep_interval > Self::MAX_DURATION {
            return Err(ConfigError::SweepIntervalTooLarge {
                max: Self::MAX_DURATION,
            });
        }
        Ok(())
    }
}
