pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod state;
pub mod telemetry;
mod sweeper;

use axum::{Router, routing::get};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Args;
use crate::error::ConfigError;
use crate::handlers::{health_handler, metrics_handler, whoami_handler};
use crate::middleware::rate_limit_guard;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

// /health and /metrics stay reachable for clients that are rate limited
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/whoami", get(whoami_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_guard,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .with_state(state)
}

/// Validates `args`, starts the limiter and returns the router.
///
/// Cancelling `shutdown` stops the limiter's sweeper.
pub fn build_app(args: &Args, shutdown: CancellationToken) -> Result<Router, ConfigError> {
    let config = args.limiter_config()?;
    let limiter = RateLimiter::new(config, shutdown);

    let state = Arc::new(AppState {
        limiter: Arc::new(limiter),
        trust_proxy_headers: args.trust_proxy_headers,
    });
    Ok(build_router(state))
}
