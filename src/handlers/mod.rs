mod health;
mod metrics;
mod whoami;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use whoami::{WhoamiResponse, whoami_handler};
