use std::sync::Arc;
use crate::rate_limit::RateLimiter;
// app's shared state

pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub trust_proxy_headers: bool, // honour X-Forwarded-For / X-Real-IP
}
