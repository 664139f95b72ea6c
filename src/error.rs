use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rate limit window must be greater than zero")]
    ZeroWindow,
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,
    #[error("rate limit window must not exceed {max:?}")]
    WindowTooLarge { max: std::time::Duration },
    #[error("sweep interval must not exceed {max:?}")]
    SweepIntervalTooLarge { max: std::time::Duration },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("failed to encode metrics: {0}")]
    Metrics(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
