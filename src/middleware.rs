use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::ApiError;
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL, REQUESTS_ALLOWED, REQUESTS_DENIED};
use crate::state::AppState;

/// Key the rate limiter tracks a caller under. Inserted into request
/// extensions for admitted requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

const UNKNOWN_CLIENT: &str = "unknown";

// "[::1]" and "::1" name the same client.
fn header_ip(raw: &str) -> &str {
    let ip = raw.trim();
    let ip = ip.strip_prefix('[').unwrap_or(ip);
    ip.strip_suffix(']').unwrap_or(ip)
}

// First non-empty X-Forwarded-For hop, then X-Real-IP, then the peer address.
pub fn resolve_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> ClientIdentity {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').map(header_ip).find(|s| !s.is_empty()));
        if let Some(ip) = forwarded {
            return ClientIdentity(ip.to_string());
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(header_ip)
            .filter(|s| !s.is_empty());
        if let Some(ip) = real_ip {
            return ClientIdentity(ip.to_string());
        }
    }

    match peer {
        Some(addr) => ClientIdentity(addr.ip().to_string()),
        None => ClientIdentity(UNKNOWN_CLIENT.to_string()),
    }
}

// Rejects over-limit callers before the wrapped handler runs
pub async fn rate_limit_guard(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    REQUEST_TOTAL.inc();

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = resolve_identity(req.headers(), peer, state.trust_proxy_headers);

    if !state.limiter.allow(&identity.0) {
        REQUESTS_DENIED.inc();
        debug!(identity = %identity.0, "rate limit exceeded");
        return Err(ApiError::RateLimited);
    }
    REQUESTS_ALLOWED.inc();

    let start_time = Instant::now();
    req.extensions_mut().insert(identity);
    let response = next.run(req).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    Ok(response)
}
