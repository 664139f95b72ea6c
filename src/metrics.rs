use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gate_requests_total", "Total number of guarded requests").unwrap();
    pub static ref REQUESTS_ALLOWED: Counter =
        register_counter!("gate_requests_allowed_total", "Requests admitted by the rate limiter").unwrap();
    pub static ref REQUESTS_DENIED: Counter =
        register_counter!("gate_requests_denied_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gate_request_latency_seconds",
        "Latency of admitted requests in seconds"
    )
    .unwrap();
    pub static ref TRACKED_IDENTITIES: Gauge =
        register_gauge!("gate_tracked_identities", "Clients held in rate limiter memory after the last sweep").unwrap();
    pub static ref SWEEP_EVICTIONS: Counter =
        register_counter!("gate_sweep_evictions_total", "Idle clients evicted by the sweeper").unwrap();
}
