//! Metrics recorded by the pipeline
//!
//! Emitted through the `metrics` facade; the binary decides whether a
//! recorder is installed. Without one every call is a no-op.
//!
//! - `session_refresh_total` (counter): label `outcome`
//! - `session_refresh_waiters` (histogram): callers released per cycle
//! - `session_requests_total` (counter): label `status`
//! - `session_replays_total` (counter): label `outcome`

pub const REFRESH_TOTAL: &str = "session_refresh_total";
pub const REFRESH_WAITERS: &str = "session_refresh_waiters";
pub const REQUESTS_TOTAL: &str = "session_requests_total";
pub const REPLAYS_TOTAL: &str = "session_replays_total";

/// Record a finished refresh cycle and how many callers it released,
/// leader included.
pub fn record_refresh(outcome: &'static str, released: usize) {
    metrics::counter!(REFRESH_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(REFRESH_WAITERS).record(released as f64);
}

/// Record the terminal status of a request. `None` means no response.
pub fn record_request(status: Option<u16>) {
    let status = match status {
        Some(code) => code.to_string(),
        None => "transport".to_string(),
    };
    metrics::counter!(REQUESTS_TOTAL, "status" => status).increment(1);
}

/// Record a replay after refresh: `success`, `expired` or `failed`.
pub fn record_replay(outcome: &'static str) {
    metrics::counter!(REPLAYS_TOTAL, "outcome" => outcome).increment(1);
}
