//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current registered client count.
    pub connections: usize,
    /// Display names of connected clients.
    pub usernames: Vec<String>,
}

/// Build a health response from live hub counters.
pub fn health_check(start_time: Instant, connections: usize, usernames: Vec<String>) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        usernames,
    }
}
