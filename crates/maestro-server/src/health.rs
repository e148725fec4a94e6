//! Liveness endpoint payload.

use std::time::Instant;

use serde::Serialize;

/// GET /health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live scheduler registrations.
    pub schedule_registrations: usize,
    /// Known instances with a live subprocess.
    pub live_instances: usize,
}

/// Build the health snapshot.
#[must_use]
pub fn health_check(
    start_time: Instant,
    schedule_registrations: usize,
    live_instances: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        schedule_registrations,
        live_instances,
    }
}
