//! Health check endpoints.

use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Public health check endpoint for load balancer probes.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    message: &'static str,
}

/// Authenticated ping endpoint.
///
/// Lets API clients confirm their shared secret is accepted.
pub async fn authenticated_ping() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}
