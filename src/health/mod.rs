//! Local health responder.
//!
//! # Responsibilities
//! - Answer `GET`/`HEAD` on `/health`, `/health/live` and `/health/ready`
//!   on every listener without contacting an upstream
//!
//! # Design Decisions
//! - Static liveness answers: if a listener can respond, the process is up
//! - Other methods on these paths fall through to the forwarder, so an
//!   upstream's own `POST /health` (if any) is still reachable

use axum::Json;
use serde::Serialize;

pub const HEALTH_PATH: &str = "/health";
pub const LIVE_PATH: &str = "/health/live";
pub const READY_PATH: &str = "/health/ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `GET /health`
pub async fn overall() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// `GET /health/live`
pub async fn live() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `GET /health/ready`; listeners only serve once every route is bound.
pub async fn ready() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ready" })
}
