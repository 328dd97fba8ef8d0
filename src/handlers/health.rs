use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::time::Instant;

use crate::{db, handlers::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: &'static str,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub database: ComponentHealth,
}

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Call once on startup.
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// The process is up.
async fn liveness_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": ComponentStatus::Up,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// The database answers; traffic can be routed here.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let database = match db::check_connection(&state.db).await {
        Ok(()) => ComponentHealth {
            status: ComponentStatus::Up,
            message: "database reachable".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            ComponentHealth {
                status: ComponentStatus::Down,
                message: err.to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            }
        }
    };

    let status = database.status;
    let code = match status {
        ComponentStatus::Up => StatusCode::OK,
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: uptime_secs(),
        database,
    };
    (code, Json(body))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness_check))
        .route("/ready", get(readiness_check))
}
