use crate::{ApiResponse, ApiResult, AppState};
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;

/// Tracks application start time for uptime calculation
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub database: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_latency_ms: Option<u64>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub timestamp: String,
}

/// Pings the database. Answers 503 with the same envelope when it is unreachable.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are up"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "health"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthReport>>) {
    let started = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;

    let report = match db_result {
        Ok(()) => HealthReport {
            status: ComponentStatus::Up,
            database: ComponentStatus::Up,
            database_latency_ms: Some(started.elapsed().as_millis() as u64),
            uptime_secs: uptime_secs(),
        },
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed to reach the database");
            HealthReport {
                status: ComponentStatus::Down,
                database: ComponentStatus::Down,
                database_latency_ms: None,
                uptime_secs: uptime_secs(),
            }
        }
    };

    let code = match report.status {
        ComponentStatus::Up => StatusCode::OK,
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Build and environment information")),
    tag = "health"
)]
pub async fn api_status(State(state): State<AppState>) -> ApiResult<ServiceStatus> {
    Ok(Json(ApiResponse::success(ServiceStatus {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })))
}
