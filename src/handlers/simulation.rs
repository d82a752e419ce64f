use crate::{errors::ServiceError, services::readings::ReadingRecord, AppState};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::IntoParams;

const DEFAULT_RECENT_LIMIT: u64 = 20;

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentReadingsQuery {
    /// Rows to return (default 20)
    pub limit: Option<u64>,
    /// Restrict to one warehouse
    pub warehouse_id: Option<i32>,
}

/// Ingests one simulated reading and answers with the merged reading and prediction.
#[utoipa::path(
    post,
    path = "/simulation/data",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Reading stored and predicted", body = serde_json::Value),
        (status = 400, description = "Invalid reading", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product already recorded", body = crate::errors::ErrorResponse),
        (status = 502, description = "Prediction service unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "simulation"
)]
pub async fn ingest_reading(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let Json(body) = payload.map_err(|e| ServiceError::ValidationError(e.body_text()))?;
    let outcome = state.ingestion_service().ingest(body).await?;
    Ok(Json(outcome.reading))
}

#[utoipa::path(
    get,
    path = "/simulation/recent",
    params(RecentReadingsQuery),
    responses(
        (status = 200, description = "Most recently predicted readings", body = [serde_json::Value])
    ),
    tag = "simulation"
)]
pub async fn recent_readings(
    State(state): State<AppState>,
    Query(query): Query<RecentReadingsQuery>,
) -> Result<Json<Vec<ReadingRecord>>, ServiceError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, state.config.recent_readings_max_limit.max(1));

    let records =
        crate::services::readings::recent_readings(&*state.db, query.warehouse_id, limit).await?;
    Ok(Json(records))
}
