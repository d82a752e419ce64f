use crate::{
    auth::Principal,
    entities::{alert, alert_setting},
    services::alerts::{AlertDetails, SettingInput},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct AlertInbox {
    pub alerts: Vec<alert::Model>,
    #[serde(rename = "unreadCount")]
    pub unread_count: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "title": "Line 2 stopped",
    "description": "Bottling paused for maintenance",
    "product_id": null
}))]
pub struct AnnounceRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub product_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarkReadRequest {
    /// Alert to mark; every alert of the warehouse when omitted
    #[serde(default, rename = "alertId", alias = "alert_id")]
    pub alert_id: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub settings: Vec<SettingInput>,
}

#[utoipa::path(
    get,
    path = "/alerts",
    responses(
        (status = 200, description = "Latest alerts and unread count"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<AlertInbox> {
    let warehouse_id = principal.require_warehouse()?;
    let (alerts, unread_count) = state.alert_service().inbox(warehouse_id).await?;
    Ok(Json(ApiResponse::success(AlertInbox {
        alerts,
        unread_count,
    })))
}

#[utoipa::path(
    post,
    path = "/alerts/announce",
    request_body = AnnounceRequest,
    responses(
        (status = 200, description = "Alert created and broadcast"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn announce_alert(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<AnnounceRequest>,
) -> ApiResult<alert::Model> {
    let warehouse_id = principal.require_warehouse()?;
    payload.validate()?;

    let alert = state
        .alert_service()
        .announce(
            warehouse_id,
            payload.title,
            payload.description,
            payload.product_id,
        )
        .await?;
    Ok(Json(ApiResponse::success(alert)))
}

#[utoipa::path(
    post,
    path = "/alerts/read",
    request_body = MarkReadRequest,
    responses((status = 200, description = "Alerts marked as read")),
    tag = "alerts"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<MarkReadRequest>,
) -> ApiResult<Value> {
    let warehouse_id = principal.require_warehouse()?;
    let updated = state
        .alert_service()
        .mark_read(warehouse_id, payload.alert_id)
        .await?;
    Ok(Json(ApiResponse::success(json!({ "updated": updated }))))
}

#[utoipa::path(
    delete,
    path = "/alerts/read",
    responses((status = 200, description = "Read alerts deleted")),
    tag = "alerts"
)]
pub async fn delete_read(State(state): State<AppState>, principal: Principal) -> ApiResult<Value> {
    let warehouse_id = principal.require_warehouse()?;
    let deleted = state.alert_service().delete_read(warehouse_id).await?;
    Ok(Json(ApiResponse::success(json!({ "deleted": deleted }))))
}

#[utoipa::path(
    get,
    path = "/alerts/{alert_id}/details",
    params(("alert_id" = i32, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert with its reading"),
        (status = 404, description = "Alert not found", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn alert_details(
    State(state): State<AppState>,
    principal: Principal,
    Path(alert_id): Path<i32>,
) -> ApiResult<AlertDetails> {
    let warehouse_id = principal.require_warehouse()?;
    let details = state
        .alert_service()
        .details(warehouse_id, alert_id)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    delete,
    path = "/alerts/{alert_id}",
    params(("alert_id" = i32, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert deleted"),
        (status = 404, description = "Alert not found", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn delete_alert(
    State(state): State<AppState>,
    principal: Principal,
    Path(alert_id): Path<i32>,
) -> ApiResult<Value> {
    let warehouse_id = principal.require_warehouse()?;
    state.alert_service().delete(warehouse_id, alert_id).await?;
    Ok(Json(ApiResponse::success(json!({ "deleted": alert_id }))))
}

#[utoipa::path(
    get,
    path = "/alerts/settings",
    responses((status = 200, description = "Threshold settings of the caller's warehouse")),
    tag = "alerts"
)]
pub async fn get_settings(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<alert_setting::Model>> {
    let warehouse_id = principal.require_warehouse()?;
    let settings = state.alert_service().settings(warehouse_id).await?;
    Ok(Json(ApiResponse::success(settings)))
}

#[utoipa::path(
    post,
    path = "/alerts/settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings upserted"),
        (status = 400, description = "Invalid setting", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<UpdateSettingsRequest>,
) -> ApiResult<Vec<alert_setting::Model>> {
    let warehouse_id = principal.require_warehouse()?;
    let settings = state
        .alert_service()
        .upsert_settings(warehouse_id, payload.settings)
        .await?;
    Ok(Json(ApiResponse::success(settings)))
}

#[utoipa::path(
    delete,
    path = "/alerts/settings/{metric}",
    params(("metric" = String, Path, description = "Metric name")),
    responses(
        (status = 200, description = "Setting removed"),
        (status = 404, description = "No setting for metric", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn delete_setting(
    State(state): State<AppState>,
    principal: Principal,
    Path(metric): Path<String>,
) -> ApiResult<Value> {
    let warehouse_id = principal.require_warehouse()?;
    state
        .alert_service()
        .delete_setting(warehouse_id, &metric)
        .await?;
    Ok(Json(ApiResponse::success(json!({ "deleted": metric }))))
}
