//! Wine Line API
//!
//! Ingests production line readings, scores them with the quality prediction
//! service, raises threshold alerts and streams both to warehouse dashboards.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::ToSchema;

use crate::auth::TokenVerifier;
use crate::events::LiveHub;
use crate::services::{
    alerts::AlertService, ingestion::IngestionService, prediction::QualityPredictor,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub live: Arc<LiveHub>,
    pub verifier: Arc<TokenVerifier>,
    ingestion: IngestionService,
    alerts: AlertService,
}

impl AppState {
    /// Wires the services over one pool, one live hub and the given predictor
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        predictor: Arc<dyn QualityPredictor>,
    ) -> Self {
        let live = Arc::new(LiveHub::new(config.live_channel_capacity));
        let verifier = Arc::new(TokenVerifier::new(&config.jwt_secret));
        let alerts = AlertService::new(db.clone(), live.clone());
        let ingestion = IngestionService::new(
            db.clone(),
            predictor,
            alerts.clone(),
            live.clone(),
            config.prediction_timeout(),
            config.default_warehouse_id,
        );

        Self {
            db,
            config,
            live,
            verifier,
            ingestion,
            alerts,
        }
    }

    pub fn ingestion_service(&self) -> &IngestionService {
        &self.ingestion
    }

    pub fn alert_service(&self) -> &AlertService {
        &self.alerts
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Explicit origins when configured, otherwise any origin so dashboards on other hosts can connect
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Every route of the service with tracing, request ids and CORS applied
pub fn app_router(state: AppState) -> Router {
    use handlers::{alerts, health, live, simulation};

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/simulation/data", post(simulation::ingest_reading))
        .route("/simulation/recent", get(simulation::recent_readings))
        .route("/alerts", get(alerts::list_alerts))
        .route("/alerts/announce", post(alerts::announce_alert))
        .route(
            "/alerts/read",
            post(alerts::mark_read).delete(alerts::delete_read),
        )
        .route(
            "/alerts/settings",
            get(alerts::get_settings).post(alerts::update_settings),
        )
        .route("/alerts/settings/{metric}", delete(alerts::delete_setting))
        .route("/alerts/{alert_id}/details", get(alerts::alert_details))
        .route("/alerts/{alert_id}", delete(alerts::delete_alert))
        .route("/ws/warehouses/{warehouse_id}", get(live::warehouse_feed))
        .route("/health", get(health::health_check))
        .route("/status", get(health::api_status))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .layer(cors)
        .with_state(state)
}
