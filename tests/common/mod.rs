#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use sea_orm::{ConnectionTrait, DatabaseBackend as DbBackend, Statement};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wineline_api::{
    app_router,
    auth::{issue_token, Principal},
    config::AppConfig,
    db,
    services::prediction::{HttpQualityPredictor, QualityPredictor},
    AppState,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TEST_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Router over a throwaway SQLite file with the prediction service mocked.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub ai: MockServer,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pool_size(1).await
    }

    /// A larger pool lets requests overlap inside the database.
    pub async fn with_pool_size(max_connections: u32) -> Self {
        Self::build(max_connections, |_| {}).await
    }

    /// Applies `adjust` to the test configuration before the app is built.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(1, adjust).await
    }

    async fn build(max_connections: u32, adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("wineline_test.db");
        let ai = MockServer::start().await;

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_SECRET.to_string(),
            ai.uri(),
        );
        cfg.environment = "test".to_string();
        cfg.prediction_timeout_secs = 2;
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        pool.execute(Statement::from_string(
            DbBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await
        .expect("enable WAL");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let predictor: Arc<dyn QualityPredictor> = Arc::new(
            HttpQualityPredictor::new(&cfg.ai_service_url, cfg.prediction_timeout())
                .expect("prediction client"),
        );
        let state = AppState::new(Arc::new(pool), cfg, predictor);

        Self {
            router: app_router(state.clone()),
            state,
            ai,
            _dir: dir,
        }
    }

    /// Every prediction call answers with `body`.
    pub async fn predict_with(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.ai)
            .await;
    }

    pub async fn predict_failing(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.ai)
            .await;
    }

    pub fn token_for(&self, warehouse_id: Option<i32>) -> String {
        let principal = Principal {
            user_id: 7,
            warehouse_id,
            role: "manager".to_string(),
        };
        issue_token(TEST_SECRET, &principal, chrono::Duration::hours(1)).expect("token")
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        send(self.router(), method, uri, body, token).await
    }

    pub async fn ingest(&self, reading: Value) -> Response {
        self.request(Method::POST, "/simulation/data", Some(reading), None)
            .await
    }
}

pub async fn send(
    router: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(tok) = token {
        builder = builder.header("authorization", format!("Bearer {}", tok));
    }

    let body = if let Some(json) = body {
        builder = builder.header("content-type", "application/json");
        Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
    } else {
        Body::empty()
    };

    let request = builder.body(body).expect("failed to build request");
    router
        .oneshot(request)
        .await
        .expect("router error during test request")
}

/// Posts a raw body labelled as JSON, bypassing serialization.
pub async fn send_raw(router: Router, uri: &str, raw: &'static str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(raw))
        .expect("failed to build request");
    router
        .oneshot(request)
        .await
        .expect("router error during test request")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// A red wine reading with every attribute present.
pub fn reading(product_id: i64, line_id: i64, batch_id: i64, warehouse_id: i32) -> Value {
    json!({
        "product_id": product_id,
        "line_id": line_id,
        "batch_id": batch_id,
        "warehouse_id": warehouse_id,
        "type": "red",
        "fixed acidity": 7.4,
        "volatile acidity": 0.7,
        "citric acid": 0.0,
        "residual sugar": 1.9,
        "chlorides": 0.076,
        "free sulfur dioxide": 11.0,
        "total sulfur dioxide": 34.0,
        "density": 0.9978,
        "pH": 3.51,
        "sulphates": 0.56,
        "alcohol": 9.4
    })
}

pub fn good_prediction() -> Value {
    json!({ "quality_score": 6.2, "quality_class": "Good" })
}

pub async fn count(app: &TestApp, sql: &str) -> i64 {
    let row = app
        .state
        .db
        .query_one(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
        .await
        .expect("count query")
        .expect("count row");
    row.try_get_by_index::<i64>(0).expect("count value")
}
