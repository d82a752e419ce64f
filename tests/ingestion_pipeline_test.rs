//! End-to-end tests of `POST /simulation/data` and `GET /simulation/recent`.

mod common;

use axum::http::{Method, StatusCode};
use common::{count, good_prediction, reading, response_json, TestApp};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::time::Duration;
use wineline_api::events::LiveEvent;
use wineline_api::services::prediction::{persist_prediction, QualityPrediction};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

async fn configure(app: &TestApp, warehouse_id: i32, settings: serde_json::Value) {
    let token = app.token_for(Some(warehouse_id));
    let response = app
        .request(
            Method::POST,
            "/alerts/settings",
            Some(json!({ "settings": settings })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn alert_titles(app: &TestApp, warehouse_id: i32) -> Vec<String> {
    let token = app.token_for(Some(warehouse_id));
    let body = response_json(app.request(Method::GET, "/alerts", None, Some(&token)).await).await;
    body["data"]["alerts"]
        .as_array()
        .expect("alerts array")
        .iter()
        .map(|a| a["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn reading_is_stored_predicted_and_merged() {
    let app = TestApp::new().await;
    app.predict_with(json!({ "quality_score": 6.2, "quality_class": "Good", "confidence": "Medium" }))
        .await;

    let response = app.ingest(reading(1001, 3, 30, 1)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["product_id"], 1001);
    assert_eq!(body["type"], "red");
    assert_eq!(body["pH"], 3.51);
    assert_eq!(body["quality_score"], 6.2);
    assert_eq!(body["quality_class"], "Good");
    let timestamp = body["timestamp"].as_str().expect("timestamp");
    assert!(timestamp.ends_with('Z'));
    chrono::DateTime::parse_from_rfc3339(timestamp).expect("rfc3339 timestamp");

    assert_eq!(count(&app, "SELECT COUNT(*) FROM product").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM measure").await, 11);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM sensors WHERE line_id = 3").await, 11);
    assert_eq!(count(&app, "SELECT quantity FROM batches WHERE batch_id = 30").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM is_predicted").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM ai_model WHERE model_id = 1").await, 1);
}

#[tokio::test]
async fn duplicate_product_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;

    assert_eq!(app.ingest(reading(1, 1, 10, 1)).await.status(), StatusCode::OK);

    let response = app.ingest(reading(1, 1, 10, 1)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Conflict");

    assert_eq!(count(&app, "SELECT COUNT(*) FROM product").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM measure").await, 11);
    assert_eq!(count(&app, "SELECT quantity FROM batches WHERE batch_id = 10").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM is_predicted").await, 1);
}

#[tokio::test]
async fn gateway_failure_keeps_reading_but_records_no_prediction() {
    let app = TestApp::new().await;
    app.predict_failing(500).await;

    let response = app.ingest(reading(55, 2, 20, 1)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response_json(response).await;
    assert_eq!(body["message"], "AI Service Unavailable");
    assert!(body["details"].as_str().unwrap_or_default().contains("500"));

    assert_eq!(count(&app, "SELECT COUNT(*) FROM product WHERE product_id = 55").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM measure WHERE product_id = 55").await, 11);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM is_predicted").await, 0);
}

#[tokio::test]
async fn unreachable_prediction_service_keeps_reading() {
    let app = TestApp::with_config(|cfg| cfg.ai_service_url = "http://127.0.0.1:1".to_string()).await;

    let response = app.ingest(reading(57, 2, 20, 1)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response_json(response).await;
    assert_eq!(body["message"], "AI Service Unavailable");

    assert_eq!(count(&app, "SELECT COUNT(*) FROM product WHERE product_id = 57").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM measure WHERE product_id = 57").await, 11);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM is_predicted").await, 0);
}

#[tokio::test]
async fn slow_prediction_service_times_out() {
    let app = TestApp::with_config(|cfg| cfg.prediction_timeout_secs = 1).await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(good_prediction())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&app.ai)
        .await;

    let response = app.ingest(reading(58, 2, 20, 1)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response_json(response).await;
    assert!(body["details"].as_str().unwrap_or_default().contains("timed out"));

    assert_eq!(count(&app, "SELECT COUNT(*) FROM product WHERE product_id = 58").await, 1);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM measure WHERE product_id = 58").await, 11);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM is_predicted").await, 0);
}

#[tokio::test]
async fn second_prediction_for_a_product_is_not_written() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;
    assert_eq!(app.ingest(reading(59, 2, 20, 1)).await.status(), StatusCode::OK);

    let again = QualityPrediction::from_response(json!({ "quality_score": 3.0, "quality_class": "Poor" }))
        .expect("valid prediction");
    let written = persist_prediction(&*app.state.db, 59, &again, chrono::Utc::now())
        .await
        .expect("duplicate prediction is not an error");
    assert!(!written);

    assert_eq!(count(&app, "SELECT COUNT(*) FROM is_predicted WHERE product_id = 59").await, 1);
    assert_eq!(
        count(&app, "SELECT COUNT(*) FROM is_predicted WHERE quality_category = 'Good'").await,
        1
    );
}

#[tokio::test]
async fn malformed_prediction_counts_as_gateway_failure() {
    let app = TestApp::new().await;
    app.predict_with(json!({ "quality_class": "Good" })).await;

    let response = app.ingest(reading(56, 2, 20, 1)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM is_predicted").await, 0);
}

#[tokio::test]
async fn invalid_reading_is_rejected_before_any_write() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;

    let mut missing_line = reading(9, 1, 1, 1);
    missing_line.as_object_mut().unwrap().remove("line_id");
    assert_eq!(app.ingest(missing_line).await.status(), StatusCode::BAD_REQUEST);

    let mut bad_attribute = reading(9, 1, 1, 1);
    bad_attribute["alcohol"] = json!("strong");
    assert_eq!(app.ingest(bad_attribute).await.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.ingest(json!([1, 2, 3])).await.status(), StatusCode::BAD_REQUEST);

    assert_eq!(count(&app, "SELECT COUNT(*) FROM warehouse").await, 0);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM product").await, 0);
    assert_eq!(app.ai.received_requests().await.unwrap_or_default().len(), 0);
}

#[tokio::test]
async fn non_json_body_is_a_validation_error() {
    let app = TestApp::new().await;
    let response = common::send_raw(app.router(), "/simulation/data", "not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ph_out_of_range_raises_one_alert() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;
    configure(
        &app,
        1,
        json!([{ "metric": "pH", "min": 2.8, "max": 3.8, "enabled": true }]),
    )
    .await;

    let mut sour = reading(100, 1, 1, 1);
    sour["pH"] = json!(4.2);
    assert_eq!(app.ingest(sour).await.status(), StatusCode::OK);

    let token = app.token_for(Some(1));
    let body = response_json(app.request(Method::GET, "/alerts", None, Some(&token)).await).await;
    let alerts = body["data"]["alerts"].as_array().expect("alerts array");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["title"], "pH Alert");
    assert_eq!(alerts[0]["product_id"], 100);
    let description = alerts[0]["description"].as_str().unwrap();
    assert!(description.contains("4.2"));
    assert!(description.contains("3.8"));
    assert_eq!(body["data"]["unreadCount"], 1);

    // in range: nothing new
    assert_eq!(app.ingest(reading(101, 1, 1, 1)).await.status(), StatusCode::OK);
    assert_eq!(alert_titles(&app, 1).await.len(), 1);
}

#[tokio::test]
async fn failed_alert_write_does_not_stop_the_others() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;
    configure(
        &app,
        1,
        json!([
            { "metric": "pH", "min": null, "max": 3.0 },
            { "metric": "alcohol", "min": null, "max": 5.0 }
        ]),
    )
    .await;
    app.state
        .db
        .execute_unprepared(
            "CREATE TRIGGER reject_ph_alerts BEFORE INSERT ON alerts \
             WHEN NEW.title = 'pH Alert' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .await
        .expect("create trigger");

    assert_eq!(app.ingest(reading(150, 1, 1, 1)).await.status(), StatusCode::OK);

    assert_eq!(alert_titles(&app, 1).await, vec!["alcohol Alert".to_string()]);
    assert_eq!(count(&app, "SELECT COUNT(*) FROM alerts").await, 1);
}

#[tokio::test]
async fn unbounded_minimum_only_checks_maximum() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;
    configure(
        &app,
        1,
        json!([{ "metric": "alcohol", "min": null, "max": 14, "enabled": true }]),
    )
    .await;

    let mut strong = reading(200, 1, 1, 1);
    strong["alcohol"] = json!(20);
    app.ingest(strong).await;

    let mut weak = reading(201, 1, 1, 1);
    weak["alcohol"] = json!(5);
    app.ingest(weak).await;

    assert_eq!(alert_titles(&app, 1).await, vec!["alcohol Alert".to_string()]);
}

#[tokio::test]
async fn disabled_rules_and_other_warehouses_do_not_fire() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;
    configure(
        &app,
        1,
        json!([{ "metric": "pH", "min": 2.8, "max": 3.0, "enabled": false }]),
    )
    .await;
    configure(
        &app,
        2,
        json!([{ "metric": "pH", "min": 2.8, "max": 3.0, "enabled": true }]),
    )
    .await;

    app.ingest(reading(300, 1, 1, 1)).await;

    assert!(alert_titles(&app, 1).await.is_empty());
    assert!(alert_titles(&app, 2).await.is_empty());
}

#[tokio::test]
async fn metric_absent_from_reading_falls_back_to_prediction() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;
    configure(
        &app,
        1,
        json!([{ "metric": "quality_score", "min": 7, "max": null }]),
    )
    .await;

    app.ingest(reading(400, 1, 1, 1)).await;

    assert_eq!(
        alert_titles(&app, 1).await,
        vec!["quality_score Alert".to_string()]
    );
}

#[tokio::test]
async fn subscribers_receive_sensor_updates_and_alerts() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;
    configure(
        &app,
        4,
        json!([{ "metric": "pH", "min": null, "max": 3.0 }]),
    )
    .await;
    let mut feed = app.state.live.subscribe(4);

    assert_eq!(app.ingest(reading(500, 8, 80, 4)).await.status(), StatusCode::OK);

    let first = tokio::time::timeout(Duration::from_secs(2), feed.recv())
        .await
        .expect("alert event in time")
        .expect("open channel");
    assert_eq!(first.name(), "alert_new");

    let second = tokio::time::timeout(Duration::from_secs(2), feed.recv())
        .await
        .expect("sensor event in time")
        .expect("open channel");
    match second {
        LiveEvent::SensorUpdate(data) => {
            assert_eq!(data["product_id"], 500);
            assert_eq!(data["quality_class"], "Good");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn recent_readings_use_labels_and_newest_first() {
    let app = TestApp::new().await;
    app.predict_with(good_prediction()).await;

    app.ingest(reading(600, 1, 1, 1)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    app.ingest(reading(601, 1, 1, 2)).await;

    let all = response_json(
        app.request(Method::GET, "/simulation/recent", None, None)
            .await,
    )
    .await;
    let rows = all.as_array().expect("array of readings");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["product_id"], 601);
    let sent = reading(601, 1, 1, 2);
    for (key, value) in sent.as_object().expect("reading object") {
        assert_eq!(&rows[0][key.as_str()], value, "`{}` did not round-trip", key);
    }
    assert_eq!(rows[0]["quality_class"], "Good");
    assert_eq!(rows[0]["confidence"], "High");
    assert!(rows[0]["timestamp"].is_string());

    let limited = response_json(
        app.request(Method::GET, "/simulation/recent?limit=1", None, None)
            .await,
    )
    .await;
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let scoped = response_json(
        app.request(Method::GET, "/simulation/recent?warehouse_id=1", None, None)
            .await,
    )
    .await;
    let scoped = scoped.as_array().unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0]["product_id"], 600);
}

#[tokio::test]
async fn readings_without_prediction_sort_last() {
    let app = TestApp::new().await;
    app.predict_failing(503).await;
    app.ingest(reading(700, 1, 1, 1)).await;

    app.ai.reset().await;
    app.predict_with(good_prediction()).await;
    app.ingest(reading(701, 1, 1, 1)).await;

    let rows = response_json(
        app.request(Method::GET, "/simulation/recent", None, None)
            .await,
    )
    .await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows[0]["product_id"], 701);
    assert_eq!(rows[1]["product_id"], 700);
    assert!(rows[1]["quality_score"].is_null());
    assert!(rows[1]["timestamp"].is_null());
}
