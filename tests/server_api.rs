//! End-to-end tests driving the HTTP surface: idempotent ingest, alert
//! lifecycle, auth boundaries, item CRUD and history windows.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use smart_inventory::server::{
    api,
    config::ServerConfig,
    db,
    events::{EventBroadcaster, Subscription},
    AppState,
};
use smart_inventory::wire::{format_ts, utc_now_iso};

struct TestServer {
    app: Router,
    pool: SqlitePool,
    events: EventBroadcaster,
    _dir: TempDir,
}

fn open_config() -> ServerConfig {
    ServerConfig {
        db_path: String::new(),
        device_tokens: Vec::new(),
        ui_token: None,
        allow_unauth: true,
        event_queue_size: 100,
        history_limit: 2000,
        server_host: "127.0.0.1".to_owned(),
        server_port: 0,
    }
}

async fn server_with(mut config: ServerConfig) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("inventory.db");
    config.db_path = db_path.to_string_lossy().into_owned();

    let pool = db::create_pool(&config.db_path).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let events = EventBroadcaster::new(config.event_queue_size);
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        events: events.clone(),
    };
    TestServer {
        app: api::router(state),
        pool,
        events,
        _dir: dir,
    }
}

async fn test_server() -> TestServer {
    server_with(open_config()).await
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn reading(seq_id: i64, sensor_id: &str, ts: &str, value: f64, state: &str) -> Value {
    json!({
        "seq_id": seq_id,
        "sensor_id": sensor_id,
        "ts": ts,
        "raw_value": value,
        "normalized_value": value,
        "state": state,
    })
}

fn batch(device_id: &str, readings: Vec<Value>) -> Value {
    json!({
        "device_id": device_id,
        "firmware": "0.1.0",
        "sent_at": utc_now_iso(),
        "readings": readings,
    })
}

fn drain(subscription: &Subscription) -> Vec<Value> {
    let mut drained = Vec::new();
    while let Some(event) = subscription.try_recv() {
        drained.push(serde_json::to_value(&event).unwrap());
    }
    drained
}

async fn reading_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM readings;")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let server = test_server().await;
    let (status, body) = send(&server.app, "GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn ingest_is_idempotent_across_replays() {
    let server = test_server().await;
    let subscription = server.events.subscribe();

    let payload = batch(
        "device-1",
        vec![
            reading(1, "bin-1", "2026-01-17T00:00:00Z", 5.0, "low"),
            reading(2, "bin-1", "2026-01-17T00:00:01Z", 6.0, "low"),
            reading(3, "bin-1", "2026-01-17T00:00:02Z", 7.0, "low"),
        ],
    );

    let (status, body) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ack_seq_id"], 3);
    assert_eq!(reading_count(&server.pool).await, 3);

    let events = drain(&subscription);
    assert_eq!(
        events
            .iter()
            .filter(|e| e["type"] == "item_status_update")
            .count(),
        3
    );
    assert_eq!(
        events.iter().filter(|e| e["type"] == "alert_created").count(),
        1
    );

    // Network glitch: the device retries the same batch.
    let (status, body) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ack_seq_id"], 3);
    assert_eq!(reading_count(&server.pool).await, 3);
    assert!(drain(&subscription).is_empty());
}

#[tokio::test]
async fn empty_batch_acks_nothing() {
    let server = test_server().await;
    let (status, body) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(batch("device-1", vec![])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ack_seq_id"], Value::Null);
}

#[tokio::test]
async fn bad_timestamp_rolls_back_the_whole_batch() {
    let server = test_server().await;
    let payload = batch(
        "device-1",
        vec![
            reading(1, "bin-1", "2026-01-17T00:00:00Z", 5.0, "ok"),
            reading(2, "bin-1", "not-a-timestamp", 6.0, "ok"),
        ],
    );
    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reading_count(&server.pool).await, 0);
}

#[tokio::test]
async fn out_of_order_reading_is_stored_without_regressing_state() {
    let server = test_server().await;

    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(batch(
            "device-1",
            vec![reading(1, "bin-1", "2026-01-17T01:00:00Z", 30.0, "ok")],
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(batch(
            "device-1",
            vec![reading(2, "bin-1", "2026-01-17T00:30:00Z", 5.0, "low")],
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reading_count(&server.pool).await, 2);

    let (status, body) = send(&server.app, "GET", "/api/v1/sensors", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let sensor = &body["sensors"][0];
    assert_eq!(sensor["id"], "bin-1");
    assert_eq!(sensor["last_state"], "ok");
    assert_eq!(sensor["last_update"], "2026-01-17T01:00:00.000000Z");
}

#[tokio::test]
async fn alert_lifecycle_create_resolve_then_ack_is_404() {
    let server = test_server().await;
    let subscription = server.events.subscribe();

    for (seq, value, state) in [
        (1, 30.0, "ok"),
        (2, 5.0, "low"),
        (3, 6.0, "low"),
        (4, 30.0, "ok"),
    ] {
        let ts = format!("2026-01-17T00:00:0{seq}Z");
        let (status, _) = send(
            &server.app,
            "POST",
            "/api/v1/readings/batch",
            None,
            Some(batch("device-1", vec![reading(seq, "bin-1", &ts, value, state)])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let events = drain(&subscription);
    assert_eq!(
        events.iter().filter(|e| e["type"] == "alert_created").count(),
        1
    );
    // Every transition into ok emits a resolved event, including the very
    // first reading; only the second one closed an actual alert.
    assert_eq!(
        events.iter().filter(|e| e["type"] == "alert_resolved").count(),
        2
    );

    let (status, body) = send(&server.app, "GET", "/api/v1/alerts?status=active", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alerts"].as_array().unwrap().len(), 0);

    let (status, body) = send(
        &server.app,
        "GET",
        "/api/v1/alerts?status=resolved",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["type"], "low");
    let alert_id = alerts[0]["id"].as_i64().unwrap();

    // Only active alerts can be acknowledged.
    let (status, _) = send(
        &server.app,
        "POST",
        &format!("/api/v1/alerts/{alert_id}/ack"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn active_alert_can_be_acknowledged_once() {
    let server = test_server().await;

    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(batch(
            "device-1",
            vec![reading(1, "bin-1", "2026-01-17T00:00:00Z", 0.0, "out")],
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&server.app, "GET", "/api/v1/alerts", None, None).await;
    let alert_id = body["alerts"][0]["id"].as_i64().unwrap();

    let subscription = server.events.subscribe();
    let (status, body) = send(
        &server.app,
        "POST",
        &format!("/api/v1/alerts/{alert_id}/ack"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "acknowledged");
    let events = drain(&subscription);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "alert_acknowledged");

    let (status, _) = send(
        &server.app,
        "POST",
        &format!("/api/v1/alerts/{alert_id}/ack"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn device_and_ui_token_spaces_are_disjoint() {
    let mut config = open_config();
    config.device_tokens = vec!["device-secret".to_owned()];
    config.ui_token = Some("ui-secret".to_owned());
    config.allow_unauth = false;
    let server = server_with(config).await;

    let payload = batch(
        "device-1",
        vec![reading(1, "bin-1", "2026-01-17T00:00:00Z", 5.0, "ok")],
    );

    for token in [None, Some("wrong"), Some("ui-secret")] {
        let (status, _) = send(
            &server.app,
            "POST",
            "/api/v1/readings/batch",
            token,
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        Some("device-secret"),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for token in [None, Some("device-secret")] {
        let (status, _) = send(&server.app, "GET", "/api/v1/items", token, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(&server.app, "GET", "/api/v1/items", Some("ui-secret"), None).await;
    assert_eq!(status, StatusCode::OK);

    // Health stays open.
    let (status, _) = send(&server.app, "GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn item_crud_status_and_history() {
    let server = test_server().await;

    // An item without a sensor is legal and reports as unknown.
    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/items",
        None,
        Some(json!({"name": "Spare fuses"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&server.app, "GET", "/api/v1/items", None, None).await;
    assert_eq!(body["items"][0]["status"], "unknown");

    // Readings auto-create the sensor, which items can then bind to.
    let earlier = format_ts(chrono::Utc::now() - chrono::Duration::minutes(10));
    let now_ts = format_ts(chrono::Utc::now() - chrono::Duration::minutes(1));
    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(batch(
            "device-1",
            vec![
                reading(1, "bin-1", &earlier, 5.0, "low"),
                reading(2, "bin-1", &now_ts, 30.0, "ok"),
            ],
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &server.app,
        "POST",
        "/api/v1/items",
        None,
        Some(json!({
            "name": "Coffee beans",
            "sensor_id": "bin-1",
            "thresholds": {"low": 10.0, "ok": 20.0},
            "unit": "kg",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let item_id = body["id"].as_str().unwrap().to_owned();

    let (_, body) = send(&server.app, "GET", "/api/v1/items", None, None).await;
    let item = &body["items"][0];
    assert_eq!(item["name"], "Coffee beans");
    assert_eq!(item["status"], "ok");
    assert_eq!(item["thresholds"]["low"], 10.0);

    let (status, body) = send(
        &server.app,
        "GET",
        &format!("/api/v1/items/{item_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latest_reading"]["seq_id"], 2);
    assert_eq!(body["latest_reading"]["state"], "ok");

    let (status, body) = send(
        &server.app,
        "GET",
        &format!("/api/v1/items/{item_id}/history?range=1h"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let readings = body["readings"].as_array().unwrap();
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0]["seq_id"], 1);
    assert_eq!(readings[1]["seq_id"], 2);

    let (status, body) = send(
        &server.app,
        "GET",
        &format!("/api/v1/items/{item_id}/history?range=1h&limit=1"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["readings"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &server.app,
        "GET",
        &format!("/api/v1/items/{item_id}/history?range=nope"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &server.app,
        "GET",
        "/api/v1/items/00000000-0000-0000-0000-000000000000/history",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &server.app,
        "PUT",
        &format!("/api/v1/items/{item_id}"),
        None,
        Some(json!({"name": "Arabica beans"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &server.app,
        "POST",
        &format!("/api/v1/items/{item_id}/thresholds"),
        None,
        Some(json!({"low": 2.0, "ok": 8.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &server.app,
        "GET",
        &format!("/api/v1/items/{item_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(body["name"], "Arabica beans");
    assert_eq!(body["unit"], "kg");
    assert_eq!(body["thresholds"]["ok"], 8.0);

    let (status, _) = send(
        &server.app,
        "PUT",
        "/api/v1/items/00000000-0000-0000-0000-000000000000",
        None,
        Some(json!({"name": "ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn devices_and_sensors_are_listed_after_ingest() {
    let server = test_server().await;

    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/readings/batch",
        None,
        Some(batch(
            "device-1",
            vec![reading(1, "bin-1", "2026-01-17T00:00:00Z", 5.0, "low")],
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&server.app, "GET", "/api/v1/devices", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let device = &body["devices"][0];
    assert_eq!(device["id"], "device-1");
    assert_eq!(device["firmware"], "0.1.0");
    assert!(device["last_seen"].is_string());

    let (status, body) = send(&server.app, "GET", "/api/v1/sensors", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let sensor = &body["sensors"][0];
    assert_eq!(sensor["id"], "bin-1");
    assert_eq!(sensor["device_id"], "device-1");
    assert_eq!(sensor["last_state"], "low");
    assert_eq!(sensor["last_value"], 5.0);
}
