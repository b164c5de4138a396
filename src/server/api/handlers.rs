use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use futures::Stream;
use serde::Deserialize;
use sqlx::SqliteConnection;
use tracing::info;
use utoipa::OpenApi;

use super::auth;
use super::dto::{
    AlertAcknowledged, AlertOut, AlertsResponse, DeviceOut, DevicesResponse, Health,
    HistoryResponse, ItemCreate, ItemCreated, ItemDetail, ItemSummary, ItemUpdate, ItemUpdated,
    ItemsResponse, ReadingOut, SensorOut, SensorsResponse,
};
use super::errors::ApiError;
use crate::server::db::models;
use crate::server::events::BroadcastEvent;
use crate::server::AppState;
use crate::wire::{format_ts, normalize_ts, parse_ts, utc_now_iso, BatchAck, ReadingsBatch};

/// Fetch liveness and the server clock.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Server is up", body = Health)),
    tag = "system"
)]
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_owned(),
        time: utc_now_iso(),
    })
}

/// Idempotent batch ingest. Each reading is stored at most once per
/// `(device_id, sensor_id, seq_id, ts)`; duplicates are acked without
/// re-emitting events. The whole batch commits or rolls back together.
#[utoipa::path(
    post,
    path = "/api/v1/readings/batch",
    request_body = ReadingsBatch,
    responses(
        (status = 200, description = "Batch accepted", body = BatchAck),
        (status = 400, description = "Invalid reading timestamp"),
        (status = 401, description = "Invalid device token"),
    ),
    tag = "ingest"
)]
pub async fn ingest_readings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<ReadingsBatch>,
) -> Result<Json<BatchAck>, ApiError> {
    auth::require_device_auth(&state.config, &headers)?;

    let now = utc_now_iso();
    let mut ack_seq: Option<i64> = None;
    let mut events: Vec<BroadcastEvent> = Vec::new();

    let mut tx = state.pool.begin().await?;
    upsert_device(&mut tx, &batch.device_id, batch.firmware.as_deref(), &now).await?;

    for reading in &batch.readings {
        let ts = normalize_ts(&reading.ts)
            .map_err(|_| ApiError::BadRequest("Invalid reading timestamp".into()))?;
        ensure_sensor(&mut tx, &reading.sensor_id, &batch.device_id).await?;
        let (prev_state, prev_ts) = sensor_state(&mut tx, &reading.sensor_id).await?;

        let inserted = insert_reading(&mut tx, &batch.device_id, reading, &ts, &now).await?;
        // The row exists either way, so acking is safe for duplicates too.
        ack_seq = Some(reading.seq_id);
        if !inserted {
            continue;
        }

        // Out-of-order readings are stored but never regress sensor state.
        if is_newer(&ts, prev_ts.as_deref()) {
            update_sensor_state(
                &mut tx,
                &reading.sensor_id,
                reading.state.as_str(),
                reading.normalized_value,
                &ts,
            )
            .await?;
        }

        let item = item_for_sensor(&mut tx, &reading.sensor_id).await?;
        let item_id = item.as_ref().map(|(id, _)| id.clone());
        events.push(BroadcastEvent::ItemStatusUpdate {
            sensor_id: reading.sensor_id.clone(),
            item_id: item_id.clone(),
            state: reading.state.clone(),
            normalized_value: reading.normalized_value,
            ts: ts.clone(),
        });

        if prev_state.as_deref() != Some(reading.state.as_str()) {
            if reading.state.is_alerting() {
                let message = match item.as_ref() {
                    Some((_, name)) => format!("{name} is {}", reading.state),
                    None => format!("Sensor {} is {}", reading.sensor_id, reading.state),
                };
                let alert_id = create_alert(
                    &mut tx,
                    &reading.sensor_id,
                    item_id.as_deref(),
                    reading.state.as_str(),
                    &message,
                    &now,
                )
                .await?;
                events.push(BroadcastEvent::AlertCreated {
                    alert_id,
                    sensor_id: reading.sensor_id.clone(),
                    item_id: item_id.clone(),
                    state: reading.state.clone(),
                    created_at: now.clone(),
                    message,
                });
            }
            if reading.state.as_str() == "ok" {
                resolve_alerts(&mut tx, &reading.sensor_id, &now).await?;
                events.push(BroadcastEvent::AlertResolved {
                    sensor_id: reading.sensor_id.clone(),
                    item_id,
                    resolved_at: now.clone(),
                });
            }
        }
    }

    tx.commit().await?;
    info!(
        device_id = %batch.device_id,
        readings = batch.readings.len(),
        events = events.len(),
        "Batch ingested"
    );
    for event in events {
        state.events.publish(event);
    }

    Ok(Json(BatchAck {
        ack_seq_id: ack_seq,
        server_time: now,
    }))
}

/// List items joined with their sensor's derived status.
#[utoipa::path(
    get,
    path = "/api/v1/items",
    responses(
        (status = 200, description = "All items", body = ItemsResponse),
        (status = 401, description = "Invalid UI token"),
    ),
    tag = "items"
)]
pub async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ItemsResponse>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let rows: Vec<models::ItemWithStatus> = sqlx::query_as(
        r#"
        SELECT items.id, items.name, items.sensor_id, items.thresholds,
               items.unit, items.image_url, items.created_at, items.updated_at,
               sensors.last_state, sensors.last_update, sensors.last_value
        FROM items
        LEFT JOIN sensors ON items.sensor_id = sensors.id
        ORDER BY items.name ASC;
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ItemsResponse {
        items: rows.into_iter().map(ItemSummary::from).collect(),
    }))
}

/// Item detail with its sensor's latest stored reading.
#[utoipa::path(
    get,
    path = "/api/v1/items/{item_id}",
    params(("item_id" = String, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item detail", body = ItemDetail),
        (status = 404, description = "Item not found"),
    ),
    tag = "items"
)]
pub async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
) -> Result<Json<ItemDetail>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let item: models::Item = sqlx::query_as(
        r#"
        SELECT id, name, sensor_id, thresholds, unit, image_url, created_at, updated_at
        FROM items
        WHERE id = ?1;
        "#,
    )
    .bind(&item_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("Item"))?;

    let latest: Option<models::StoredReading> = match &item.sensor_id {
        Some(sensor_id) => {
            sqlx::query_as(
                r#"
                SELECT seq_id, ts, raw_value, normalized_value, state
                FROM readings
                WHERE sensor_id = ?1
                ORDER BY ts DESC
                LIMIT 1;
                "#,
            )
            .bind(sensor_id)
            .fetch_optional(&state.pool)
            .await?
        }
        None => None,
    };

    Ok(Json(ItemDetail::from_row(item, latest)))
}

/// Create an item bound to at most one sensor.
#[utoipa::path(
    post,
    path = "/api/v1/items",
    request_body = ItemCreate,
    responses((status = 200, description = "Item created", body = ItemCreated)),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ItemCreate>,
) -> Result<Json<ItemCreated>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let item_id = uuid::Uuid::new_v4().to_string();
    let now = utc_now_iso();
    let thresholds = payload
        .thresholds
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO items (id, sensor_id, name, thresholds, unit, image_url, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7);
        "#,
    )
    .bind(&item_id)
    .bind(&payload.sensor_id)
    .bind(&payload.name)
    .bind(thresholds)
    .bind(&payload.unit)
    .bind(&payload.image_url)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(ItemCreated {
        id: item_id,
        created_at: now,
    }))
}

/// Partial item update; absent fields keep their stored value.
#[utoipa::path(
    put,
    path = "/api/v1/items/{item_id}",
    params(("item_id" = String, Path, description = "Item id")),
    request_body = ItemUpdate,
    responses(
        (status = 200, description = "Item updated", body = ItemUpdated),
        (status = 404, description = "Item not found"),
    ),
    tag = "items"
)]
pub async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
    Json(payload): Json<ItemUpdate>,
) -> Result<Json<ItemUpdated>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let now = utc_now_iso();
    let thresholds = payload
        .thresholds
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE items
        SET name = COALESCE(?1, name),
            sensor_id = COALESCE(?2, sensor_id),
            thresholds = COALESCE(?3, thresholds),
            unit = COALESCE(?4, unit),
            image_url = COALESCE(?5, image_url),
            updated_at = ?6
        WHERE id = ?7;
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.sensor_id)
    .bind(thresholds)
    .bind(&payload.unit)
    .bind(&payload.image_url)
    .bind(&now)
    .bind(&item_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Item"));
    }
    tx.commit().await?;

    Ok(Json(ItemUpdated {
        id: item_id,
        updated_at: now,
    }))
}

/// Replace an item's thresholds.
#[utoipa::path(
    post,
    path = "/api/v1/items/{item_id}/thresholds",
    params(("item_id" = String, Path, description = "Item id")),
    request_body = crate::wire::Thresholds,
    responses(
        (status = 200, description = "Thresholds updated", body = ItemUpdated),
        (status = 404, description = "Item not found"),
    ),
    tag = "items"
)]
pub async fn update_thresholds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
    Json(payload): Json<crate::wire::Thresholds>,
) -> Result<Json<ItemUpdated>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let now = utc_now_iso();
    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE items
        SET thresholds = ?1, updated_at = ?2
        WHERE id = ?3;
        "#,
    )
    .bind(serde_json::to_string(&payload)?)
    .bind(&now)
    .bind(&item_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Item"));
    }
    tx.commit().await?;

    Ok(Json(ItemUpdated {
        id: item_id,
        updated_at: now,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub range: Option<String>,
    pub limit: Option<i64>,
}

/// Windowed reading history for an item's sensor, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/items/{item_id}/history",
    params(
        ("item_id" = String, Path, description = "Item id"),
        ("range" = Option<String>, Query, description = "Window such as 7d or 12h"),
        ("limit" = Option<i64>, Query, description = "Row cap, bounded by the server's history limit"),
    ),
    responses(
        (status = 200, description = "Reading history", body = HistoryResponse),
        (status = 400, description = "Invalid range format"),
        (status = 404, description = "Item not found"),
    ),
    tag = "items"
)]
pub async fn item_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let delta = parse_range(query.range.as_deref())?;
    let since = format_ts(Utc::now() - delta);
    let limit = query
        .limit
        .unwrap_or(500)
        .clamp(1, state.config.history_limit);

    let sensor_id: Option<String> = sqlx::query_scalar("SELECT sensor_id FROM items WHERE id = ?1;")
        .bind(&item_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound("Item"))?;

    let Some(sensor_id) = sensor_id else {
        return Ok(Json(HistoryResponse {
            item_id,
            readings: Vec::new(),
        }));
    };

    let rows: Vec<models::StoredReading> = sqlx::query_as(
        r#"
        SELECT seq_id, ts, raw_value, normalized_value, state
        FROM readings
        WHERE sensor_id = ?1 AND ts >= ?2
        ORDER BY ts ASC
        LIMIT ?3;
        "#,
    )
    .bind(&sensor_id)
    .bind(&since)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(HistoryResponse {
        item_id,
        readings: rows.into_iter().map(ReadingOut::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub status: Option<String>,
}

/// List alerts by status, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    params(("status" = Option<String>, Query, description = "active (default), acknowledged or resolved")),
    responses((status = 200, description = "Alerts", body = AlertsResponse)),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let status = query.status.unwrap_or_else(|| "active".to_owned());
    let rows: Vec<models::Alert> = sqlx::query_as(
        r#"
        SELECT alerts.id, alerts.item_id, alerts.sensor_id, alerts.type, alerts.status,
               alerts.message, alerts.created_at, alerts.resolved_at,
               items.name AS item_name
        FROM alerts
        LEFT JOIN items ON alerts.item_id = items.id
        WHERE alerts.status = ?1
        ORDER BY alerts.created_at DESC;
        "#,
    )
    .bind(&status)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(AlertsResponse {
        alerts: rows.into_iter().map(AlertOut::from).collect(),
    }))
}

/// Acknowledge an active alert. Only `active` alerts can be acknowledged;
/// anything else is a 404.
#[utoipa::path(
    post,
    path = "/api/v1/alerts/{alert_id}/ack",
    params(("alert_id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert acknowledged", body = AlertAcknowledged),
        (status = 404, description = "Alert not found or not active"),
    ),
    tag = "alerts"
)]
pub async fn ack_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(alert_id): Path<i64>,
) -> Result<Json<AlertAcknowledged>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let now = utc_now_iso();
    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE alerts
        SET status = 'acknowledged', resolved_at = ?1
        WHERE id = ?2 AND status = 'active';
        "#,
    )
    .bind(&now)
    .bind(alert_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Alert"));
    }
    tx.commit().await?;

    state.events.publish(BroadcastEvent::AlertAcknowledged {
        alert_id,
        acknowledged_at: now.clone(),
    });

    Ok(Json(AlertAcknowledged {
        id: alert_id,
        status: "acknowledged".to_owned(),
        acknowledged_at: now,
    }))
}

/// List known devices.
#[utoipa::path(
    get,
    path = "/api/v1/devices",
    responses((status = 200, description = "Devices", body = DevicesResponse)),
    tag = "devices"
)]
pub async fn list_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DevicesResponse>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let rows: Vec<models::Device> = sqlx::query_as(
        "SELECT id, name, location, firmware, last_seen FROM devices ORDER BY id;",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(DevicesResponse {
        devices: rows.into_iter().map(DeviceOut::from).collect(),
    }))
}

/// List known sensors with their last derived state.
#[utoipa::path(
    get,
    path = "/api/v1/sensors",
    responses((status = 200, description = "Sensors", body = SensorsResponse)),
    tag = "devices"
)]
pub async fn list_sensors(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SensorsResponse>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, None)?;

    let rows: Vec<models::Sensor> = sqlx::query_as(
        r#"
        SELECT id, device_id, type, thresholds, state_map, last_state, last_value, last_update
        FROM sensors
        ORDER BY id;
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(SensorsResponse {
        sensors: rows.into_iter().map(SensorOut::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

/// Live change events over server-sent events. Emits a `: keepalive`
/// comment every 15 seconds of idle.
#[utoipa::path(
    get,
    path = "/api/v1/stream",
    params(("token" = Option<String>, Query, description = "UI token fallback for EventSource")),
    responses(
        (status = 200, description = "text/event-stream of change events"),
        (status = 401, description = "Invalid UI token"),
    ),
    tag = "stream"
)]
pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    auth::require_ui_auth(&state.config, &headers, query.token.as_deref())?;

    let subscription = state.events.subscribe();
    let stream = futures::stream::unfold(subscription, |subscription| async move {
        let event = subscription.recv().await;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Some((
            Ok::<_, Infallible>(Event::default().data(data)),
            subscription,
        ))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

async fn upsert_device(
    conn: &mut SqliteConnection,
    device_id: &str,
    firmware: Option<&str>,
    last_seen: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO devices (id, firmware, last_seen)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET firmware = excluded.firmware, last_seen = excluded.last_seen;
        "#,
    )
    .bind(device_id)
    .bind(firmware)
    .bind(last_seen)
    .execute(conn)
    .await?;
    Ok(())
}

async fn ensure_sensor(
    conn: &mut SqliteConnection,
    sensor_id: &str,
    device_id: &str,
) -> Result<(), ApiError> {
    sqlx::query("INSERT OR IGNORE INTO sensors (id, device_id) VALUES (?1, ?2);")
        .bind(sensor_id)
        .bind(device_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn sensor_state(
    conn: &mut SqliteConnection,
    sensor_id: &str,
) -> Result<(Option<String>, Option<String>), ApiError> {
    let row: Option<(Option<String>, Option<String>)> =
        sqlx::query_as("SELECT last_state, last_update FROM sensors WHERE id = ?1;")
            .bind(sensor_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.unwrap_or((None, None)))
}

async fn insert_reading(
    conn: &mut SqliteConnection,
    device_id: &str,
    reading: &crate::wire::Reading,
    ts: &str,
    created_at: &str,
) -> Result<bool, ApiError> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO readings
        (device_id, seq_id, sensor_id, ts, raw_value, normalized_value, state, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);
        "#,
    )
    .bind(device_id)
    .bind(reading.seq_id)
    .bind(&reading.sensor_id)
    .bind(ts)
    .bind(reading.raw_value)
    .bind(reading.normalized_value)
    .bind(reading.state.as_str())
    .bind(created_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn update_sensor_state(
    conn: &mut SqliteConnection,
    sensor_id: &str,
    state: &str,
    last_value: Option<f64>,
    ts: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE sensors
        SET last_state = ?1, last_value = ?2, last_update = ?3
        WHERE id = ?4;
        "#,
    )
    .bind(state)
    .bind(last_value)
    .bind(ts)
    .bind(sensor_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn item_for_sensor(
    conn: &mut SqliteConnection,
    sensor_id: &str,
) -> Result<Option<(String, String)>, ApiError> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT id, name FROM items WHERE sensor_id = ?1;")
            .bind(sensor_id)
            .fetch_optional(conn)
            .await?;
    Ok(row)
}

async fn create_alert(
    conn: &mut SqliteConnection,
    sensor_id: &str,
    item_id: Option<&str>,
    alert_type: &str,
    message: &str,
    created_at: &str,
) -> Result<i64, ApiError> {
    let alert_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO alerts (item_id, sensor_id, type, status, message, created_at)
        VALUES (?1, ?2, ?3, 'active', ?4, ?5)
        RETURNING id;
        "#,
    )
    .bind(item_id)
    .bind(sensor_id)
    .bind(alert_type)
    .bind(message)
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    Ok(alert_id)
}

async fn resolve_alerts(
    conn: &mut SqliteConnection,
    sensor_id: &str,
    resolved_at: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE alerts
        SET status = 'resolved', resolved_at = ?1
        WHERE sensor_id = ?2 AND status = 'active';
        "#,
    )
    .bind(resolved_at)
    .bind(sensor_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// `ts >= last_update` (or no previous update) allows the sensor's derived
/// state to advance. Unparsable stored values fall back to text order.
fn is_newer(new_ts: &str, last_ts: Option<&str>) -> bool {
    let Some(last_ts) = last_ts else {
        return true;
    };
    match (parse_ts(new_ts), parse_ts(last_ts)) {
        (Ok(new), Ok(last)) => new >= last,
        _ => new_ts >= last_ts,
    }
}

fn parse_range(range: Option<&str>) -> Result<chrono::Duration, ApiError> {
    let Some(range) = range else {
        return Ok(chrono::Duration::days(7));
    };
    let invalid = || ApiError::BadRequest("Invalid range format".into());
    let unit = range.chars().last().ok_or_else(invalid)?;
    let number = &range[..range.len() - unit.len_utf8()];
    if number.is_empty() {
        return Err(invalid());
    }
    let value: i64 = number.parse().map_err(|_| invalid())?;
    match unit {
        'd' => Ok(chrono::Duration::days(value)),
        'h' => Ok(chrono::Duration::hours(value)),
        _ => Err(ApiError::BadRequest("Invalid range unit".into())),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        ingest_readings,
        list_items,
        get_item,
        create_item,
        update_item,
        update_thresholds,
        item_history,
        list_alerts,
        ack_alert,
        list_devices,
        list_sensors,
        stream,
    ),
    components(schemas(
        Health,
        BatchAck,
        ReadingsBatch,
        crate::wire::Reading,
        crate::wire::SensorMeta,
        crate::wire::Thresholds,
        ItemCreate,
        ItemUpdate,
        ItemCreated,
        ItemUpdated,
        ItemSummary,
        ItemDetail,
        ItemsResponse,
        HistoryResponse,
        ReadingOut,
        AlertOut,
        AlertsResponse,
        AlertAcknowledged,
        DeviceOut,
        DevicesResponse,
        SensorOut,
        SensorsResponse,
    )),
    tags(
        (name = "ingest", description = "Device-facing batch ingest"),
        (name = "items", description = "Inventory items and history"),
        (name = "alerts", description = "Alert lifecycle"),
        (name = "devices", description = "Devices and sensors"),
        (name = "stream", description = "Live updates"),
        (name = "system", description = "Health"),
    ),
    info(
        title = "Smart Inventory Server API",
        version = "0.1.0",
        description = "Ingest and query surface for the inventory telemetry pipeline"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range(None).unwrap(), chrono::Duration::days(7));
        assert_eq!(parse_range(Some("3d")).unwrap(), chrono::Duration::days(3));
        assert_eq!(
            parse_range(Some("12h")).unwrap(),
            chrono::Duration::hours(12)
        );
        assert!(parse_range(Some("d")).is_err());
        assert!(parse_range(Some("10")).is_err());
        assert!(parse_range(Some("5w")).is_err());
    }

    #[test]
    fn newer_comparison_prefers_parsed_timestamps() {
        assert!(is_newer("2026-01-17T00:00:01Z", None));
        assert!(is_newer(
            "2026-01-17T00:00:01Z",
            Some("2026-01-17T00:00:00Z")
        ));
        assert!(is_newer(
            "2026-01-17T00:00:00Z",
            Some("2026-01-17T00:00:00Z")
        ));
        assert!(!is_newer(
            "2026-01-17T00:00:00Z",
            Some("2026-01-17T00:00:01Z")
        ));
        // Same instant written with different offsets.
        assert!(is_newer(
            "2026-01-17T01:00:00+01:00",
            Some("2026-01-17T00:00:00Z")
        ));
    }
}
