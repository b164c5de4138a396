use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::server::db::models;
use crate::wire::Thresholds;

fn thresholds_from_json(value: Option<&str>) -> Option<Thresholds> {
    value.and_then(|text| serde_json::from_str(text).ok())
}

fn state_map_from_json(value: Option<&str>) -> Option<HashMap<String, String>> {
    value.and_then(|text| serde_json::from_str(text).ok())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemCreate {
    pub name: String,
    pub sensor_id: Option<String>,
    pub thresholds: Option<Thresholds>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub sensor_id: Option<String>,
    pub thresholds: Option<Thresholds>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemSummary {
    pub id: String,
    pub name: String,
    pub sensor_id: Option<String>,
    pub thresholds: Option<Thresholds>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    /// Sensor's last derived state, or `unknown` when it never reported.
    pub status: String,
    pub last_update: Option<String>,
    pub last_value: Option<f64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<models::ItemWithStatus> for ItemSummary {
    fn from(row: models::ItemWithStatus) -> Self {
        Self {
            thresholds: thresholds_from_json(row.thresholds.as_deref()),
            status: row.last_state.unwrap_or_else(|| "unknown".to_owned()),
            id: row.id,
            name: row.name,
            sensor_id: row.sensor_id,
            unit: row.unit,
            image_url: row.image_url,
            last_update: row.last_update,
            last_value: row.last_value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingOut {
    pub seq_id: i64,
    pub ts: String,
    pub raw_value: Option<f64>,
    pub normalized_value: Option<f64>,
    pub state: String,
}

impl From<models::StoredReading> for ReadingOut {
    fn from(row: models::StoredReading) -> Self {
        Self {
            seq_id: row.seq_id,
            ts: row.ts,
            raw_value: row.raw_value,
            normalized_value: row.normalized_value,
            state: row.state,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemDetail {
    pub id: String,
    pub name: String,
    pub sensor_id: Option<String>,
    pub thresholds: Option<Thresholds>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub latest_reading: Option<ReadingOut>,
}

impl ItemDetail {
    pub fn from_row(row: models::Item, latest: Option<models::StoredReading>) -> Self {
        Self {
            thresholds: thresholds_from_json(row.thresholds.as_deref()),
            id: row.id,
            name: row.name,
            sensor_id: row.sensor_id,
            unit: row.unit,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            latest_reading: latest.map(ReadingOut::from),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertOut {
    pub id: i64,
    pub item_id: Option<String>,
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub status: String,
    pub message: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
    /// Name of the linked item, when one exists.
    pub name: Option<String>,
}

impl From<models::Alert> for AlertOut {
    fn from(row: models::Alert) -> Self {
        Self {
            id: row.id,
            item_id: row.item_id,
            sensor_id: row.sensor_id,
            alert_type: row.alert_type,
            status: row.status,
            message: row.message,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            name: row.item_name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceOut {
    pub id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub firmware: Option<String>,
    pub last_seen: Option<String>,
}

impl From<models::Device> for DeviceOut {
    fn from(row: models::Device) -> Self {
        Self {
            id: row.id,
            name: row.name,
            location: row.location,
            firmware: row.firmware,
            last_seen: row.last_seen,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SensorOut {
    pub id: String,
    pub device_id: Option<String>,
    #[serde(rename = "type")]
    pub sensor_type: Option<String>,
    pub thresholds: Option<Thresholds>,
    pub state_map: Option<HashMap<String, String>>,
    pub last_state: Option<String>,
    pub last_value: Option<f64>,
    pub last_update: Option<String>,
}

impl From<models::Sensor> for SensorOut {
    fn from(row: models::Sensor) -> Self {
        Self {
            thresholds: thresholds_from_json(row.thresholds.as_deref()),
            state_map: state_map_from_json(row.state_map.as_deref()),
            id: row.id,
            device_id: row.device_id,
            sensor_type: row.sensor_type,
            last_state: row.last_state,
            last_value: row.last_value,
            last_update: row.last_update,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemsResponse {
    pub items: Vec<ItemSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub item_id: String,
    pub readings: Vec<ReadingOut>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertOut>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceOut>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SensorsResponse {
    pub sensors: Vec<SensorOut>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemCreated {
    pub id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemUpdated {
    pub id: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertAcknowledged {
    pub id: i64,
    pub status: String,
    pub acknowledged_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    pub status: String,
    pub time: String,
}
