use sqlx::FromRow;

/// Item row joined with its sensor's derived status for the list view.
#[derive(Debug, Clone, FromRow)]
pub struct ItemWithStatus {
    pub id: String,
    pub name: String,
    pub sensor_id: Option<String>,
    pub thresholds: Option<String>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub last_state: Option<String>,
    pub last_update: Option<String>,
    pub last_value: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub sensor_id: Option<String>,
    pub thresholds: Option<String>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StoredReading {
    pub seq_id: i64,
    pub ts: String,
    pub raw_value: Option<f64>,
    pub normalized_value: Option<f64>,
    pub state: String,
}

/// Alert row joined with the linked item's name.
#[derive(Debug, Clone, FromRow)]
pub struct Alert {
    pub id: i64,
    pub item_id: Option<String>,
    pub sensor_id: String,
    #[sqlx(rename = "type")]
    pub alert_type: String,
    pub status: String,
    pub message: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub item_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub firmware: Option<String>,
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Sensor {
    pub id: String,
    pub device_id: Option<String>,
    #[sqlx(rename = "type")]
    pub sensor_type: Option<String>,
    pub thresholds: Option<String>,
    pub state_map: Option<String>,
    pub last_state: Option<String>,
    pub last_value: Option<f64>,
    pub last_update: Option<String>,
}
