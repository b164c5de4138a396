//! Device configuration: a JSON file with recursive `env:NAME`
//! interpolation, deserialized into typed sections.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::device::processing::Mode;
use crate::wire::Thresholds;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSection {
    #[serde(default, rename = "id")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_firmware")]
    pub firmware: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
    #[serde(default = "default_retry_max")]
    pub retry_max_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            ca_cert_path: None,
            batch_size: default_batch_size(),
            flush_interval_seconds: default_flush_interval(),
            retry_max_seconds: default_retry_max(),
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub queue_db_path: Option<String>,
    #[serde(default)]
    pub max_queue_rows: Option<i64>,
    #[serde(default)]
    pub max_queue_age_seconds: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_true")]
    pub report_on_change_only: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            report_on_change_only: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default, rename = "id")]
    pub sensor_id: String,
    #[serde(default, rename = "type")]
    pub sensor_type: String,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
    #[serde(default)]
    pub state_map: Option<HashMap<String, String>>,
    #[serde(default)]
    pub report_on_change_only: Option<bool>,
    /// Driver-specific parameters (paths, pins, scale factors, ...).
    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

impl SensorConfig {
    pub fn effective_mode(&self) -> Mode {
        self.mode.unwrap_or(if self.sensor_type == "digital_gpio" {
            Mode::Digital
        } else {
            Mode::Analog
        })
    }

    pub fn effective_report_on_change(&self, runtime: &RuntimeConfig) -> bool {
        self.report_on_change_only
            .unwrap_or(runtime.report_on_change_only)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

impl DeviceConfig {
    pub fn device_id(&self) -> &str {
        self.device.device_id.as_deref().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.device_id.as_deref().unwrap_or_default().is_empty() {
            bail!("device.id is required");
        }
        if self.network.base_url.as_deref().unwrap_or_default().is_empty() {
            bail!("network.base_url is required");
        }
        if self
            .storage
            .queue_db_path
            .as_deref()
            .unwrap_or_default()
            .is_empty()
        {
            bail!("storage.queue_db_path is required");
        }
        if self.sensors.is_empty() {
            bail!("at least one sensor is required");
        }
        Ok(())
    }
}

/// Replaces every `"env:NAME"` string with the value of `NAME`, recursing
/// through objects and arrays. A missing variable resolves to null.
pub fn resolve_env(value: Value) -> Value {
    match value {
        Value::String(s) => match s.strip_prefix("env:") {
            Some(name) => std::env::var(name).map(Value::String).unwrap_or(Value::Null),
            None => Value::String(s),
        },
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| (key, resolve_env(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(resolve_env).collect()),
        other => other,
    }
}

pub fn load_config(path: &Path) -> Result<DeviceConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("config {} is not valid JSON", path.display()))?;
    let config: DeviceConfig =
        serde_json::from_value(resolve_env(value)).context("invalid device config")?;
    config.validate()?;
    Ok(config)
}

fn default_firmware() -> String {
    "0.1.0".to_owned()
}

fn default_batch_size() -> i64 {
    25
}

fn default_flush_interval() -> u64 {
    15
}

fn default_retry_max() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<DeviceConfig> {
        let config: DeviceConfig = serde_json::from_value(resolve_env(value))?;
        config.validate()?;
        Ok(config)
    }

    fn minimal() -> Value {
        json!({
            "device": {"id": "device-1"},
            "network": {"base_url": "http://localhost:8000"},
            "storage": {"queue_db_path": "queue.db"},
            "sensors": [
                {"id": "bin-1", "type": "file_sensor", "path": "/tmp/bin-1"}
            ]
        })
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(minimal()).unwrap();

        assert_eq!(config.device.firmware, "0.1.0");
        assert_eq!(config.network.batch_size, 25);
        assert_eq!(config.network.flush_interval_seconds, 15);
        assert_eq!(config.runtime.poll_interval_ms, 200);
        assert!(config.runtime.report_on_change_only);

        let sensor = &config.sensors[0];
        assert_eq!(sensor.effective_mode(), Mode::Analog);
        assert_eq!(sensor.debounce_ms, 100);
        assert_eq!(
            sensor.params.get("path"),
            Some(&Value::String("/tmp/bin-1".into()))
        );
    }

    #[test]
    fn digital_gpio_defaults_to_digital_mode() {
        let mut value = minimal();
        value["sensors"][0]["type"] = json!("digital_gpio");
        let config = parse(value).unwrap();
        assert_eq!(config.sensors[0].effective_mode(), Mode::Digital);
    }

    #[test]
    fn env_references_are_interpolated() {
        std::env::set_var("SMART_INVENTORY_TEST_TOKEN", "sekrit");
        let mut value = minimal();
        value["network"]["api_token"] = json!("env:SMART_INVENTORY_TEST_TOKEN");
        let config = parse(value).unwrap();
        assert_eq!(config.network.api_token.as_deref(), Some("sekrit"));
    }

    #[test]
    fn missing_env_var_resolves_to_absent() {
        let mut value = minimal();
        value["network"]["api_token"] = json!("env:SMART_INVENTORY_TEST_UNSET_VAR");
        let config = parse(value).unwrap();
        assert_eq!(config.network.api_token, None);
    }

    #[test]
    fn missing_required_fields_fail_validation() {
        let mut value = minimal();
        value["network"]["base_url"] = json!("env:SMART_INVENTORY_TEST_UNSET_URL");
        assert!(parse(value).is_err());

        let mut value = minimal();
        value["sensors"] = json!([]);
        assert!(parse(value).is_err());
    }

    #[test]
    fn per_sensor_report_on_change_overrides_runtime() {
        let mut value = minimal();
        value["runtime"] = json!({"report_on_change_only": true});
        value["sensors"][0]["report_on_change_only"] = json!(false);
        let config = parse(value).unwrap();
        assert!(!config.sensors[0].effective_report_on_change(&config.runtime));
    }
}
