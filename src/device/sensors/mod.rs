//! Sensor drivers. Each driver exposes one capability: produce a
//! `(raw, normalized)` sample, or nothing this tick.

mod digital_gpio;
mod file_sensor;
mod hx711;

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use digital_gpio::DigitalGpioSensor;
pub use file_sensor::FileSensor;
pub use hx711::Hx711Sensor;

use crate::device::config::SensorConfig;

/// One polled sample. `raw` is the driver-level value, `normalized` the
/// value the signal processor consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub raw: f64,
    pub normalized: f64,
}

impl Sample {
    pub fn uniform(value: f64) -> Self {
        Self {
            raw: value,
            normalized: value,
        }
    }
}

pub trait Sensor: Send {
    fn sensor_id(&self) -> &str;

    /// Read errors are treated as "no sample this tick" by the polling
    /// loop; drivers reserve `Err` for faults worth surfacing in logs.
    fn read(&mut self) -> Result<Option<Sample>>;
}

/// Builds a driver from its configuration. Unknown types fail sensor
/// initialization (logged and skipped by the device service).
pub fn create_sensor(config: &SensorConfig) -> Result<Box<dyn Sensor>> {
    match config.sensor_type.as_str() {
        "digital_gpio" => Ok(Box::new(DigitalGpioSensor::new(
            &config.sensor_id,
            params(config)?,
        )?)),
        "file_sensor" => Ok(Box::new(FileSensor::new(
            &config.sensor_id,
            params(config)?,
        ))),
        "hx711" => Ok(Box::new(Hx711Sensor::new(
            &config.sensor_id,
            params(config)?,
        )?)),
        other => bail!("unsupported sensor type: {other}"),
    }
}

fn params<P: DeserializeOwned>(config: &SensorConfig) -> Result<P> {
    serde_json::from_value(Value::Object(config.params.clone())).map_err(|err| {
        anyhow::anyhow!(
            "invalid parameters for sensor {}: {err}",
            config.sensor_id
        )
    })
}
