//! Digital GPIO sensor reading a kernel-exported line value
//! (`/sys/class/gpio/gpio<N>/value`).

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;

use super::{Sample, Sensor};

#[derive(Debug, Deserialize)]
pub struct DigitalGpioParams {
    pub gpio_pin: u32,
    #[serde(default = "default_true")]
    pub active_high: bool,
}

fn default_true() -> bool {
    true
}

pub struct DigitalGpioSensor {
    sensor_id: String,
    value_path: PathBuf,
    active_high: bool,
}

impl DigitalGpioSensor {
    pub fn new(sensor_id: &str, params: DigitalGpioParams) -> Result<Self> {
        let value_path = PathBuf::from(format!("/sys/class/gpio/gpio{}/value", params.gpio_pin));
        if !value_path.exists() {
            bail!("GPIO line {} is not exported", params.gpio_pin);
        }
        Ok(Self {
            sensor_id: sensor_id.to_owned(),
            value_path,
            active_high: params.active_high,
        })
    }
}

impl Sensor for DigitalGpioSensor {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn read(&mut self) -> Result<Option<Sample>> {
        let Ok(content) = std::fs::read_to_string(&self.value_path) else {
            return Ok(None);
        };
        let Ok(raw) = content.trim().parse::<i64>() else {
            return Ok(None);
        };
        let mut value = i64::from(raw != 0);
        if !self.active_high {
            value = 1 - value;
        }
        Ok(Some(Sample::uniform(value as f64)))
    }
}
