//! File-backed sensor: reads a numeric value from a text file. Useful for
//! tests, simulations, and anything the kernel already exposes as a file.

use anyhow::Result;
use serde::Deserialize;

use super::{Sample, Sensor};
use crate::device::processing::Mode;

#[derive(Debug, Deserialize)]
pub struct FileSensorParams {
    pub path: String,
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
    #[serde(default)]
    pub tare_offset: f64,
}

fn default_mode() -> Mode {
    Mode::Analog
}

fn default_scale() -> f64 {
    1.0
}

pub struct FileSensor {
    sensor_id: String,
    params: FileSensorParams,
}

impl FileSensor {
    pub fn new(sensor_id: &str, params: FileSensorParams) -> Self {
        Self {
            sensor_id: sensor_id.to_owned(),
            params,
        }
    }
}

impl Sensor for FileSensor {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn read(&mut self) -> Result<Option<Sample>> {
        let Ok(content) = std::fs::read_to_string(&self.params.path) else {
            return Ok(None);
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let Ok(raw) = trimmed.parse::<f64>() else {
            return Ok(None);
        };

        if self.params.mode == Mode::Digital {
            return Ok(Some(Sample::uniform(if raw != 0.0 { 1.0 } else { 0.0 })));
        }

        let normalized = (raw - self.params.tare_offset) / self.params.scale_factor;
        Ok(Some(Sample { raw, normalized }))
    }
}
