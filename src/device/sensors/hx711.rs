//! HX711 load cell read through the kernel IIO raw-counts file
//! (e.g. `/sys/bus/iio/devices/iio:device0/in_voltage0_raw`). Averages a
//! handful of raw reads, then applies tare and scale.

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;

use super::{Sample, Sensor};

#[derive(Debug, Deserialize)]
pub struct Hx711Params {
    pub raw_path: String,
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
    #[serde(default)]
    pub tare_offset: f64,
    #[serde(default = "default_samples")]
    pub samples: u32,
}

fn default_scale() -> f64 {
    1.0
}

fn default_samples() -> u32 {
    5
}

pub struct Hx711Sensor {
    sensor_id: String,
    raw_path: PathBuf,
    scale_factor: f64,
    tare_offset: f64,
    samples: u32,
}

impl Hx711Sensor {
    pub fn new(sensor_id: &str, params: Hx711Params) -> Result<Self> {
        let raw_path = PathBuf::from(&params.raw_path);
        if !raw_path.exists() {
            bail!("load cell raw counts file {} not found", params.raw_path);
        }
        Ok(Self {
            sensor_id: sensor_id.to_owned(),
            raw_path,
            scale_factor: if params.scale_factor != 0.0 {
                params.scale_factor
            } else {
                1.0
            },
            tare_offset: params.tare_offset,
            samples: params.samples.max(1),
        })
    }

    fn read_raw(&self) -> Option<f64> {
        let mut total = 0.0;
        let mut count = 0u32;
        for _ in 0..self.samples {
            let Ok(content) = std::fs::read_to_string(&self.raw_path) else {
                continue;
            };
            if let Ok(value) = content.trim().parse::<f64>() {
                total += value;
                count += 1;
            }
        }
        (count > 0).then(|| total / f64::from(count))
    }
}

impl Sensor for Hx711Sensor {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn read(&mut self) -> Result<Option<Sample>> {
        let Some(raw) = self.read_raw() else {
            return Ok(None);
        };
        let normalized = (raw - self.tare_offset) / self.scale_factor;
        Ok(Some(Sample { raw, normalized }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_and_scales_raw_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in_voltage0_raw");
        std::fs::write(&path, "8400").unwrap();

        let mut sensor = Hx711Sensor::new(
            "scale-1",
            Hx711Params {
                raw_path: path.to_string_lossy().into_owned(),
                scale_factor: 420.0,
                tare_offset: 8000.0,
                samples: 3,
            },
        )
        .unwrap();

        let sample = sensor.read().unwrap().unwrap();
        assert_eq!(sample.raw, 8400.0);
        assert!((sample.normalized - 400.0 / 420.0).abs() < 1e-9);
    }

    #[test]
    fn missing_raw_file_fails_initialization() {
        let err = Hx711Sensor::new(
            "scale-1",
            Hx711Params {
                raw_path: "/nonexistent/in_voltage0_raw".into(),
                scale_factor: 1.0,
                tare_offset: 0.0,
                samples: 1,
            },
        );
        assert!(err.is_err());
    }
}
