//! Device agent: polls sensors, classifies readings, queues them durably
//! and uploads them in batches.

pub mod config;
pub mod outbox;
pub mod processing;
pub mod sensors;
pub mod uploader;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::wire::{utc_now_iso, SensorMeta};
use config::DeviceConfig;
use outbox::Outbox;
use processing::SensorProcessor;
use sensors::{create_sensor, Sensor};
use uploader::{HttpTransport, Uploader};

/// The polling worker plus the upload worker, sharing the outbox.
///
/// Sensor init failures are logged and that sensor skipped; construction
/// fails only when zero sensors come up (or the outbox cannot be opened).
pub struct DeviceService {
    config: DeviceConfig,
    outbox: Arc<Outbox>,
    sensors: Vec<Box<dyn Sensor>>,
    processors: HashMap<String, SensorProcessor>,
    sensor_meta: Vec<SensorMeta>,
    started: Instant,
}

impl DeviceService {
    pub async fn new(config: DeviceConfig) -> Result<Self> {
        let queue_db_path = config
            .storage
            .queue_db_path
            .as_deref()
            .context("storage.queue_db_path is required")?;
        let outbox = Outbox::open(
            Path::new(queue_db_path),
            config.storage.max_queue_rows,
            config.storage.max_queue_age_seconds,
        )
        .await?;

        let mut sensors: Vec<Box<dyn Sensor>> = Vec::new();
        let mut processors = HashMap::new();
        let mut sensor_meta = Vec::new();

        for sensor_cfg in &config.sensors {
            let sensor = match create_sensor(sensor_cfg) {
                Ok(sensor) => sensor,
                Err(err) => {
                    error!(sensor_id = %sensor_cfg.sensor_id, error = %err, "Sensor failed to initialize");
                    continue;
                }
            };

            let processor = SensorProcessor::new(
                &sensor_cfg.sensor_id,
                sensor_cfg.effective_mode(),
                sensor_cfg.debounce_ms,
                sensor_cfg.thresholds,
                sensor_cfg.state_map.clone(),
                sensor_cfg.effective_report_on_change(&config.runtime),
            );
            sensors.push(sensor);
            processors.insert(sensor_cfg.sensor_id.clone(), processor);
            sensor_meta.push(SensorMeta {
                sensor_id: sensor_cfg.sensor_id.clone(),
                sensor_type: sensor_cfg.sensor_type.clone(),
                thresholds: sensor_cfg.thresholds,
                state_map: sensor_cfg.state_map.clone(),
            });
        }

        if sensors.is_empty() {
            bail!("no sensors initialized");
        }

        Ok(Self {
            config,
            outbox: Arc::new(outbox),
            sensors,
            processors,
            sensor_meta,
            started: Instant::now(),
        })
    }

    /// Runs both workers until `shutdown` resolves. Pending outbox rows
    /// survive a clean stop.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(device_id = %self.config.device_id(), sensors = self.sensors.len(), "Device service starting");

        let (stop_tx, stop_rx) = watch::channel(false);
        let transport = HttpTransport::new(&self.config.network)?;
        let uploader = Uploader::new(
            Arc::clone(&self.outbox),
            transport,
            &self.config,
            self.sensor_meta.clone(),
        );
        let upload_task = tokio::spawn(uploader.run(stop_rx));

        let poll_interval = Duration::from_millis(self.config.runtime.poll_interval_ms.max(50));
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await?,
                _ = &mut shutdown => break,
            }
        }

        let _ = stop_tx.send(true);
        if tokio::time::timeout(Duration::from_secs(2), upload_task)
            .await
            .is_err()
        {
            warn!("Uploader did not stop within 2s");
        }
        info!("Device service stopped");
        Ok(())
    }

    /// One sweep over every sensor, stamped with a single UTC timestamp.
    /// A sensor fault means no sample this tick; an outbox fault is fatal.
    async fn poll_once(&mut self) -> Result<()> {
        let now = self.started.elapsed().as_secs_f64();
        let ts = utc_now_iso();

        for sensor in &mut self.sensors {
            let sample = match sensor.read() {
                Ok(Some(sample)) => sample,
                Ok(None) => continue,
                Err(err) => {
                    debug!(sensor_id = %sensor.sensor_id(), error = %err, "Sensor read failed");
                    continue;
                }
            };
            let Some(processor) = self.processors.get_mut(sensor.sensor_id()) else {
                continue;
            };
            if let Some(reading) = processor.process(sample.raw, sample.normalized, now, &ts) {
                let seq_id = self
                    .outbox
                    .enqueue(&reading)
                    .await
                    .context("outbox enqueue failed")?;
                debug!(sensor_id = %reading.sensor_id, seq_id, state = %reading.state, "Reading queued");
            }
        }
        Ok(())
    }
}
