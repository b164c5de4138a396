//! Timer-driven batch uploader with exponential backoff and ack-driven
//! outbox truncation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::device::config::{DeviceConfig, NetworkConfig};
use crate::device::outbox::Outbox;
use crate::wire::{utc_now_iso, BatchAck, ReadingsBatch, SensorMeta};

/// Transport seam: sends one batch and returns the server's ack.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send_batch(&self, batch: &ReadingsBatch) -> Result<BatchAck>;
}

/// `POST {base_url}/api/v1/readings/batch` over reqwest with bearer auth
/// and bounded connect/read timeouts.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HttpTransport {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_seconds))
            .timeout(Duration::from_secs(network.read_timeout_seconds))
            .user_agent(concat!(
                "smart-inventory-device/",
                env!("CARGO_PKG_VERSION")
            ));

        if let Some(ca_path) = &network.ca_cert_path {
            let pem = std::fs::read(ca_path)
                .with_context(|| format!("failed to read CA certificate {ca_path}"))?;
            builder = builder.add_root_certificate(
                reqwest::Certificate::from_pem(&pem)
                    .with_context(|| format!("invalid CA certificate {ca_path}"))?,
            );
        }

        let base_url = network.base_url.as_deref().unwrap_or_default();
        Ok(Self {
            http: builder.build()?,
            url: format!("{}/api/v1/readings/batch", base_url.trim_end_matches('/')),
            api_token: network.api_token.clone(),
        })
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send_batch(&self, batch: &ReadingsBatch) -> Result<BatchAck> {
        let mut request = self.http.post(&self.url).json(batch);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        let ack = request
            .send()
            .await
            .context("readings upload request failed")?
            .error_for_status()
            .context("readings upload rejected")?
            .json::<BatchAck>()
            .await
            .context("invalid readings upload response")?;
        Ok(ack)
    }
}

/// Flush state machine. Sends when a full batch is waiting or the flush
/// interval has elapsed; on transport failure it backs off exponentially
/// (1 s doubling up to `retry_max_seconds`) and leaves the outbox intact.
pub struct Uploader<T> {
    outbox: Arc<Outbox>,
    transport: T,
    device_id: String,
    firmware: String,
    sensor_meta: Vec<SensorMeta>,
    batch_size: i64,
    flush_interval: Duration,
    retry_max: Duration,
    last_flush: Option<Instant>,
    next_retry_at: Option<Instant>,
    retry_delay: Duration,
}

impl<T: BatchTransport> Uploader<T> {
    pub fn new(
        outbox: Arc<Outbox>,
        transport: T,
        config: &DeviceConfig,
        sensor_meta: Vec<SensorMeta>,
    ) -> Self {
        Self {
            outbox,
            transport,
            device_id: config.device_id().to_owned(),
            firmware: config.device.firmware.clone(),
            sensor_meta,
            batch_size: config.network.batch_size,
            flush_interval: Duration::from_secs(config.network.flush_interval_seconds),
            retry_max: Duration::from_secs(config.network.retry_max_seconds),
            last_flush: None,
            next_retry_at: None,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Ticks until the stop flag flips. Outbox faults are logged and
    /// retried on the next tick; the fatal path for a broken queue backing
    /// is the polling loop's enqueue.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let tick = self.flush_interval.min(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.flush(Instant::now()).await {
                        error!(error = %err, "Outbox flush failed");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Uploader stopped");
    }

    async fn flush(&mut self, now: Instant) -> Result<()> {
        if let Some(retry_at) = self.next_retry_at {
            if now < retry_at {
                return Ok(());
            }
        }

        let pending = self.outbox.pending_count().await?;
        if pending == 0 {
            return Ok(());
        }
        if pending < self.batch_size && !self.interval_elapsed(now) {
            return Ok(());
        }

        let readings = self.outbox.get_batch(self.batch_size).await?;
        let Some(last_seq) = readings.last().map(|r| r.seq_id) else {
            return Ok(());
        };

        let batch = ReadingsBatch {
            device_id: self.device_id.clone(),
            firmware: Some(self.firmware.clone()),
            sent_at: Some(utc_now_iso()),
            readings,
            sensor_meta: (!self.sensor_meta.is_empty()).then(|| self.sensor_meta.clone()),
        };

        match self.transport.send_batch(&batch).await {
            Ok(ack) => {
                let ack_seq = ack.ack_seq_id.unwrap_or(last_seq);
                self.outbox.ack_upto(ack_seq).await?;
                debug!(ack_seq, count = batch.readings.len(), "Batch acknowledged");
                self.last_flush = Some(now);
                self.next_retry_at = None;
                self.retry_delay = Duration::from_secs(1);
            }
            Err(err) => {
                warn!(error = %err, "Upload failed");
                self.schedule_retry(now);
            }
        }
        Ok(())
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        match self.last_flush {
            Some(last) => now.duration_since(last) >= self.flush_interval,
            None => true,
        }
    }

    fn schedule_retry(&mut self, now: Instant) {
        self.next_retry_at = Some(now + self.retry_delay);
        self.retry_delay = (self.retry_delay * 2).min(self.retry_max);
    }
}
