//! Types and timestamp conventions shared by the device uploader and the
//! server ingest endpoint.

use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// Discrete state label attached to every reading.
///
/// `Ok`, `Low` and `Out` drive the server-side alert lifecycle; anything a
/// digital `state_map` produces beyond those (e.g. `open` / `closed`) is
/// carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Ok,
    Low,
    Out,
    Other(String),
}

impl State {
    pub fn as_str(&self) -> &str {
        match self {
            State::Ok => "ok",
            State::Low => "low",
            State::Out => "out",
            State::Other(label) => label,
        }
    }

    /// States that open an alert when a sensor transitions into them.
    pub fn is_alerting(&self) -> bool {
        matches!(self, State::Low | State::Out)
    }
}

impl From<&str> for State {
    fn from(value: &str) -> Self {
        match value {
            "ok" => State::Ok,
            "low" => State::Low,
            "out" => State::Out,
            other => State::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(State::from(label.as_str()))
    }
}

/// `low` / `ok` threshold pair for hysteretic classification.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Thresholds {
    pub low: Option<f64>,
    pub ok: Option<f64>,
}

/// A classified reading as it travels over the wire. `seq_id` is the
/// device-local sequence id assigned by the outbox.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub seq_id: i64,
    pub sensor_id: String,
    pub ts: String,
    pub raw_value: Option<f64>,
    pub normalized_value: Option<f64>,
    #[schema(value_type = String)]
    pub state: State,
}

/// Per-sensor metadata shipped alongside a batch. Accepted by the server
/// but not persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SensorMeta {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_map: Option<HashMap<String, String>>,
}

/// Upload payload: `POST /api/v1/readings/batch`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReadingsBatch {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    pub readings: Vec<Reading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_meta: Option<Vec<SensorMeta>>,
}

/// Ingest response. `ack_seq_id` is the only signal the device uses to
/// truncate its outbox.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchAck {
    pub ack_seq_id: Option<i64>,
    pub server_time: String,
}

/// Fixed-width RFC 3339 UTC with microsecond precision, so that stored
/// timestamps order lexicographically in chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn utc_now_iso() -> String {
    format_ts(Utc::now())
}

/// Parses an ISO-8601 timestamp; tz-naive values are assumed UTC.
pub fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("missing timestamp");
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    match trimmed.parse::<NaiveDateTime>() {
        Ok(naive) => Ok(naive.and_utc()),
        Err(err) => bail!("invalid timestamp {trimmed:?}: {err}"),
    }
}

/// Parses and re-serializes a timestamp into the canonical stored form.
pub fn normalize_ts(value: &str) -> Result<String> {
    Ok(format_ts(parse_ts(value)?))
}
