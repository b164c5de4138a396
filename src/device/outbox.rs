//! Durable outbox: an append-only SQLite queue of classified readings
//! keyed by a monotonic local sequence id.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::device::processing::NewReading;
use crate::wire::{format_ts, Reading, State};

/// Pending-upload queue backed by a single-connection SQLite pool, so every
/// operation from the polling writer and the uploader reader serializes.
/// Each enqueue commits before returning; `AUTOINCREMENT` keeps sequence
/// ids strictly increasing across restarts.
pub struct Outbox {
    pool: SqlitePool,
    max_rows: Option<i64>,
    max_age_seconds: Option<i64>,
}

impl Outbox {
    pub async fn open(
        db_path: &Path,
        max_rows: Option<i64>,
        max_age_seconds: Option<i64>,
    ) -> Result<Self> {
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open outbox at {}", db_path.display()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                seq_id INTEGER PRIMARY KEY AUTOINCREMENT,
                sensor_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                raw_value REAL,
                normalized_value REAL,
                state TEXT NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            max_rows: max_rows.filter(|rows| *rows > 0),
            max_age_seconds: max_age_seconds.filter(|age| *age > 0),
        })
    }

    /// Stores a reading and returns its assigned sequence id. Retention
    /// trimming runs after every enqueue.
    pub async fn enqueue(&self, reading: &NewReading) -> Result<i64> {
        let seq_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO readings (sensor_id, ts, raw_value, normalized_value, state)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING seq_id;
            "#,
        )
        .bind(&reading.sensor_id)
        .bind(&reading.ts)
        .bind(reading.raw_value)
        .bind(reading.normalized_value)
        .bind(reading.state.as_str())
        .fetch_one(&self.pool)
        .await?;
        self.trim().await?;
        Ok(seq_id)
    }

    /// Oldest pending readings, ascending by sequence id.
    pub async fn get_batch(&self, limit: i64) -> Result<Vec<Reading>> {
        let rows: Vec<(i64, String, String, Option<f64>, Option<f64>, String)> = sqlx::query_as(
            r#"
            SELECT seq_id, sensor_id, ts, raw_value, normalized_value, state
            FROM readings
            ORDER BY seq_id ASC
            LIMIT ?1;
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(seq_id, sensor_id, ts, raw_value, normalized_value, state)| Reading {
                    seq_id,
                    sensor_id,
                    ts,
                    raw_value,
                    normalized_value,
                    state: State::from(state.as_str()),
                },
            )
            .collect())
    }

    /// Deletes every reading with `seq_id <= seq`. Idempotent.
    pub async fn ack_upto(&self, seq: i64) -> Result<()> {
        sqlx::query("DELETE FROM readings WHERE seq_id <= ?1;")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings;")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn max_seq_id(&self) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(seq_id) FROM readings;")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    /// Bounded retention. Under catastrophic backlog this may drop rows
    /// that were never acked; fresh data is preferred over old.
    pub async fn trim(&self) -> Result<()> {
        if self.max_rows.is_none() && self.max_age_seconds.is_none() {
            return Ok(());
        }

        if let Some(max_age) = self.max_age_seconds {
            let cutoff = format_ts(Utc::now() - Duration::seconds(max_age));
            sqlx::query("DELETE FROM readings WHERE ts < ?1;")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        }

        if let Some(max_rows) = self.max_rows {
            let count = self.pending_count().await?;
            if count > max_rows {
                sqlx::query(
                    r#"
                    DELETE FROM readings
                    WHERE seq_id IN (
                        SELECT seq_id FROM readings
                        ORDER BY seq_id ASC
                        LIMIT ?1
                    );
                    "#,
                )
                .bind(count - max_rows)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
