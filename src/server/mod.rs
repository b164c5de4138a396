//! Central server: idempotent batch ingest, derived item status and
//! alerts, persistent store, live event fan-out and the UI query surface.

pub mod api;
pub mod config;
pub mod db;
pub mod events;

use std::sync::Arc;

use sqlx::SqlitePool;

use config::ServerConfig;
use events::EventBroadcaster;

/// Shared request state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<ServerConfig>,
    pub events: EventBroadcaster,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: ServerConfig) -> Self {
        let events = EventBroadcaster::new(config.event_queue_size);
        Self {
            pool,
            config: Arc::new(config),
            events,
        }
    }
}
