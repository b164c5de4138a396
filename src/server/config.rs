use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    /// Tokens accepted on the ingest endpoint. Disjoint from the UI token.
    pub device_tokens: Vec<String>,
    pub ui_token: Option<String>,
    /// Development escape hatch: disables auth when no tokens are set.
    pub allow_unauth: bool,
    pub event_queue_size: usize,
    pub history_limit: i64,
    pub server_host: String,
    pub server_port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: optional("INVENTORY_DB_PATH", "./data/inventory.db"),
            device_tokens: parse_list(&optional("INVENTORY_DEVICE_TOKENS", "")),
            ui_token: std::env::var("INVENTORY_UI_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            allow_unauth: parse_bool(&optional("INVENTORY_ALLOW_UNAUTH", "false")),
            event_queue_size: optional("INVENTORY_EVENT_QUEUE_SIZE", "100")
                .parse()
                .context("INVENTORY_EVENT_QUEUE_SIZE must be a positive integer")?,
            history_limit: optional("INVENTORY_HISTORY_LIMIT", "2000")
                .parse()
                .context("INVENTORY_HISTORY_LIMIT must be a positive integer")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
        })
    }
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_owned())
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
