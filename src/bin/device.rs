use std::path::Path;

use anyhow::{bail, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smart_inventory::device::{config::load_config, DeviceService};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let Some(config_path) = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SMART_INVENTORY_CONFIG").ok())
    else {
        bail!("config path required as first argument or SMART_INVENTORY_CONFIG");
    };

    let config = load_config(Path::new(&config_path))?;
    let service = DeviceService::new(config).await?;
    service.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
