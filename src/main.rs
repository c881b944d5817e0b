use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use eventgate::config::AppConfig;
use eventgate::consensus::{CommandLog, SoloLog};
use eventgate::engine::Engine;
use eventgate::fsm::MemDb;
use eventgate::script::NoopRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = if config_path.exists() {
        AppConfig::load(&config_path)?
    } else {
        info!("no config file at {}, using defaults", config_path.display());
        AppConfig::default()
    };

    let db = Arc::new(MemDb::new());
    let log: Arc<dyn CommandLog> = Arc::new(SoloLog::new(db.clone()));
    let engine = Engine::start(&config, db, log, Arc::new(NoopRunner));

    tokio::spawn(eventgate::daemon::start_health_server(
        config.node.health_port,
        engine.store.clone(),
    ));

    info!(node_id = %config.node.id, "eventgate started");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    engine.shutdown();
    Ok(())
}
