pub mod open;
pub mod probe;
pub mod status;
pub mod sync;

use std::path::Path;
use std::time::Duration;

use satchel_core::config::SatchelConfig;
use satchel_core::db::sqlite::SqliteRepository;
use satchel_core::db::DatabasePool;
use satchel_core::remote::client::RemoteClient;
use tracing::info;

/// Load and validate the configuration file.
pub fn load_config(config_path: &str) -> anyhow::Result<SatchelConfig> {
    let config = SatchelConfig::load(Path::new(config_path))?;
    config.validate()?;
    info!("Loaded configuration from {}", config_path);
    Ok(config)
}

/// Open the configured SQLite database, creating it if needed.
pub async fn open_repository(config: &SatchelConfig) -> anyhow::Result<SqliteRepository> {
    let path = config
        .satchel
        .database
        .path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("SQLite path not configured"))?;
    let connect_str = format!("sqlite:{}?mode=rwc", path);
    let DatabasePool::Sqlite(pool) = DatabasePool::new_sqlite(&connect_str).await?;
    info!("Connected to database");
    Ok(SqliteRepository::new(pool))
}

pub fn remote_client(config: &SatchelConfig) -> anyhow::Result<RemoteClient> {
    Ok(RemoteClient::new(Duration::from_secs(
        config.remote.timeout_secs,
    ))?)
}
