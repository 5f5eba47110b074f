use std::sync::Arc;
use std::time::Instant;

use satchel_core::capability::ProbeMode;
use satchel_core::models::common::ResourceKind;
use satchel_core::models::sync::SyncStatus;
use satchel_core::sync::SyncEngine;
use tracing::{error, warn};

/// Run the `sync` command: one full cycle against the configured remote.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let repo = super::open_repository(&config).await?;
    let client = super::remote_client(&config)?;

    let engine = SyncEngine::new(Arc::new(repo), Arc::new(client), config.sync.clone())
        .with_probe_mode(ProbeMode::from_strict_flag(config.remote.strict_capabilities));
    match config.remote_config() {
        Some(credentials) => engine.set_credentials(credentials),
        None => warn!("No remote token configured; set remote.token or SATCHEL_TOKEN"),
    }

    println!("Starting sync with {}...", config.remote.base_url);
    let start = Instant::now();

    let Some(sync_run) = engine.run().await? else {
        println!("A sync is already in progress.");
        return Ok(());
    };

    match sync_run.status {
        SyncStatus::Completed => {
            println!(
                "Sync completed successfully in {:.1}s",
                start.elapsed().as_secs_f64()
            );
            for kind in ResourceKind::ORDERED {
                if sync_run.counts.was_skipped(kind) {
                    println!("  {:<20} skipped (fetch failed)", format!("{kind}:"));
                    continue;
                }
                let counts = sync_run.counts.get(kind);
                println!(
                    "  {:<20} {} created, {} updated, {} unchanged, {} skipped",
                    format!("{kind}:"),
                    counts.created,
                    counts.updated,
                    counts.unchanged,
                    counts.skipped
                );
            }
            if !sync_run.counts.attendance_skipped_courses.is_empty() {
                println!(
                    "  Attendance skipped for courses: {:?}",
                    sync_run.counts.attendance_skipped_courses
                );
            }
            Ok(())
        }
        _ => {
            let message = sync_run
                .error_message
                .unwrap_or_else(|| "unknown error".to_string());
            error!("Sync failed: {message}");
            println!("Sync failed: {message}");
            anyhow::bail!("sync run {} failed", sync_run.id)
        }
    }
}
