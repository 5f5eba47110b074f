use satchel_core::db::repository::{
    AttendanceRepository, CourseRepository, GradeRepository, SyncRepository, TaskRepository,
};

/// Run the `status` command: show the last sync run and local entity counts.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let repo = super::open_repository(&config).await?;

    let db_size = config
        .satchel
        .database
        .path
        .as_deref()
        .and_then(|path| std::fs::metadata(path).ok())
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|| "unknown".to_string());

    println!("Satchel Status");
    println!("==============");
    println!("Remote:   {}", config.remote.base_url);
    println!("Database: SQLite ({})", db_size);
    println!();

    match repo.get_latest_sync_run().await? {
        Some(run) => {
            println!("Last Sync");
            println!("---------");
            println!("Status:   {}", run.status.as_str());
            println!(
                "Started:  {}",
                run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(completed) = run.completed_at {
                println!("Completed: {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if let Some(ref err) = run.error_message {
                println!("Error:    {}", err);
            }
            if !run.capabilities.is_empty() {
                println!("Capabilities: {}", run.capabilities.join(", "));
            }
            println!();
        }
        None => {
            println!("No sync runs recorded.");
            println!();
        }
    }

    println!("Local Data");
    println!("----------");
    println!("Courses:             {}", repo.list_courses().await?.len());
    println!("Tasks:               {}", repo.list_tasks().await?.len());
    println!("Grades:              {}", repo.list_grades().await?.len());
    println!(
        "Attendance sessions: {}",
        repo.list_attendance_sessions().await?.len()
    );

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
