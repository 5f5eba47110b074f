use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "satchel",
    about = "Sync courses, tasks, grades and attendance from a learning platform",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "satchel.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run one sync cycle against the configured remote
    Sync,
    /// Show the last sync run and local data counts
    Status,
    /// Probe which optional remote functions the deployment supports
    Probe,
    /// Show how to reach a feature, falling back to the platform's web UI
    Open {
        /// Feature name: attendance, messages or grades
        feature: String,
        /// Remote course id to scope the link to
        #[arg(long)]
        course: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync => {
            commands::sync::run(&cli.config).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
        Commands::Probe => {
            commands::probe::run(&cli.config).await?;
        }
        Commands::Open { feature, course } => {
            commands::open::run(&cli.config, &feature, course).await?;
        }
    }

    Ok(())
}
