//! Civic Reports Server
//!
//! Moderated infrastructure-issue submissions with a points leaderboard

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use civic_reports::artifact::FsArtifactStore;
use civic_reports::config::Config;
use civic_reports::leaderboard::LeaderboardService;
use civic_reports::moderation::OpenAiModeration;
use civic_reports::pg_storage::PgStorage;
use civic_reports::server::{run_server, AppState};
use civic_reports::storage::{ReportStore, SqliteStorage};
use civic_reports::submit::SubmitService;

#[derive(Debug, Parser)]
#[command(name = "civic-reports-server", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override the bind host
    #[arg(long, env = "CIVIC_REPORTS_HOST")]
    host: Option<String>,

    /// Override the bind port
    #[arg(long, env = "CIVIC_REPORTS_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Civic Reports Server");

    let args = Args::parse();
    let config = Config::load_from(&args.config)?;

    // DATABASE_URL selects the PostgreSQL backend; otherwise the embedded
    // SQLite file from the config is used.
    let store: Arc<dyn ReportStore> = match config.database_url() {
        Some(url) => {
            let storage = PgStorage::new(&url).await?;
            info!("PostgreSQL storage initialized");
            Arc::new(storage)
        }
        None => {
            let storage = SqliteStorage::new(&config.database.sqlite_path)?;
            info!(path = %config.database.sqlite_path, "SQLite storage initialized");
            Arc::new(storage)
        }
    };

    let moderation = Arc::new(OpenAiModeration::new(
        &config.moderation,
        config.moderation_api_key(),
    )?);
    let artifacts = FsArtifactStore::new(&config.uploads.root);

    let submit = SubmitService::new(
        moderation,
        artifacts,
        store.clone(),
        config.rewards.points_per_report,
    );
    let leaderboard = LeaderboardService::new(store.clone());

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    run_server(
        &host,
        port,
        AppState {
            submit,
            leaderboard,
            store,
            started_at: std::time::Instant::now(),
        },
    )
    .await
}
