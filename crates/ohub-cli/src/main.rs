use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ohub_storage::{HttpFetcher, JsonTransport, PgOpportunityStore};
use ohub_sync::{build_adapters, SyncConfig, SyncPipeline};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str =
    "ohub_cli=info,ohub_sync=info,ohub_adapters=info,ohub_storage=info,ohub_web=info";

#[derive(Debug, Parser)]
#[command(name = "ohub-cli")]
#[command(about = "Opportunity Hub command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every registered source and upsert the results.
    Sync,
    /// Serve the opportunities HTTP API.
    Serve,
    /// Print each source's configuration status as JSON.
    Status,
    /// Apply database migrations to DATABASE_URL.
    Migrate,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env().context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let pipeline = SyncPipeline::from_config(&config).await?;
            let summary = pipeline.ingest(&Default::default()).await;
            let report = summary.report;
            println!(
                "sync complete: added={} updated={} skipped={} total={}",
                report.added, report.updated, report.skipped, report.total
            );
            for (source, count) in &summary.fetched {
                println!("  {source}: {count} fetched");
            }
        }
        Commands::Serve => ohub_web::serve(config).await?,
        Commands::Status => {
            let transport: Arc<dyn JsonTransport> =
                Arc::new(HttpFetcher::new(config.http_client_config())?);
            let statuses = build_adapters(&config, transport)
                .iter()
                .map(|adapter| adapter.status())
                .collect::<Vec<_>>();
            let statuses = serde_json::to_string_pretty(&statuses)
                .context("serializing source status")?;
            println!("{statuses}");
        }
        Commands::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to run migrations")?;
            let store = PgOpportunityStore::connect(url).await?;
            store.migrate().await?;
            info!("migrations applied");
        }
    }

    Ok(())
}
