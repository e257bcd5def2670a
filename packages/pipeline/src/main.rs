// Main entry point for the lookout pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pipeline_core::ai::Orchestrator;
use pipeline_core::matcher::KeywordMatcher;
use pipeline_core::notify::LogNotifier;
use pipeline_core::pipeline::{start_scheduler, CoordinatorConfig, PipelineCoordinator};
use pipeline_core::report::ReportKind;
use pipeline_core::storage::{PostgresStore, Storage};
use pipeline_core::types::SourceId;
use pipeline_core::Settings;

#[derive(Parser)]
#[command(name = "lookout", about = "Intelligence pipeline runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cron scheduler until interrupted.
    Serve,
    /// Crawl one source, or every due source.
    Crawl {
        /// Source id; omit to crawl everything that is due.
        #[arg(long)]
        source_id: Option<Uuid>,
    },
    /// Enrich pending contents.
    Enrich,
    /// Send notifications for important processed contents.
    Notify,
    /// Generate a report.
    Report {
        #[arg(long, default_value = "daily")]
        kind: String,
        #[arg(long)]
        topic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pipeline_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let settings = Settings::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("database connected");

    let storage: Arc<dyn Storage> = Arc::new(PostgresStore::new(pool));
    let ai = Arc::new(Orchestrator::from_settings(&settings));

    let groups = storage.list_keyword_groups().await?;
    let matcher = Arc::new(KeywordMatcher::new(&groups, Some(Arc::clone(&ai)), true));

    let coordinator = Arc::new(PipelineCoordinator::new(
        Arc::clone(&storage),
        ai,
        matcher,
        Arc::new(LogNotifier),
        CoordinatorConfig::from_settings(&settings),
    ));

    match cli.command {
        Command::Serve => {
            let _scheduler = start_scheduler(Arc::clone(&coordinator), Arc::clone(&storage)).await?;
            tracing::info!("scheduler running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
        }
        Command::Crawl { source_id } => match source_id {
            Some(id) => {
                match coordinator.crawl_source(SourceId(id), None).await? {
                    Some(job) => tracing::info!(
                        status = job.status.as_str(),
                        items_collected = job.items_collected,
                        items_saved = job.items_saved,
                        "crawl finished"
                    ),
                    None => tracing::warn!("crawl trigger dropped (not due, paused, or unknown)"),
                }
            }
            None => {
                let jobs = coordinator.crawl_due_sources().await?;
                tracing::info!(jobs = jobs.len(), "due-source crawl finished");
            }
        },
        Command::Enrich => {
            let job = coordinator.enrich_pending(None).await?;
            tracing::info!(
                status = job.status.as_str(),
                processed = job.items_saved,
                "enrich finished"
            );
        }
        Command::Notify => {
            let job = coordinator.notify_pending(None).await?;
            tracing::info!(
                status = job.status.as_str(),
                notified = job.items_notified,
                "notify finished"
            );
        }
        Command::Report { kind, topic } => {
            let kind = match kind.as_str() {
                "daily" => ReportKind::Daily,
                "weekly" => ReportKind::Weekly,
                "custom" => ReportKind::Custom,
                other => anyhow::bail!("unknown report kind: {other}"),
            };
            let job = coordinator
                .generate_report(kind, topic.as_deref(), None)
                .await?;
            tracing::info!(status = job.status.as_str(), "report finished");
        }
    }

    Ok(())
}
