//! consentry - operational entry point for the consent-form pipeline.
//!
//! Three subcommands cover the pipeline's lifecycle: `init-schema` builds
//! the tracking store, `ingest` runs one batch of discovery, rendering,
//! and ticket creation, and `reconcile` mirrors external ticket state
//! back into the ledger. All settings come from the environment; a
//! `.env` file is honored when present.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consentry_core::defaults;
use consentry_db::{
    admin, create_pool, PgAttachmentRepository, PgSourceRepository, PgTicketRepository,
};
use consentry_pipeline::{
    BatchAggregator, BatchConfig, BlobStore, FsBlobStore, IngestOptions, Ingestor, PatientLinker,
    S3BlobStore, S3Config,
};
use consentry_render::RenderOptions;
use consentry_tracker::{Reconciler, TrackerClient};

#[derive(Parser)]
#[command(name = "consentry")]
#[command(author, version, about = "Consent form ingestion and reconciliation")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new consent forms and raise review and fault issues
    Ingest {
        /// Maximum candidates this run (overrides CONSENTRY_BATCH_LIMIT)
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Mirror external ticket state into the tracking store
    Reconcile,

    /// Build the tracking schema
    InitSchema {
        /// Drop the existing schema first
        #[arg(long)]
        drop: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest { limit } => cmd_ingest(limit).await,
        Commands::Reconcile => cmd_reconcile().await,
        Commands::InitSchema { drop } => cmd_init_schema(drop).await,
    }
}

async fn cmd_ingest(limit: Option<i64>) -> anyhow::Result<()> {
    let tracking_pool = create_pool(&require_env("CONSENTRY_DATABASE_URL")?).await?;
    let source_pool = create_pool(&require_env("CONSENTRY_SOURCE_DATABASE_URL")?).await?;

    let image_store_dir = PathBuf::from(
        std::env::var("CONSENTRY_IMAGE_STORE_DIR")
            .unwrap_or_else(|_| "/var/lib/consentry/images".to_string()),
    );

    let mut render = RenderOptions::default();
    if let Some(dpi) = parse_env("CONSENTRY_RENDER_DPI")? {
        render.dpi = dpi;
    }
    if let Some(stddev) = parse_env("CONSENTRY_BLANK_STDDEV")? {
        render.blank_stddev = stddev;
    }

    // CONSENTRY_BLOB_DIR selects the filesystem backend for local runs;
    // otherwise blobs come from S3.
    let blob: Arc<dyn BlobStore> = match std::env::var("CONSENTRY_BLOB_DIR") {
        Ok(dir) => Arc::new(FsBlobStore::new(dir)),
        Err(_) => Arc::new(S3BlobStore::new(S3Config::from_env()?).await),
    };

    let ingestor = Ingestor::new(
        blob,
        PgAttachmentRepository::new(tracking_pool.clone()),
        PatientLinker::new(PgSourceRepository::new(source_pool.clone())),
        IngestOptions {
            render,
            image_store_dir,
        },
    );

    let tracker = TrackerClient::from_env()?;
    let config = BatchConfig {
        project_key: require_env("CONSENTRY_TRACKER_PROJECT")?,
        assignee: require_env("CONSENTRY_TRACKER_ASSIGNEE")?,
        tracker_base_url: require_env("CONSENTRY_TRACKER_URL")?
            .trim_end_matches('/')
            .to_string(),
        project_id: std::env::var("CONSENTRY_TRACKER_PROJECT_ID").ok(),
    };

    let limit = match limit {
        Some(limit) => limit,
        None => parse_env("CONSENTRY_BATCH_LIMIT")?.unwrap_or(defaults::BATCH_LIMIT),
    };

    let aggregator = BatchAggregator::new(
        PgSourceRepository::new(source_pool.clone()),
        PgAttachmentRepository::new(tracking_pool.clone()),
        PgTicketRepository::new(tracking_pool),
        PatientLinker::new(PgSourceRepository::new(source_pool)),
        ingestor,
        tracker,
        config,
    );

    let report = aggregator.run(limit).await?;
    info!(
        subsystem = "cli",
        component = "main",
        op = "ingest",
        retried = report.retried,
        processed = report.processed,
        ready = report.ready,
        errored = report.errored,
        deduped = report.deduped,
        review_key = report.review_key.as_deref().unwrap_or("-"),
        "Batch run finished"
    );
    Ok(())
}

async fn cmd_reconcile() -> anyhow::Result<()> {
    let pool = create_pool(&require_env("CONSENTRY_DATABASE_URL")?).await?;
    let tracker = TrackerClient::from_env()?;
    let reconciler = Reconciler::new(
        tracker,
        PgTicketRepository::new(pool.clone()),
        PgAttachmentRepository::new(pool),
    );

    let report = reconciler.reconcile().await?;
    info!(
        subsystem = "cli",
        component = "main",
        op = "reconcile",
        examined = report.examined,
        changed = report.changed,
        missing = report.missing,
        "Reconciliation finished"
    );

    if let Ok(jql) = std::env::var("CONSENTRY_TRACKER_JQL") {
        let discovered = reconciler.discover_fault_tickets(&jql).await?;
        info!(
            subsystem = "cli",
            component = "main",
            op = "reconcile",
            discovered,
            "Fault-ticket discovery finished"
        );
    }
    Ok(())
}

async fn cmd_init_schema(drop: bool) -> anyhow::Result<()> {
    let pool = create_pool(&require_env("CONSENTRY_DATABASE_URL")?).await?;
    if drop {
        admin::drop_schema(&pool).await?;
    }
    admin::build_schema(&pool).await?;
    info!(
        subsystem = "cli",
        component = "main",
        op = "init_schema",
        dropped = drop,
        "Tracking schema ready"
    );
    Ok(())
}

fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{} is not set", name))
}

fn parse_env<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} is not a valid value for {}", value, name)),
        Err(_) => Ok(None),
    }
}
