//! Sync command handlers.
//!
//! Runs execute synchronously in this process and print the terminal run
//! record. `--dry-run` fetches, normalizes and merges without writing.

use std::fmt::Write as _;
use std::sync::Arc;

use clap::Subcommand;
use wscat_catalog::{build_sources, SyncOptions, SyncOrchestrator, SyncPreview};
use wscat_core::{load_merge_policy, AppConfig, SyncRun, SyncRunType, TriggerSource};
use wscat_db::{CatalogStore, PgCatalogStore};

/// Sub-commands available under `sync`.
#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Fetch the whole source, merge and upsert everything
    Full {
        /// Preview what would be written without touching the catalog
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch records changed since the last successful catalog run
    Incremental {
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply price/stock signals to already-known SKUs
    Stock {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recent sync runs, newest first
    Status {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

pub(crate) async fn run(config: &AppConfig, command: SyncCommands) -> anyhow::Result<()> {
    match command {
        SyncCommands::Full { dry_run } => run_sync(config, SyncRunType::Full, dry_run).await,
        SyncCommands::Incremental { dry_run } => {
            run_sync(config, SyncRunType::Incremental, dry_run).await
        }
        SyncCommands::Stock { dry_run } => run_sync(config, SyncRunType::Stock, dry_run).await,
        SyncCommands::Status { limit } => run_sync_status(config, limit).await,
    }
}

async fn build_orchestrator(config: &AppConfig) -> anyhow::Result<SyncOrchestrator> {
    let pool = crate::connect(config).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));
    let policy = load_merge_policy(&config.policy_path)?;
    let (catalog_source, stock_source) = build_sources(config)?;
    Ok(SyncOrchestrator::new(
        store,
        catalog_source,
        stock_source,
        policy,
        SyncOptions::from_config(config),
    ))
}

/// Run one sync and print its outcome.
///
/// # Errors
///
/// Returns an error if the store, policy or sources cannot be set up, the
/// run row cannot be written, or the run ends `failed`.
async fn run_sync(config: &AppConfig, run_type: SyncRunType, dry_run: bool) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    if dry_run {
        let preview = orchestrator.preview(run_type).await?;
        print!("{}", format_preview(&preview));
        return Ok(());
    }

    orchestrator.reap_stale_runs().await?;
    let run = orchestrator.run(run_type, TriggerSource::Cli).await?;
    println!("{}", format_run_summary(&run));

    if run.status == wscat_core::SyncRunStatus::Failed {
        anyhow::bail!(
            "sync run {} failed: {}",
            run.id,
            run.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn run_sync_status(config: &AppConfig, limit: i64) -> anyhow::Result<()> {
    let pool = crate::connect(config).await?;
    let runs = wscat_db::list_sync_runs(&pool, limit).await?;
    if runs.is_empty() {
        println!("no sync runs recorded; run `sync full` first");
        return Ok(());
    }
    print!("{}", format_run_table(&runs));
    Ok(())
}

pub(crate) fn format_run_summary(run: &SyncRun) -> String {
    let mut line = format!(
        "sync run {} ({}) {}: fetched {}, upserted {}, errors {}, skipped {}",
        run.id,
        run.run_type,
        run.status,
        run.fetched_count,
        run.upserted_count,
        run.error_count,
        run.skipped_count
    );
    if let Some(message) = &run.error_message {
        let _ = write!(line, " ({message})");
    }
    line
}

pub(crate) fn format_run_table(runs: &[SyncRun]) -> String {
    let mut out = format!(
        "{:<8}{:<13}{:<11}{:<10}{:<22}{:>9}{:>10}{:>8}{:>9}\n",
        "ID", "TYPE", "TRIGGER", "STATUS", "STARTED", "FETCHED", "UPSERTED", "ERRORS", "SKIPPED"
    );
    for run in runs {
        let _ = writeln!(
            out,
            "{:<8}{:<13}{:<11}{:<10}{:<22}{:>9}{:>10}{:>8}{:>9}",
            run.id,
            run.run_type.as_str(),
            run.trigger_source.as_str(),
            run.status.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.fetched_count,
            run.upserted_count,
            run.error_count,
            run.skipped_count
        );
    }
    out
}

pub(crate) fn format_preview(preview: &SyncPreview) -> String {
    let run_type = preview.run_type.map_or("sync", SyncRunType::as_str);
    if preview.run_type == Some(SyncRunType::Stock) {
        return format!(
            "dry-run: {run_type} run would apply {} of {} signals ({} carry no price or stock)\n",
            preview.writes, preview.fetched, preview.inert_signals
        );
    }
    format!(
        "dry-run: {run_type} run would upsert {} products from {} records\n  \
         rejected: {}\n  excluded: {}\n  merged groups: {}\n  dropped groups: {}\n  \
         unrecognized stock: {}\n",
        preview.writes,
        preview.fetched,
        preview.rejected,
        preview.excluded,
        preview.merged_groups,
        preview.dropped_groups,
        preview.unrecognized_stock
    )
}
