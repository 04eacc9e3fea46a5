//! Sync run orchestration: fetch, normalize, merge, upsert, record.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use wscat_core::{
    AppConfig, MergePolicy, SyncCounts, SyncRun, SyncRunStatus, SyncRunType, TriggerSource,
};
use wscat_db::{CatalogStore, ProductFilter, StockApplyOutcome, UpsertOutcome};
use wscat_scraper::normalize_batch;

use super::source::{CatalogSource, SourceBatch, StockSource};
use super::stock::{plan_stock_writes, StockPlan};
use crate::error::SyncError;
use crate::merge::{merge_batch, MergeReport};
use crate::reconcile::{reconcile_with_catalog, Reconciliation};

const ABANDONED_RUN_MESSAGE: &str = "run abandoned: process stopped before completion";

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub timeout: Duration,
    pub upsert_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(900),
            upsert_concurrency: 8,
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.sync_timeout_secs),
            upsert_concurrency: config.sync_upsert_concurrency.max(1),
        }
    }
}

/// Counters shared between a run and its timeout guard, so a timed-out run
/// still reports how far it got.
#[derive(Debug, Default)]
struct RunCounters {
    fetched: AtomicUsize,
    upserted: AtomicUsize,
    errors: AtomicUsize,
    skipped: AtomicUsize,
}

impl RunCounters {
    fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SyncCounts {
        let read = |c: &AtomicUsize| i32::try_from(c.load(Ordering::Relaxed)).unwrap_or(i32::MAX);
        SyncCounts {
            fetched: read(&self.fetched),
            upserted: read(&self.upserted),
            errors: read(&self.errors),
            skipped: read(&self.skipped),
        }
    }
}

/// What a run would do, computed without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPreview {
    pub run_type: Option<SyncRunType>,
    pub fetched: usize,
    /// Normalizer rejections plus rows the source could not decode.
    pub rejected: usize,
    pub unrecognized_stock: usize,
    pub excluded: usize,
    pub dropped_groups: usize,
    pub merged_groups: usize,
    /// Products a catalog run would upsert, or products a stock run would
    /// update.
    pub writes: usize,
    /// Stored products a catalog run would fold into a variant family and
    /// delete.
    pub retired: usize,
    /// Stock signals that carry neither price nor stock.
    pub inert_signals: usize,
}

/// Drives sync runs against one catalog store. At most one run executes at a
/// time; clones share the same lock.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<dyn CatalogStore>,
    catalog_source: Arc<dyn CatalogSource>,
    stock_source: Arc<dyn StockSource>,
    policy: Arc<MergePolicy>,
    options: SyncOptions,
    active: Arc<Mutex<()>>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        catalog_source: Arc<dyn CatalogSource>,
        stock_source: Arc<dyn StockSource>,
        policy: MergePolicy,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            catalog_source,
            stock_source,
            policy: Arc::new(policy),
            options,
            active: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Returns `true` while a run holds the lock.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.try_lock().is_err()
    }

    /// Runs to completion and returns the terminal run record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] if another run is active, and
    /// [`SyncError::Store`] if the run row cannot be created or finished.
    /// Source and upsert failures are reported through the run's status.
    pub async fn run(
        &self,
        run_type: SyncRunType,
        trigger: TriggerSource,
    ) -> Result<SyncRun, SyncError> {
        let guard = self.acquire()?;
        let run = self.store.create_sync_run(run_type, trigger).await?;
        self.execute(run, guard).await
    }

    /// Creates the run row, spawns the run and returns the `running` record.
    ///
    /// # Errors
    ///
    /// Same admission errors as [`Self::run`].
    pub async fn start(
        &self,
        run_type: SyncRunType,
        trigger: TriggerSource,
    ) -> Result<SyncRun, SyncError> {
        let guard = self.acquire()?;
        let run = self.store.create_sync_run(run_type, trigger).await?;
        let this = self.clone();
        let running = run.clone();
        tokio::spawn(async move {
            let run_id = running.id;
            if let Err(e) = this.execute(running, guard).await {
                tracing::error!(run_id, error = %e, "background sync run could not be recorded");
            }
        });
        Ok(run)
    }

    /// Closes runs left `running` for longer than the timeout budget.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the update fails.
    pub async fn reap_stale_runs(&self) -> Result<u64, SyncError> {
        let budget = chrono::Duration::from_std(self.options.timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        let closed = self
            .store
            .fail_stale_runs(Utc::now() - budget, ABANDONED_RUN_MESSAGE)
            .await?;
        if closed > 0 {
            tracing::warn!(closed, "closed sync runs abandoned by an earlier process");
        }
        Ok(closed)
    }

    /// Fetches, normalizes and merges (or fetches stock signals) without
    /// writing to the store or recording a run.
    ///
    /// # Errors
    ///
    /// Returns the source or store error that stopped the preview.
    pub async fn preview(&self, run_type: SyncRunType) -> Result<SyncPreview, SyncError> {
        if run_type == SyncRunType::Stock {
            let (fetched, plan) = self.plan_stock().await?;
            return Ok(SyncPreview {
                run_type: Some(run_type),
                fetched,
                writes: plan.writes.len(),
                inert_signals: plan.inert,
                ..SyncPreview::default()
            });
        }

        let batch = self.fetch_catalog(run_type).await?;
        let fetched = batch.records.len() + batch.skipped;
        let normalized = normalize_batch(&batch.records);
        let rejected = normalized.rejections.len() + batch.skipped;
        let unrecognized_stock = normalized.unrecognized_stock;
        let report = merge_batch(normalized.products, &self.policy, Utc::now());
        let (excluded, dropped_groups, merged_groups) =
            (report.excluded, report.dropped_groups, report.merged_groups);
        let stored = self.store.list_products(&ProductFilter::default()).await?;
        let reconciliation = reconcile_with_catalog(report.products, stored);
        Ok(SyncPreview {
            run_type: Some(run_type),
            fetched,
            rejected,
            unrecognized_stock,
            excluded,
            dropped_groups,
            merged_groups,
            writes: reconciliation.products.len(),
            retired: reconciliation.retired.values().map(Vec::len).sum(),
            inert_signals: 0,
        })
    }

    fn acquire(&self) -> Result<OwnedMutexGuard<()>, SyncError> {
        Arc::clone(&self.active)
            .try_lock_owned()
            .map_err(|_| SyncError::AlreadyRunning)
    }

    async fn execute(
        &self,
        run: SyncRun,
        _guard: OwnedMutexGuard<()>,
    ) -> Result<SyncRun, SyncError> {
        let counters = RunCounters::default();
        tracing::info!(
            run_id = run.id,
            run_type = %run.run_type,
            trigger = %run.trigger_source,
            "sync run started"
        );

        let outcome =
            tokio::time::timeout(self.options.timeout, self.perform(&run, &counters)).await;
        let counts = counters.snapshot();

        let (status, message) = match outcome {
            Ok(Ok(())) if counts.errors > 0 => (SyncRunStatus::Partial, None),
            Ok(Ok(())) => (SyncRunStatus::Success, None),
            Ok(Err(e)) => {
                tracing::error!(run_id = run.id, error = %e, "sync run failed");
                (SyncRunStatus::Failed, Some(e.to_string()))
            }
            Err(_) => {
                let e = SyncError::Timeout(self.options.timeout);
                tracing::error!(run_id = run.id, error = %e, "sync run timed out");
                (SyncRunStatus::Failed, Some(e.to_string()))
            }
        };

        let finished = self
            .store
            .finish_sync_run(run.id, status, counts, message.as_deref())
            .await?;
        tracing::info!(
            run_id = finished.id,
            status = %finished.status,
            fetched = counts.fetched,
            upserted = counts.upserted,
            errors = counts.errors,
            skipped = counts.skipped,
            "sync run finished"
        );
        Ok(finished)
    }

    async fn perform(&self, run: &SyncRun, counters: &RunCounters) -> Result<(), SyncError> {
        match run.run_type {
            SyncRunType::Full | SyncRunType::Incremental => {
                let batch = self.fetch_catalog(run.run_type).await?;
                self.ingest(run.id, batch, counters).await
            }
            SyncRunType::Stock => self.apply_stock(run.id, counters).await,
        }
    }

    async fn fetch_catalog(&self, run_type: SyncRunType) -> Result<SourceBatch, SyncError> {
        if run_type == SyncRunType::Incremental {
            let last = self
                .store
                .last_successful_run(&[SyncRunType::Full, SyncRunType::Incremental])
                .await?;
            if let Some(last) = last {
                tracing::debug!(since = %last.started_at, "incremental fetch");
                return self.catalog_source.fetch_changed_since(last.started_at).await;
            }
            tracing::info!("no previous successful catalog run, fetching everything");
        }
        self.catalog_source.fetch_all().await
    }

    async fn ingest(
        &self,
        run_id: i64,
        batch: SourceBatch,
        counters: &RunCounters,
    ) -> Result<(), SyncError> {
        RunCounters::add(&counters.fetched, batch.records.len() + batch.skipped);
        RunCounters::add(&counters.skipped, batch.skipped);

        let normalized = normalize_batch(&batch.records);
        RunCounters::add(&counters.skipped, normalized.rejections.len());
        if normalized.unrecognized_stock > 0 {
            tracing::warn!(
                run_id,
                unrecognized_stock = normalized.unrecognized_stock,
                "records with unrecognized stock values were treated as in stock"
            );
        }

        let report: MergeReport = merge_batch(normalized.products, &self.policy, Utc::now());
        RunCounters::add(&counters.skipped, report.skipped());
        tracing::info!(
            run_id,
            products = report.products.len(),
            merged_groups = report.merged_groups,
            excluded = report.excluded,
            dropped_groups = report.dropped_groups,
            "batch merged"
        );

        let stored = self.store.list_products(&ProductFilter::default()).await?;
        let Reconciliation {
            products,
            mut retired,
            folded,
        } = reconcile_with_catalog(report.products, stored);
        if folded > 0 {
            tracing::info!(run_id, folded, "batch products folded into stored families");
        }
        let work: Vec<_> = products
            .into_iter()
            .map(|product| {
                let absorbed = retired.remove(&product.id).unwrap_or_default();
                (product, absorbed)
            })
            .collect();

        let store = Arc::clone(&self.store);
        let mut results = stream::iter(work)
            .map(move |(product, absorbed)| {
                let store = Arc::clone(&store);
                async move {
                    let result = store.upsert_product(&product, Some(run_id)).await;
                    let mut deletions = Vec::new();
                    if matches!(result, Ok(UpsertOutcome::Inserted | UpsertOutcome::Updated)) {
                        for id in absorbed {
                            let deleted = store.delete_product(&id).await;
                            deletions.push((id, deleted));
                        }
                    }
                    (product.id, result, deletions)
                }
            })
            .buffer_unordered(self.options.upsert_concurrency.max(1));

        while let Some((id, result, deletions)) = results.next().await {
            match result {
                Ok(UpsertOutcome::Inserted | UpsertOutcome::Updated) => {
                    RunCounters::add(&counters.upserted, 1);
                }
                Ok(UpsertOutcome::SkippedNewer) => {
                    tracing::debug!(run_id, sku = %id, "stored row is newer, upsert skipped");
                    RunCounters::add(&counters.skipped, 1);
                }
                Err(e) => {
                    tracing::warn!(run_id, sku = %id, error = %e, "product upsert failed");
                    RunCounters::add(&counters.errors, 1);
                }
            }
            for (retired_id, deleted) in deletions {
                match deleted {
                    Ok(_) => tracing::info!(
                        run_id,
                        retired = %retired_id,
                        into = %id,
                        "absorbed product removed"
                    ),
                    Err(e) => {
                        tracing::warn!(
                            run_id,
                            retired = %retired_id,
                            into = %id,
                            error = %e,
                            "absorbed product could not be removed"
                        );
                        RunCounters::add(&counters.errors, 1);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetches signals for every SKU the catalog knows and groups them into
    /// one write per product. Returns the fetched signal count with the plan.
    async fn plan_stock(&self) -> Result<(usize, StockPlan), SyncError> {
        let catalog = self.store.list_products(&ProductFilter::default()).await?;
        let skus: Vec<String> = catalog
            .iter()
            .flat_map(|p| std::iter::once(&p.id).chain(&p.member_skus))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let signals = self.stock_source.fetch_stock(&skus).await?;
        let fetched = signals.len();
        Ok((fetched, plan_stock_writes(&catalog, signals)))
    }

    async fn apply_stock(&self, run_id: i64, counters: &RunCounters) -> Result<(), SyncError> {
        let (fetched, plan) = self.plan_stock().await?;
        RunCounters::add(&counters.fetched, fetched);
        RunCounters::add(&counters.skipped, plan.inert + plan.unknown);

        let observed_at = Utc::now();
        let store = Arc::clone(&self.store);
        let mut results = stream::iter(plan.writes)
            .map(move |write| {
                let store = Arc::clone(&store);
                async move {
                    let result = store.apply_stock_signal(&write.signal, observed_at).await;
                    (write.signal.sku, write.signals, result)
                }
            })
            .buffer_unordered(self.options.upsert_concurrency.max(1));

        while let Some((id, signals, result)) = results.next().await {
            match result {
                Ok(StockApplyOutcome::Applied) => RunCounters::add(&counters.upserted, signals),
                Ok(StockApplyOutcome::UnknownSku | StockApplyOutcome::SkippedNewer) => {
                    tracing::debug!(run_id, sku = %id, signals, "stock update not applied");
                    RunCounters::add(&counters.skipped, signals);
                }
                Err(e) => {
                    tracing::warn!(run_id, sku = %id, error = %e, "stock update failed");
                    RunCounters::add(&counters.errors, signals);
                }
            }
        }
        Ok(())
    }
}
