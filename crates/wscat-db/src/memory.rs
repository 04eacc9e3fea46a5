//! In-memory [`CatalogStore`] with the same semantics as the Postgres store.
//!
//! Used by orchestrator, query and router tests, and by `--dry-run` CLI
//! invocations that must not touch the real catalog.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use wscat_core::{
    MergedProduct, StockSignal, SyncCounts, SyncRun, SyncRunStatus, SyncRunType, TriggerSource,
};

use crate::products::{ProductFilter, StockApplyOutcome, UpsertOutcome};
use crate::store::CatalogStore;
use crate::DbError;

#[derive(Debug, Default)]
struct Inner {
    products: BTreeMap<String, MergedProduct>,
    runs: Vec<SyncRun>,
    failing_skus: HashSet<String>,
    fail_run_creation: bool,
}

#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    inner: Mutex<Inner>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected_failure(what: &str) -> DbError {
    DbError::Sqlx(sqlx::Error::Protocol(format!("injected failure: {what}")))
}

impl MemoryCatalogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `products`.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = MergedProduct>) -> Self {
        let store = Self::new();
        {
            let mut inner = lock(&store.inner);
            for product in products {
                inner.products.insert(product.id.clone(), product);
            }
        }
        store
    }

    /// Makes every later upsert of product `id` fail.
    pub fn fail_upserts_for(&self, id: &str) {
        lock(&self.inner).failing_skus.insert(id.to_owned());
    }

    /// Makes every later `create_sync_run` fail.
    pub fn fail_run_creation(&self) {
        lock(&self.inner).fail_run_creation = true;
    }

    #[must_use]
    pub fn products(&self) -> Vec<MergedProduct> {
        lock(&self.inner).products.values().cloned().collect()
    }

    #[must_use]
    pub fn product_count(&self) -> usize {
        lock(&self.inner).products.len()
    }

    fn resolve_sku(inner: &Inner, sku: &str) -> Option<String> {
        if inner.products.contains_key(sku) {
            return Some(sku.to_owned());
        }
        inner
            .products
            .values()
            .find(|p| p.member_skus.iter().any(|m| m == sku))
            .map(|p| p.id.clone())
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn upsert_product(
        &self,
        product: &MergedProduct,
        _sync_run_id: Option<i64>,
    ) -> Result<UpsertOutcome, DbError> {
        let mut inner = lock(&self.inner);
        if inner.failing_skus.contains(&product.id) {
            return Err(injected_failure(&product.id));
        }
        match inner.products.get_mut(&product.id) {
            None => {
                inner.products.insert(product.id.clone(), product.clone());
                Ok(UpsertOutcome::Inserted)
            }
            Some(existing) if existing.updated_at > product.updated_at => {
                Ok(UpsertOutcome::SkippedNewer)
            }
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = MergedProduct {
                    created_at,
                    ..product.clone()
                };
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    async fn apply_stock_signal(
        &self,
        signal: &StockSignal,
        observed_at: DateTime<Utc>,
    ) -> Result<StockApplyOutcome, DbError> {
        let mut inner = lock(&self.inner);
        let Some(id) = Self::resolve_sku(&inner, &signal.sku) else {
            return Ok(StockApplyOutcome::UnknownSku);
        };
        if inner.failing_skus.contains(&id) {
            return Err(injected_failure(&id));
        }
        let Some(product) = inner.products.get_mut(&id) else {
            return Ok(StockApplyOutcome::UnknownSku);
        };
        if product.updated_at > observed_at {
            return Ok(StockApplyOutcome::SkippedNewer);
        }
        if let Some(price) = signal.price {
            product.price = price;
        }
        if let Some(in_stock) = signal.in_stock {
            product.in_stock = in_stock;
        }
        product.updated_at = observed_at;
        Ok(StockApplyOutcome::Applied)
    }

    async fn delete_product(&self, id: &str) -> Result<bool, DbError> {
        let mut inner = lock(&self.inner);
        if inner.failing_skus.contains(id) {
            return Err(injected_failure(id));
        }
        Ok(inner.products.remove(id).is_some())
    }

    async fn get_product(&self, sku: &str) -> Result<Option<MergedProduct>, DbError> {
        let inner = lock(&self.inner);
        Ok(Self::resolve_sku(&inner, sku).and_then(|id| inner.products.get(&id).cloned()))
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<MergedProduct>, DbError> {
        let inner = lock(&self.inner);
        Ok(inner
            .products
            .values()
            .filter(|p| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| p.category.to_lowercase() == c.to_lowercase())
            })
            .cloned()
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<String>, DbError> {
        let inner = lock(&self.inner);
        let categories: BTreeSet<String> =
            inner.products.values().map(|p| p.category.clone()).collect();
        Ok(categories.into_iter().collect())
    }

    async fn known_skus(&self) -> Result<Vec<String>, DbError> {
        let inner = lock(&self.inner);
        let skus: BTreeSet<String> = inner
            .products
            .values()
            .flat_map(|p| std::iter::once(&p.id).chain(p.member_skus.iter()))
            .cloned()
            .collect();
        Ok(skus.into_iter().collect())
    }

    async fn create_sync_run(
        &self,
        run_type: SyncRunType,
        trigger_source: TriggerSource,
    ) -> Result<SyncRun, DbError> {
        let mut inner = lock(&self.inner);
        if inner.fail_run_creation {
            return Err(injected_failure("create_sync_run"));
        }
        let id = i64::try_from(inner.runs.len()).unwrap_or(i64::MAX - 1) + 1;
        let run = SyncRun {
            id,
            public_id: Uuid::new_v4(),
            run_type,
            trigger_source,
            status: SyncRunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            fetched_count: 0,
            upserted_count: 0,
            error_count: 0,
            skipped_count: 0,
            error_message: None,
        };
        inner.runs.push(run.clone());
        Ok(run)
    }

    async fn finish_sync_run(
        &self,
        id: i64,
        status: SyncRunStatus,
        counts: SyncCounts,
        error_message: Option<&str>,
    ) -> Result<SyncRun, DbError> {
        let mut inner = lock(&self.inner);
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.id == id && r.status == SyncRunStatus::Running)
            .ok_or(DbError::InvalidSyncRunTransition {
                id,
                expected_status: "running",
            })?;
        run.status = status;
        run.completed_at = Some(Utc::now());
        run.fetched_count = counts.fetched;
        run.upserted_count = counts.upserted;
        run.error_count = counts.errors;
        run.skipped_count = counts.skipped;
        run.error_message = error_message.map(str::to_owned);
        Ok(run.clone())
    }

    async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>, DbError> {
        let inner = lock(&self.inner);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(inner.runs.iter().rev().take(limit).cloned().collect())
    }

    async fn last_successful_run(
        &self,
        run_types: &[SyncRunType],
    ) -> Result<Option<SyncRun>, DbError> {
        let inner = lock(&self.inner);
        Ok(inner
            .runs
            .iter()
            .filter(|r| r.status == SyncRunStatus::Success && run_types.contains(&r.run_type))
            .max_by_key(|r| (r.started_at, r.id))
            .cloned())
    }

    async fn fail_stale_runs(
        &self,
        started_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<u64, DbError> {
        let mut inner = lock(&self.inner);
        let now = Utc::now();
        let mut closed = 0u64;
        for run in inner
            .runs
            .iter_mut()
            .filter(|r| r.status == SyncRunStatus::Running && r.started_at < started_before)
        {
            run.status = SyncRunStatus::Failed;
            run.completed_at = Some(now);
            run.error_message = Some(error_message.to_owned());
            closed += 1;
        }
        Ok(closed)
    }
}
