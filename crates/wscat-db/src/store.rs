//! The catalog store seam used by the sync orchestrator and query service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use wscat_core::{
    MergedProduct, StockSignal, SyncCounts, SyncRun, SyncRunStatus, SyncRunType, TriggerSource,
};

use crate::products::{self, ProductFilter, StockApplyOutcome, UpsertOutcome};
use crate::{sync_runs, DbError};

/// Durable baseline storage for merged products and sync runs.
///
/// Product writes are atomic per product id. Implementations must be safe to
/// share across tasks.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn ping(&self) -> Result<(), DbError>;

    async fn upsert_product(
        &self,
        product: &MergedProduct,
        sync_run_id: Option<i64>,
    ) -> Result<UpsertOutcome, DbError>;

    async fn apply_stock_signal(
        &self,
        signal: &StockSignal,
        observed_at: DateTime<Utc>,
    ) -> Result<StockApplyOutcome, DbError>;

    /// Removes the product with id `id`. Returns `false` if none existed.
    async fn delete_product(&self, id: &str) -> Result<bool, DbError>;

    /// Looks up by product id first, then by member SKU.
    async fn get_product(&self, sku: &str) -> Result<Option<MergedProduct>, DbError>;

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<MergedProduct>, DbError>;

    async fn list_categories(&self) -> Result<Vec<String>, DbError>;

    async fn known_skus(&self) -> Result<Vec<String>, DbError>;

    async fn create_sync_run(
        &self,
        run_type: SyncRunType,
        trigger_source: TriggerSource,
    ) -> Result<SyncRun, DbError>;

    async fn finish_sync_run(
        &self,
        id: i64,
        status: SyncRunStatus,
        counts: SyncCounts,
        error_message: Option<&str>,
    ) -> Result<SyncRun, DbError>;

    async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>, DbError>;

    async fn last_successful_run(
        &self,
        run_types: &[SyncRunType],
    ) -> Result<Option<SyncRun>, DbError>;

    async fn fail_stale_runs(
        &self,
        started_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<u64, DbError>;
}

/// [`CatalogStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn ping(&self) -> Result<(), DbError> {
        crate::health_check(&self.pool).await
    }

    async fn upsert_product(
        &self,
        product: &MergedProduct,
        sync_run_id: Option<i64>,
    ) -> Result<UpsertOutcome, DbError> {
        products::upsert_product(&self.pool, product, sync_run_id).await
    }

    async fn apply_stock_signal(
        &self,
        signal: &StockSignal,
        observed_at: DateTime<Utc>,
    ) -> Result<StockApplyOutcome, DbError> {
        products::apply_stock_signal(&self.pool, signal, observed_at).await
    }

    async fn delete_product(&self, id: &str) -> Result<bool, DbError> {
        products::delete_product(&self.pool, id).await
    }

    async fn get_product(&self, sku: &str) -> Result<Option<MergedProduct>, DbError> {
        products::get_product(&self.pool, sku).await
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<MergedProduct>, DbError> {
        products::list_products(&self.pool, filter).await
    }

    async fn list_categories(&self) -> Result<Vec<String>, DbError> {
        products::list_categories(&self.pool).await
    }

    async fn known_skus(&self) -> Result<Vec<String>, DbError> {
        products::known_skus(&self.pool).await
    }

    async fn create_sync_run(
        &self,
        run_type: SyncRunType,
        trigger_source: TriggerSource,
    ) -> Result<SyncRun, DbError> {
        sync_runs::create_sync_run(&self.pool, run_type, trigger_source).await
    }

    async fn finish_sync_run(
        &self,
        id: i64,
        status: SyncRunStatus,
        counts: SyncCounts,
        error_message: Option<&str>,
    ) -> Result<SyncRun, DbError> {
        sync_runs::finish_sync_run(&self.pool, id, status, counts, error_message).await
    }

    async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>, DbError> {
        sync_runs::list_sync_runs(&self.pool, limit).await
    }

    async fn last_successful_run(
        &self,
        run_types: &[SyncRunType],
    ) -> Result<Option<SyncRun>, DbError> {
        sync_runs::last_successful_run(&self.pool, run_types).await
    }

    async fn fail_stale_runs(
        &self,
        started_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<u64, DbError> {
        sync_runs::fail_stale_runs(&self.pool, started_before, error_message).await
    }
}
