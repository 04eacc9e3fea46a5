//! Where sync runs read from.
//!
//! Catalog runs pull raw records from a [`CatalogSource`]; stock runs pull
//! price/stock signals for known SKUs from a [`StockSource`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wscat_core::{AppConfig, SourceKind, StockSignal, StockSourceKind};
use wscat_scraper::{stock_signal, CsvDropBatch, CsvDropReader, RawRecord, SupplierClient};

use crate::error::{FeedError, SyncError};
use crate::overrides::parse_feed_file;

/// Raw records of one fetch, plus rows the source itself could not decode.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub records: Vec<RawRecord>,
    pub skipped: usize,
}

impl From<CsvDropBatch> for SourceBatch {
    fn from(batch: CsvDropBatch) -> Self {
        Self {
            records: batch.rows.into_iter().map(RawRecord::Csv).collect(),
            skipped: batch.malformed_rows,
        }
    }
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_all(&self) -> Result<SourceBatch, SyncError>;

    /// Records changed at or after `since`. Sources that cannot tell may
    /// return more than that, never less.
    async fn fetch_changed_since(&self, since: DateTime<Utc>) -> Result<SourceBatch, SyncError>;
}

#[async_trait]
pub trait StockSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Signals for the given SKUs. SKUs the source does not know are
    /// omitted.
    async fn fetch_stock(&self, skus: &[String]) -> Result<Vec<StockSignal>, SyncError>;
}

/// Supplier storefront `products.json` / `stock.json`.
pub struct SupplierSource {
    client: SupplierClient,
    base_url: String,
    page_size: u32,
    inter_request_delay_ms: u64,
}

impl SupplierSource {
    pub fn new(
        client: SupplierClient,
        base_url: impl Into<String>,
        page_size: u32,
        inter_request_delay_ms: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            page_size,
            inter_request_delay_ms,
        }
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<SourceBatch, SyncError> {
        let products = self
            .client
            .fetch_all_products(
                &self.base_url,
                self.page_size,
                self.inter_request_delay_ms,
                since,
            )
            .await?;
        Ok(SourceBatch {
            records: products.into_iter().map(RawRecord::Scraped).collect(),
            skipped: 0,
        })
    }
}

#[async_trait]
impl CatalogSource for SupplierSource {
    fn name(&self) -> &'static str {
        "supplier"
    }

    async fn fetch_all(&self) -> Result<SourceBatch, SyncError> {
        self.fetch(None).await
    }

    async fn fetch_changed_since(&self, since: DateTime<Utc>) -> Result<SourceBatch, SyncError> {
        self.fetch(Some(since)).await
    }
}

#[async_trait]
impl StockSource for SupplierSource {
    fn name(&self) -> &'static str {
        "supplier"
    }

    async fn fetch_stock(&self, skus: &[String]) -> Result<Vec<StockSignal>, SyncError> {
        let levels = self
            .client
            .fetch_stock(&self.base_url, skus, self.inter_request_delay_ms)
            .await?;
        Ok(levels.iter().map(stock_signal).collect())
    }
}

/// A directory of supplier CSV drops. Incremental runs read only files
/// modified since the cutoff.
#[derive(Debug, Clone)]
pub struct CsvDropSource {
    reader: CsvDropReader,
}

impl CsvDropSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            reader: CsvDropReader::new(dir),
        }
    }

    async fn read(&self, since: Option<DateTime<Utc>>) -> Result<SourceBatch, SyncError> {
        let reader = self.reader.clone();
        let batch = tokio::task::spawn_blocking(move || match since {
            Some(since) => reader.read_changed_since(since),
            None => reader.read_all(),
        })
        .await
        .map_err(|e| SyncError::Task(e.to_string()))??;

        tracing::debug!(
            dir = %self.reader.dir().display(),
            files = batch.files.len(),
            rows = batch.rows.len(),
            malformed_rows = batch.malformed_rows,
            "read csv drops"
        );
        Ok(batch.into())
    }
}

#[async_trait]
impl CatalogSource for CsvDropSource {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn fetch_all(&self) -> Result<SourceBatch, SyncError> {
        self.read(None).await
    }

    async fn fetch_changed_since(&self, since: DateTime<Utc>) -> Result<SourceBatch, SyncError> {
        self.read(Some(since)).await
    }
}

/// The override feed read as a stock source.
///
/// Unlike the query-side cache, a missing or unreadable feed is an error
/// here: a stock run with nothing to read has failed.
#[derive(Debug, Clone)]
pub struct FeedStockSource {
    path: PathBuf,
}

impl FeedStockSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StockSource for FeedStockSource {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn fetch_stock(&self, skus: &[String]) -> Result<Vec<StockSignal>, SyncError> {
        let path = self.path.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_feed_file(&path))
            .await
            .map_err(|e| FeedError::Task(e.to_string()))??;

        if parsed.stats.unrecognized_stock > 0 {
            tracing::warn!(
                path = %self.path.display(),
                unrecognized_stock = parsed.stats.unrecognized_stock,
                "override feed has unrecognized stock values, treated as in stock"
            );
        }

        let mut entries = parsed.entries;
        let mut seen = HashSet::new();
        Ok(skus
            .iter()
            .filter(|sku| seen.insert(sku.as_str()))
            .filter_map(|sku| entries.remove(sku))
            .map(StockSignal::from)
            .collect())
    }
}

/// Builds the catalog and stock sources named by the configuration.
///
/// # Errors
///
/// Returns [`SyncError::Source`] if the supplier client cannot be built, or
/// a [`SyncError::Task`] naming the missing setting when a supplier source is
/// selected without `WSCAT_SOURCE_URL`.
pub fn build_sources(
    config: &AppConfig,
) -> Result<(Arc<dyn CatalogSource>, Arc<dyn StockSource>), SyncError> {
    let supplier = if config.source_kind == SourceKind::Scraper
        || config.stock_source == StockSourceKind::Scraper
    {
        let base_url = config
            .source_url
            .clone()
            .ok_or_else(|| SyncError::Task("WSCAT_SOURCE_URL is not set".to_owned()))?;
        let client = SupplierClient::new(
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
            config.scraper_max_retries,
            config.scraper_retry_backoff_base_ms,
        )?;
        Some(Arc::new(SupplierSource::new(
            client,
            base_url,
            config.source_page_size,
            config.scraper_inter_request_delay_ms,
        )))
    } else {
        None
    };

    let catalog: Arc<dyn CatalogSource> = match (config.source_kind, &supplier) {
        (SourceKind::Scraper, Some(supplier)) => Arc::clone(supplier) as Arc<dyn CatalogSource>,
        _ => Arc::new(CsvDropSource::new(&config.csv_drop_dir)),
    };
    let stock: Arc<dyn StockSource> = match (config.stock_source, &supplier) {
        (StockSourceKind::Scraper, Some(supplier)) => Arc::clone(supplier) as Arc<dyn StockSource>,
        _ => Arc::new(FeedStockSource::new(&config.override_feed_path)),
    };

    tracing::debug!(
        catalog_source = catalog.name(),
        stock_source = stock.name(),
        "sync sources configured"
    );
    Ok((catalog, stock))
}
