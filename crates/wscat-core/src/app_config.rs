use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Where full and incremental runs read catalog records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Supplier storefront JSON endpoint (`WSCAT_SOURCE_URL`).
    Scraper,
    /// Directory of supplier CSV drops (`WSCAT_CSV_DROP_DIR`).
    Csv,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Scraper => write!(f, "scraper"),
            SourceKind::Csv => write!(f, "csv"),
        }
    }
}

/// Where stock-only runs read price/stock signals from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockSourceKind {
    /// The override feed file.
    Feed,
    /// The supplier storefront `stock.json` endpoint.
    Scraper,
}

impl std::fmt::Display for StockSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockSourceKind::Feed => write!(f, "feed"),
            StockSourceKind::Scraper => write!(f, "scraper"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub policy_path: PathBuf,
    pub source_kind: SourceKind,
    pub source_url: Option<String>,
    pub source_page_size: u32,
    pub csv_drop_dir: PathBuf,
    pub override_feed_path: PathBuf,
    pub stock_source: StockSourceKind,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_inter_request_delay_ms: u64,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_ms: u64,
    pub sync_timeout_secs: u64,
    pub sync_upsert_concurrency: usize,
    /// Cron expression for scheduled incremental runs; `None` disables the job.
    pub sync_incremental_cron: Option<String>,
    /// Cron expression for scheduled stock runs; `None` disables the job.
    pub sync_stock_cron: Option<String>,
    pub query_default_page_size: u32,
    pub query_max_page_size: u32,
    pub rate_limit_per_minute: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("policy_path", &self.policy_path)
            .field("database_url", &"[redacted]")
            .field("source_kind", &self.source_kind)
            .field("source_url", &self.source_url)
            .field("source_page_size", &self.source_page_size)
            .field("csv_drop_dir", &self.csv_drop_dir)
            .field("override_feed_path", &self.override_feed_path)
            .field("stock_source", &self.stock_source)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field(
                "scraper_inter_request_delay_ms",
                &self.scraper_inter_request_delay_ms,
            )
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_ms",
                &self.scraper_retry_backoff_base_ms,
            )
            .field("sync_timeout_secs", &self.sync_timeout_secs)
            .field("sync_upsert_concurrency", &self.sync_upsert_concurrency)
            .field("sync_incremental_cron", &self.sync_incremental_cron)
            .field("sync_stock_cron", &self.sync_stock_cron)
            .field("query_default_page_size", &self.query_default_page_size)
            .field("query_max_page_size", &self.query_max_page_size)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish()
    }
}
