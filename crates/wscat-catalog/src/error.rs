use thiserror::Error;
use wscat_db::DbError;
use wscat_scraper::ScraperError;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read override feed {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed override feed: {0}")]
    Csv(#[from] csv::Error),

    #[error("override feed parser task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error("source fetch failed: {0}")]
    Source(#[from] ScraperError),

    #[error("stock source failed: {0}")]
    Feed(#[from] FeedError),

    #[error("source task failed: {0}")]
    Task(String),

    #[error("run timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Store(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown sort key: {0} (expected best_match, price_asc or price_desc)")]
    UnknownSort(String),

    #[error("min_price {min} is greater than max_price {max}")]
    InvertedPriceRange {
        min: rust_decimal::Decimal,
        max: rust_decimal::Decimal,
    },

    #[error(transparent)]
    Store(#[from] DbError),
}

impl QueryError {
    /// Caller mistakes, as opposed to store failures.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownSort(_) | QueryError::InvertedPriceRange { .. }
        )
    }
}
