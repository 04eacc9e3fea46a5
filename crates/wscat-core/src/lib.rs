pub mod app_config;
pub mod config;
pub mod policy;
pub mod price;
pub mod products;
pub mod stock;
pub mod sync_runs;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, SourceKind, StockSourceKind};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use policy::{load_merge_policy, ExclusionReason, MergePolicy};
pub use price::extract_price;
pub use products::{
    CanonicalProduct, MergedProduct, PriceOverrideEntry, RawStock, SourceTag, StockSignal,
};
pub use stock::{interpret_stock, interpret_stock_text, StockReading};
pub use sync_runs::{SyncCounts, SyncRun, SyncRunStatus, SyncRunType, TriggerSource};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read policy file {path}: {source}")]
    PolicyFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    PolicyFileParse(#[from] serde_yaml::Error),

    #[error("policy validation failed: {0}")]
    Validation(String),
}

/// Raised when a stored enum column holds a value this build does not know.
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
