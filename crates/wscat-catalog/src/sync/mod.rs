//! Full, incremental and stock-only sync runs.

mod orchestrator;
pub mod source;
pub mod stock;

pub use orchestrator::{SyncOptions, SyncOrchestrator, SyncPreview};
pub use source::{
    build_sources, CatalogSource, CsvDropSource, FeedStockSource, SourceBatch, StockSource,
    SupplierSource,
};
pub use stock::{plan_stock_writes, StockPlan, StockWrite};
