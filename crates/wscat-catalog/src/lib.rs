//! Catalog reconciliation: family keys, variant merging, the override cache,
//! sync orchestration and the read-side query service.

pub mod error;
pub mod family_key;
pub mod merge;
pub mod overrides;
pub mod query;
pub mod reconcile;
pub mod sync;

pub use error::{FeedError, QueryError, SyncError};
pub use family_key::family_key;
pub use merge::{merge_batch, MergeReport};
pub use overrides::{OverrideCache, OverrideStatus, RefreshOutcome};
pub use query::{CatalogQueryService, ProductPage, ProductQuery, SortKey};
pub use reconcile::{reconcile_with_catalog, Reconciliation};
pub use sync::{build_sources, SyncOptions, SyncOrchestrator, SyncPreview};
