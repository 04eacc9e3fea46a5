pub mod client;
pub mod csv_drop;
pub mod error;
pub mod normalize;
pub mod pagination;
pub(crate) mod retry;
pub mod types;

pub use client::SupplierClient;
pub use csv_drop::{sniff_delimiter, CsvDropBatch, CsvDropReader, CsvDropRecord};
pub use error::ScraperError;
pub use normalize::{
    clean_name, normalize_batch, normalize_record, stock_signal, NormalizedBatch, RawRecord,
    RejectReason, Rejection,
};
pub use types::{
    CsvProductRow, StockLevel, StockResponse, SupplierId, SupplierImage, SupplierProduct,
    SupplierProductsResponse,
};
