//! Raw supplier shapes.
//!
//! ## Storefront JSON (`GET {base}/products.json`)
//!
//! One object per sellable SKU. Observed quirks:
//! - `id` is numeric on most suppliers but a string on some older exports.
//! - `price` arrives either as a string (`"29.99"`, `"£29.99"`) or a bare
//!   JSON number; both are kept as a [`serde_json::Value`] and handed to the
//!   price extractor.
//! - `stock` is a quantity (`12`) or free text (`"In Stock"`).
//! - `flavour` is absent on some suppliers, which expose the variant label
//!   in `option1` instead (with `"Default Title"` meaning no variant).
//!
//! ## Stock endpoint (`GET {base}/stock.json?skus=A,B`)
//!
//! Returns only SKUs the supplier knows; unknown SKUs are omitted.
//!
//! ## CSV drops
//!
//! Column headers vary between suppliers and are matched case-insensitively
//! against the aliases on [`CsvProductRow`]. Every cell is read as text.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wscat_core::RawStock;

/// Top-level response from `GET /products.json`.
#[derive(Debug, Deserialize)]
pub struct SupplierProductsResponse {
    pub products: Vec<SupplierProduct>,
}

/// Supplier-side product id, numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SupplierId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupplierId::Number(n) => write!(f, "{n}"),
            SupplierId::Text(s) => f.write_str(s),
        }
    }
}

/// A single product from the supplier storefront.
#[derive(Debug, Clone, Deserialize)]
pub struct SupplierProduct {
    pub id: SupplierId,

    #[serde(default)]
    pub sku: Option<String>,

    /// Display name, e.g. `"Acme Whey 900g Vanilla (Pack of 2)"`.
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub vendor: Option<String>,

    /// String or number; see module docs.
    #[serde(default)]
    pub price: Option<serde_json::Value>,

    #[serde(default)]
    pub stock: Option<RawStock>,

    #[serde(default)]
    pub product_type: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub images: Vec<SupplierImage>,

    #[serde(default, alias = "flavor")]
    pub flavour: Option<String>,

    #[serde(default)]
    pub option1: Option<String>,

    #[serde(default)]
    pub body_html: Option<String>,

    #[serde(default)]
    pub parent_sku: Option<String>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupplierImage {
    pub src: String,
}

/// Top-level response from `GET /stock.json`.
#[derive(Debug, Deserialize)]
pub struct StockResponse {
    pub stock: Vec<StockLevel>,
}

/// Current price/stock of one SKU.
#[derive(Debug, Clone, Deserialize)]
pub struct StockLevel {
    pub sku: String,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub stock: Option<RawStock>,
}

/// One row of a supplier CSV drop, with headers already lowercased.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsvProductRow {
    #[serde(default, alias = "product_sku", alias = "code", alias = "item_code")]
    pub sku: Option<String>,
    #[serde(default, alias = "title", alias = "product_name")]
    pub name: Option<String>,
    #[serde(default, alias = "vendor", alias = "manufacturer")]
    pub brand: Option<String>,
    #[serde(default, alias = "unit_price", alias = "wholesale_price")]
    pub price: Option<String>,
    #[serde(default, alias = "qty", alias = "quantity", alias = "availability")]
    pub stock: Option<String>,
    #[serde(default, alias = "product_type", alias = "type")]
    pub category: Option<String>,
    /// `|`-separated image URLs.
    #[serde(default, alias = "image", alias = "image_url")]
    pub images: Option<String>,
    #[serde(default, alias = "flavor", alias = "variant")]
    pub flavour: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "parent", alias = "group_sku")]
    pub parent_sku: Option<String>,
    /// Comma- or `|`-separated tags.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default, alias = "last_modified")]
    pub updated_at: Option<String>,
}
