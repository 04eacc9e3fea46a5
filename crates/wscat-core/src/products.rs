use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which kind of source a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Supplier storefront JSON.
    Scraper,
    /// Supplier CSV drop file.
    Csv,
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTag::Scraper => write!(f, "scraper"),
            SourceTag::Csv => write!(f, "csv"),
        }
    }
}

/// Stock as the supplier expressed it, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStock {
    Quantity(i64),
    Text(String),
}

/// One supplier record after validation, before variant merging.
///
/// Built by the record normalizer; discarded once the merge engine has
/// folded it into a [`MergedProduct`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub source: SourceTag,
    /// Supplier-side identifier of the raw record (product id or CSV line).
    pub source_id: String,
    pub sku: String,
    /// Display name with bundle wording removed and whitespace collapsed.
    pub name: String,
    pub brand: String,
    pub price: Decimal,
    pub raw_stock: RawStock,
    /// `raw_stock` interpreted; unrecognized text counts as in stock.
    pub in_stock: bool,
    pub category: String,
    pub image_urls: Vec<String>,
    pub flavour: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Supplier parent/family SKU when the source exposes one.
    pub parent_sku: Option<String>,
    /// Supplier change timestamp, used to filter incremental fetches.
    pub source_updated_at: Option<DateTime<Utc>>,
}

/// A logical catalog product: one record, or several flavour variants of
/// the same family folded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedProduct {
    /// Parent SKU, the record's own SKU for single products, or a
    /// synthesized `fam-` key for merged families without a parent SKU.
    pub id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: Decimal,
    pub in_stock: bool,
    /// Deduplicated union of member images in first-seen order.
    pub images: Vec<String>,
    /// Distinct flavours in first-seen order; empty for single products.
    pub flavours: Vec<String>,
    /// Lowercase flavour to image URL. Only populated when members carry
    /// distinct images.
    pub flavour_images: BTreeMap<String, String>,
    /// Every source SKU folded into this product.
    pub member_skus: Vec<String>,
    pub family_key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MergedProduct {
    /// Returns `true` if `sku` is this product's id or one of its members.
    #[must_use]
    pub fn matches_sku(&self, sku: &str) -> bool {
        self.id == sku || self.member_skus.iter().any(|m| m == sku)
    }

    /// Returns `true` if the product has more than one flavour variant.
    #[must_use]
    pub fn has_variants(&self) -> bool {
        !self.flavours.is_empty()
    }
}

/// One row of the price/stock override feed. Absent fields defer to the
/// catalog baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOverrideEntry {
    pub sku: String,
    pub price: Option<Decimal>,
    pub in_stock: Option<bool>,
}

impl PriceOverrideEntry {
    /// An entry that overrides neither price nor stock.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.price.is_none() && self.in_stock.is_none()
    }
}

/// A price/stock observation for an already-known SKU, written by
/// stock-only sync runs directly onto the catalog baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSignal {
    pub sku: String,
    pub price: Option<Decimal>,
    pub in_stock: Option<bool>,
}

impl From<PriceOverrideEntry> for StockSignal {
    fn from(entry: PriceOverrideEntry) -> Self {
        Self {
            sku: entry.sku,
            price: entry.price,
            in_stock: entry.in_stock,
        }
    }
}
