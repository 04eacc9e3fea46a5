//! Normalization from raw supplier records to [`wscat_core::CanonicalProduct`].
//!
//! Pure transforms: a bad record becomes a [`Rejection`], never an error that
//! aborts the batch.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use wscat_core::{
    extract_price, interpret_stock, CanonicalProduct, RawStock, SourceTag, StockReading,
    StockSignal,
};

use crate::csv_drop::CsvDropRecord;
use crate::types::{StockLevel, SupplierProduct};

const DEFAULT_CATEGORY: &str = "Uncategorized";
const NO_VARIANT_OPTION: &str = "Default Title";

static BUNDLE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\(\s*(?:pack\s+of\s+\d+|\d+\s*-?\s*pack|case\s+of\s+\d+|\d+\s*[x×]\s*[^)]*|bundle|multi\s*-?\s*pack|value\s+pack|twin\s*pack)\s*\)",
    )
    .expect("valid regex")
});

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// A record as it arrived from one of the supported sources.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Scraped(SupplierProduct),
    Csv(CsvDropRecord),
}

impl RawRecord {
    #[must_use]
    pub fn source_tag(&self) -> SourceTag {
        match self {
            RawRecord::Scraped(_) => SourceTag::Scraper,
            RawRecord::Csv(_) => SourceTag::Csv,
        }
    }

    /// Supplier id for scraped records, `file:line` for CSV rows.
    #[must_use]
    pub fn source_id(&self) -> String {
        match self {
            RawRecord::Scraped(product) => product.id.to_string(),
            RawRecord::Csv(record) => format!("{}:{}", record.file, record.line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingSku,
    MissingName,
    InvalidPrice,
    ZeroOrNegativePrice,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectReason::MissingSku => "missing_sku",
            RejectReason::MissingName => "missing_name",
            RejectReason::InvalidPrice => "invalid_price",
            RejectReason::ZeroOrNegativePrice => "zero_or_negative_price",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub source: SourceTag,
    pub source_id: String,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub products: Vec<CanonicalProduct>,
    pub rejections: Vec<Rejection>,
    /// Records whose stock text matched no known phrase (kept, in stock).
    pub unrecognized_stock: usize,
}

/// Strips parenthetical bundle markers such as `(Pack of 6)`, `(6 x 500ml)`
/// or `(Multipack)` and collapses whitespace.
#[must_use]
pub fn clean_name(raw: &str) -> String {
    let stripped = BUNDLE_MARKER_RE.replace_all(raw, " ");
    collapse_whitespace(&stripped)
}

/// Normalizes one record.
///
/// # Errors
///
/// Returns a [`Rejection`] when SKU or name is missing or the price is not a
/// positive number.
pub fn normalize_record(record: &RawRecord) -> Result<CanonicalProduct, Rejection> {
    let fields = match record {
        RawRecord::Scraped(product) => scraped_fields(product),
        RawRecord::Csv(row) => csv_fields(row),
    };
    let reject = |reason| Rejection {
        source: record.source_tag(),
        source_id: record.source_id(),
        reason,
    };

    let sku = fields.sku.ok_or_else(|| reject(RejectReason::MissingSku))?;

    let name = fields
        .name
        .as_deref()
        .map(clean_name)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| reject(RejectReason::MissingName))?;

    let price = fields
        .price
        .ok_or_else(|| reject(RejectReason::InvalidPrice))?;
    if price <= Decimal::ZERO {
        return Err(reject(RejectReason::ZeroOrNegativePrice));
    }

    let in_stock = interpret_stock(&fields.raw_stock).is_in_stock();

    Ok(CanonicalProduct {
        source: record.source_tag(),
        source_id: record.source_id(),
        sku,
        name,
        brand: fields.brand.unwrap_or_default(),
        price,
        raw_stock: fields.raw_stock,
        in_stock,
        category: fields
            .category
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
        image_urls: dedup_preserving_order(fields.image_urls),
        flavour: fields.flavour,
        description: fields.description,
        tags: fields.tags,
        parent_sku: fields.parent_sku,
        source_updated_at: fields.updated_at,
    })
}

/// Normalizes a batch, collecting rejections instead of stopping.
#[must_use]
pub fn normalize_batch(records: &[RawRecord]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for record in records {
        match normalize_record(record) {
            Ok(product) => {
                if interpret_stock(&product.raw_stock) == StockReading::Unrecognized {
                    tracing::debug!(
                        sku = %product.sku,
                        raw_stock = ?product.raw_stock,
                        "unrecognized stock value, defaulting to in stock"
                    );
                    batch.unrecognized_stock += 1;
                }
                batch.products.push(product);
            }
            Err(rejection) => {
                tracing::warn!(
                    source = %rejection.source,
                    source_id = %rejection.source_id,
                    reason = %rejection.reason,
                    "rejected supplier record"
                );
                batch.rejections.push(rejection);
            }
        }
    }
    batch
}

/// Converts one stock endpoint entry into a signal carrying only the fields
/// the supplier sent. Non-positive or unparseable prices are dropped.
#[must_use]
pub fn stock_signal(level: &StockLevel) -> StockSignal {
    StockSignal {
        sku: level.sku.trim().to_owned(),
        price: level
            .price
            .as_ref()
            .and_then(price_from_json)
            .filter(|p| *p > Decimal::ZERO),
        in_stock: level
            .stock
            .as_ref()
            .map(|raw| interpret_stock(raw).is_in_stock()),
    }
}

/// Supplier prices arrive as JSON strings or bare numbers.
fn price_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => extract_price(s),
        serde_json::Value::Number(n) => extract_price(&n.to_string()),
        _ => None,
    }
}

/// Source-independent view of one record's fields, already trimmed.
struct RecordFields {
    sku: Option<String>,
    name: Option<String>,
    brand: Option<String>,
    price: Option<Decimal>,
    raw_stock: RawStock,
    category: Option<String>,
    image_urls: Vec<String>,
    flavour: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    parent_sku: Option<String>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn scraped_fields(product: &SupplierProduct) -> RecordFields {
    let price = product.price.as_ref().and_then(price_from_json);

    let flavour = non_empty(product.flavour.as_deref()).or_else(|| {
        non_empty(product.option1.as_deref())
            .filter(|opt| !opt.eq_ignore_ascii_case(NO_VARIANT_OPTION))
    });

    RecordFields {
        sku: non_empty(product.sku.as_deref())
            .or_else(|| non_empty(Some(product.id.to_string().as_str()))),
        name: non_empty(product.title.as_deref()),
        brand: non_empty(product.vendor.as_deref()),
        price,
        raw_stock: product
            .stock
            .clone()
            .unwrap_or_else(|| RawStock::Text(String::new())),
        category: non_empty(product.product_type.as_deref()),
        image_urls: product
            .images
            .iter()
            .filter_map(|img| non_empty(Some(img.src.as_str())))
            .collect(),
        flavour,
        description: product.body_html.as_deref().and_then(strip_html),
        tags: product
            .tags
            .iter()
            .filter_map(|t| non_empty(Some(t.as_str())))
            .collect(),
        parent_sku: non_empty(product.parent_sku.as_deref()),
        updated_at: product.updated_at,
    }
}

fn csv_fields(record: &CsvDropRecord) -> RecordFields {
    let row = &record.row;
    let updated_at = row
        .updated_at
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .or(Some(record.file_modified_at));

    RecordFields {
        sku: non_empty(row.sku.as_deref()),
        name: non_empty(row.name.as_deref()),
        brand: non_empty(row.brand.as_deref()),
        price: row.price.as_deref().and_then(extract_price),
        raw_stock: RawStock::Text(row.stock.clone().unwrap_or_default()),
        category: non_empty(row.category.as_deref()),
        image_urls: split_list(row.images.as_deref(), &['|']),
        flavour: non_empty(row.flavour.as_deref()),
        description: non_empty(row.description.as_deref()),
        tags: split_list(row.tags.as_deref(), &[',', '|']),
        parent_sku: non_empty(row.parent_sku.as_deref()),
        updated_at,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn split_list(value: Option<&str>, separators: &[char]) -> Vec<String> {
    value
        .map(|v| {
            v.split(separators)
                .filter_map(|part| non_empty(Some(part)))
                .collect()
        })
        .unwrap_or_default()
}

fn strip_html(html: &str) -> Option<String> {
    let text = HTML_TAG_RE.replace_all(html, " ");
    let text = text
        .replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let collapsed = collapse_whitespace(&text);
    (!collapsed.is_empty()).then_some(collapsed)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
