//! Override feed parsing.
//!
//! Feeds are loosely tabular files exported by merchandising tools. Two
//! layouts are seen in practice:
//!
//! - named columns: a header row with a SKU-like column (`sku`, `item code`,
//!   ...) plus optional price and stock columns in any order;
//! - positional columns: no header, or a generic one (`col1,col2,col3`,
//!   `A;B;C`), with SKU, price and stock in columns 0, 1 and 2.
//!
//! The layout is chosen once per file from the first row. Exports that were
//! concatenated repeat the header mid-file; such rows are skipped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use wscat_core::{extract_price, interpret_stock_text, PriceOverrideEntry, StockReading};
use wscat_scraper::sniff_delimiter;

use crate::error::FeedError;

const SKU_HEADERS: &[&str] = &["sku", "productsku", "itemsku", "code", "itemcode", "productcode"];
const PRICE_HEADERS: &[&str] = &["price", "unitprice", "sellprice", "overrideprice", "saleprice"];
const STOCK_HEADERS: &[&str] = &[
    "stock",
    "instock",
    "stockstatus",
    "availability",
    "qty",
    "quantity",
];

static GENERIC_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:col(?:umn)?|field|f)[\s_-]?\d+$|^[a-z]$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedLayout {
    Named,
    Positional,
}

/// One interpreted feed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRow {
    pub sku: String,
    pub price: Option<Decimal>,
    pub stock: Option<StockReading>,
    /// A non-empty price cell that did not parse to a positive amount.
    pub unparseable_price: bool,
}

/// Maps one CSV record to a [`FeedRow`].
pub trait FeedParser: Send + Sync {
    fn layout(&self) -> FeedLayout;

    /// `None` when the record carries no SKU.
    fn parse_record(&self, record: &StringRecord) -> Option<FeedRow>;
}

/// Columns located by header name.
#[derive(Debug, Clone)]
pub struct NamedColumnParser {
    sku: usize,
    price: Option<usize>,
    stock: Option<usize>,
}

impl NamedColumnParser {
    /// Builds a parser from a header row; `None` when no SKU column exists.
    #[must_use]
    pub fn from_header(header: &StringRecord) -> Option<Self> {
        let find = |aliases: &[&str]| {
            header
                .iter()
                .position(|cell| aliases.contains(&fold_header(cell).as_str()))
        };
        Some(Self {
            sku: find(SKU_HEADERS)?,
            price: find(PRICE_HEADERS),
            stock: find(STOCK_HEADERS),
        })
    }
}

impl FeedParser for NamedColumnParser {
    fn layout(&self) -> FeedLayout {
        FeedLayout::Named
    }

    fn parse_record(&self, record: &StringRecord) -> Option<FeedRow> {
        build_row(
            record.get(self.sku),
            self.price.and_then(|i| record.get(i)),
            self.stock.and_then(|i| record.get(i)),
        )
    }
}

/// Column 0 = SKU, 1 = price, 2 = stock.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalColumnParser;

impl FeedParser for PositionalColumnParser {
    fn layout(&self) -> FeedLayout {
        FeedLayout::Positional
    }

    fn parse_record(&self, record: &StringRecord) -> Option<FeedRow> {
        build_row(record.get(0), record.get(1), record.get(2))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub rows: usize,
    pub skipped_rows: usize,
    pub unrecognized_stock: usize,
    pub unparseable_prices: usize,
}

/// A fully parsed feed, keyed by SKU. Duplicate SKUs keep the last row.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub layout: FeedLayout,
    pub entries: HashMap<String, PriceOverrideEntry>,
    pub stats: FeedStats,
}

/// Parses feed text.
///
/// # Errors
///
/// Returns [`FeedError::Csv`] if the text is not readable as delimited data.
pub fn parse_feed(content: &str) -> Result<ParsedFeed, FeedError> {
    let first_line = content.lines().next().unwrap_or_default();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(sniff_delimiter(first_line))
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let mut stats = FeedStats::default();
    let mut entries = HashMap::new();

    let Some(first) = records.next().transpose()? else {
        return Ok(ParsedFeed {
            layout: FeedLayout::Positional,
            entries,
            stats,
        });
    };

    let (parser, header, first_is_data): (Box<dyn FeedParser>, Option<StringRecord>, bool) =
        if let Some(named) = NamedColumnParser::from_header(&first) {
            (Box::new(named), Some(first.clone()), false)
        } else if is_generic_header(&first) {
            (Box::new(PositionalColumnParser), Some(first.clone()), false)
        } else {
            (Box::new(PositionalColumnParser), None, true)
        };

    let pending = first_is_data.then_some(Ok(first));
    for result in pending.into_iter().chain(records) {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if header.as_ref().is_some_and(|h| same_cells(&record, h))
            || (header.is_none() && looks_like_header(&record))
        {
            stats.skipped_rows += 1;
            continue;
        }

        stats.rows += 1;
        let Some(row) = parser.parse_record(&record) else {
            stats.skipped_rows += 1;
            continue;
        };
        if row.unparseable_price {
            stats.unparseable_prices += 1;
        }
        if row.stock == Some(StockReading::Unrecognized) {
            stats.unrecognized_stock += 1;
        }
        let entry = PriceOverrideEntry {
            sku: row.sku.clone(),
            price: row.price,
            in_stock: row.stock.map(StockReading::is_in_stock),
        };
        entries.insert(row.sku, entry);
    }

    Ok(ParsedFeed {
        layout: parser.layout(),
        entries,
        stats,
    })
}

/// Reads and parses a feed file. Blocking; async callers use
/// `spawn_blocking`.
///
/// # Errors
///
/// Returns [`FeedError::Io`] if the file cannot be read, or
/// [`FeedError::Csv`] if it cannot be parsed.
pub fn parse_feed_file(path: &Path) -> Result<ParsedFeed, FeedError> {
    let content = std::fs::read_to_string(path).map_err(|source| FeedError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_feed(&content)
}

fn build_row(sku: Option<&str>, price: Option<&str>, stock: Option<&str>) -> Option<FeedRow> {
    let sku = sku.map(str::trim).filter(|s| !s.is_empty())?;

    let price_cell = price.map(str::trim).filter(|p| !p.is_empty());
    let parsed_price = price_cell
        .and_then(extract_price)
        .filter(|p| *p > Decimal::ZERO);

    let stock = stock
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(interpret_stock_text);

    Some(FeedRow {
        sku: sku.to_owned(),
        price: parsed_price,
        stock,
        unparseable_price: price_cell.is_some() && parsed_price.is_none(),
    })
}

fn fold_header(cell: &str) -> String {
    cell.trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn is_generic_header(record: &StringRecord) -> bool {
    !record.is_empty()
        && record
            .iter()
            .all(|cell| GENERIC_HEADER_RE.is_match(cell.trim()))
}

fn looks_like_header(record: &StringRecord) -> bool {
    NamedColumnParser::from_header(record).is_some() || is_generic_header(record)
}

fn same_cells(a: &StringRecord, b: &StringRecord) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| fold_header(x) == fold_header(y))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn named_layout_with_columns_in_any_order() {
        let feed = parse_feed("Stock Status,Price,Item Code\nout of stock,,A\n,£19.99,B\n").unwrap();
        assert_eq!(feed.layout, FeedLayout::Named);

        let a = &feed.entries["A"];
        assert_eq!(a.in_stock, Some(false));
        assert_eq!(a.price, None);

        let b = &feed.entries["B"];
        assert_eq!(b.price, Some(dec("19.99")));
        assert_eq!(b.in_stock, None);
    }

    #[test]
    fn positional_layout_without_header() {
        let feed = parse_feed("A;12,50;in stock\nB;;0\n").unwrap();
        assert_eq!(feed.layout, FeedLayout::Positional);
        assert_eq!(feed.entries["A"].price, Some(dec("12.50")));
        assert_eq!(feed.entries["A"].in_stock, Some(true));
        assert_eq!(feed.entries["B"].in_stock, Some(false));
        assert_eq!(feed.stats.rows, 2);
    }

    #[test]
    fn positional_layout_with_generic_header() {
        let feed = parse_feed("col1,col2,col3\nA,9.99,yes\n").unwrap();
        assert_eq!(feed.layout, FeedLayout::Positional);
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries["A"].price, Some(dec("9.99")));
    }

    #[test]
    fn header_repeat_rows_are_skipped() {
        let feed = parse_feed("sku,price\nA,1.00\nSKU,Price\nB,2.00\n").unwrap();
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.stats.skipped_rows, 1);
    }

    #[test]
    fn unparseable_price_leaves_price_absent() {
        let feed = parse_feed("sku,price,stock\nA,call us,in stock\nB,-3,\n").unwrap();
        assert_eq!(feed.entries["A"].price, None);
        assert_eq!(feed.entries["A"].in_stock, Some(true));
        assert_eq!(feed.entries["B"].price, None);
        assert_eq!(feed.stats.unparseable_prices, 2);
    }

    #[test]
    fn unrecognized_stock_defaults_in_stock_and_is_counted() {
        let feed = parse_feed("sku,stock\nA,arriving tuesday\n").unwrap();
        assert_eq!(feed.entries["A"].in_stock, Some(true));
        assert_eq!(feed.stats.unrecognized_stock, 1);
    }

    #[test]
    fn duplicate_sku_last_row_wins() {
        let feed = parse_feed("sku,price\nA,1.00\nA,2.00\n").unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries["A"].price, Some(dec("2.00")));
    }

    #[test]
    fn rows_without_sku_are_skipped() {
        let feed = parse_feed("sku,price\n,1.00\nA,2.00\n").unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.stats.skipped_rows, 1);
    }

    #[test]
    fn empty_feed_has_no_entries() {
        let feed = parse_feed("").unwrap();
        assert!(feed.entries.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_feed_file(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
    }
}
