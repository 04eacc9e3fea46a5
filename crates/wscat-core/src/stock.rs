//! Stock-state interpretation shared by the record normalizer and the
//! override feed parser.

use crate::products::RawStock;

/// Interpreted stock state of one raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockReading {
    InStock,
    OutOfStock,
    /// Text that matched no known phrase. Treated as in stock and counted
    /// by callers so feed quality problems stay visible.
    Unrecognized,
}

impl StockReading {
    /// Unrecognized readings default to in stock.
    #[must_use]
    pub fn is_in_stock(self) -> bool {
        !matches!(self, StockReading::OutOfStock)
    }

    #[must_use]
    pub fn is_recognized(self) -> bool {
        !matches!(self, StockReading::Unrecognized)
    }
}

const IN_STOCK_PHRASES: &[&str] = &[
    "in stock",
    "instock",
    "available",
    "yes",
    "y",
    "true",
    "low stock",
    "limited stock",
    "limited",
    "few left",
    "on hand",
];

const OUT_OF_STOCK_PHRASES: &[&str] = &[
    "out of stock",
    "outofstock",
    "oos",
    "sold out",
    "soldout",
    "unavailable",
    "not available",
    "no",
    "n",
    "false",
    "discontinued",
    "backorder",
    "on backorder",
];

/// Interprets a raw stock value.
#[must_use]
pub fn interpret_stock(raw: &RawStock) -> StockReading {
    match raw {
        RawStock::Quantity(qty) => quantity_reading(*qty),
        RawStock::Text(text) => interpret_stock_text(text),
    }
}

/// Interprets free-text stock state.
///
/// Quantities written as text (`"12"`, `"10+"`, `">5"`) follow the quantity
/// rule: more than zero is in stock.
#[must_use]
pub fn interpret_stock_text(text: &str) -> StockReading {
    let folded = fold(text);
    if folded.is_empty() {
        return StockReading::Unrecognized;
    }

    if let Some(qty) = parse_quantity(&folded) {
        return quantity_reading(qty);
    }

    if OUT_OF_STOCK_PHRASES.contains(&folded.as_str()) {
        return StockReading::OutOfStock;
    }
    if IN_STOCK_PHRASES.contains(&folded.as_str()) {
        return StockReading::InStock;
    }

    // Longer values such as "In stock (12 units)" or "Sold out online".
    if folded.contains("out of stock") || folded.contains("sold out") {
        return StockReading::OutOfStock;
    }
    if folded.starts_with("in stock") {
        return StockReading::InStock;
    }

    StockReading::Unrecognized
}

fn quantity_reading(qty: i64) -> StockReading {
    if qty > 0 {
        StockReading::InStock
    } else {
        StockReading::OutOfStock
    }
}

/// Lowercases and folds `_`, `-` and runs of whitespace to single spaces.
fn fold(text: &str) -> String {
    text.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_quantity(folded: &str) -> Option<i64> {
    let trimmed = folded
        .trim_start_matches('>')
        .trim_end_matches('+')
        .trim();
    if let Ok(qty) = trimmed.parse::<i64>() {
        return Some(qty);
    }
    // "5.0" style quantities from spreadsheet exports.
    let (whole, fraction) = trimmed.split_once('.')?;
    if fraction.chars().all(|c| c == '0') {
        whole.parse::<i64>().ok()
    } else {
        None
    }
}
