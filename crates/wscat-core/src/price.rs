//! Price extraction from mixed-format supplier strings.
//!
//! Supplier feeds carry prices as `"£12.99"`, `"12,50 EUR"`, `"USD 1,299.00"`
//! or `"12.99 inc VAT"`. The extractor locates the first numeric run, decides
//! which separator is the decimal point, and parses the result exactly.
//! Values are rounded to whole cents, the precision the catalog stores.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept; matches the `NUMERIC(12, 2)` price columns.
pub const PRICE_SCALE: u32 = 2;

/// Extracts a decimal price from a mixed-format string.
///
/// Currency symbols, currency codes and surrounding words are ignored; only
/// the first numeric run is considered. A `-` immediately before the run is
/// kept so callers can reject negative prices explicitly.
///
/// Sub-cent values are rounded half away from zero, so `"0.004"` comes back
/// as zero and is rejected by callers that require a positive price.
///
/// Returns `None` when no numeric run exists or it cannot be parsed.
#[must_use]
pub fn extract_price(raw: &str) -> Option<Decimal> {
    let bytes = raw.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;

    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || matches!(bytes[end], b'.' | b',')) {
        end += 1;
    }

    let negative = start > 0 && bytes[start - 1] == b'-';
    let run = raw[start..end].trim_end_matches(['.', ',']);
    let normalized = normalize_separators(run);

    let value = Decimal::from_str(&normalized)
        .ok()?
        .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    Some(if negative { -value } else { value })
}

/// Rewrites a numeric run so that `.` is the only (decimal) separator.
///
/// - Both `,` and `.` present: the right-most one is the decimal separator.
/// - Only `,`: a single comma followed by one or two digits is a decimal
///   comma (`12,50`); anything else is a thousands separator (`1,299`).
/// - Only `.`: more than one dot means thousands separators (`1.299.000`).
fn normalize_separators(run: &str) -> String {
    let last_comma = run.rfind(',');
    let last_dot = run.rfind('.');

    match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => {
            if comma > dot {
                run.replace('.', "").replace(',', ".")
            } else {
                run.replace(',', "")
            }
        }
        (Some(comma), None) => {
            let digits_after = run.len() - comma - 1;
            if run.matches(',').count() == 1 && (1..=2).contains(&digits_after) {
                run.replace(',', ".")
            } else {
                run.replace(',', "")
            }
        }
        (None, Some(_)) if run.matches('.').count() > 1 => run.replace('.', ""),
        _ => run.to_string(),
    }
}
