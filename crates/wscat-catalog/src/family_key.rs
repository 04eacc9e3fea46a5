//! Family-key extraction: the grouping key shared by package sizes and
//! flavours of one product.
//!
//! Deterministic and lossy. `"Acme Whey 900g Vanilla"` and
//! `"Acme Whey 2kg Strawberry"` both key as `acme whey` once their own
//! flavours are removed.

use std::sync::LazyLock;

use regex::Regex;

static PACK_NOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\([^)]*(?:\d|pack|bundle|case)[^)]*\)").expect("valid regex")
});

static MULTIPACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+\s*[x×]\s*\d+(?:[.,]\d+)?\s*(?:kg|g|mg|ml|cl|l|oz|lbs?)?\b",
    )
    .expect("valid regex")
});

static MEASURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:[.,]\d+)?\s*(?:kgs?|kilos?|grams?|gr|g|mg|mcg|ml|cl|litres?|liters?|ltr|l|lbs?|oz)\b",
    )
    .expect("valid regex")
});

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+\s*(?:servings?|serves|capsules?|caps|tablets?|tabs|softgels?|sachets?|scoops?|pieces|pcs|count|ct|pack|pk)\b",
    )
    .expect("valid regex")
});

/// Derives the family key for `name`.
///
/// Strips parenthetical pack notes, `NxM` multipacks, weights and volumes
/// (g, kg, mg, mcg, ml, cl, l, lb, oz) and serving/capsule/tablet counts,
/// folds punctuation to spaces and lowercases. When `flavour` is given its
/// words are removed from the key as well; if that would leave nothing the
/// flavour stays in.
#[must_use]
pub fn family_key(name: &str, flavour: Option<&str>) -> String {
    let stripped = PACK_NOTE_RE.replace_all(name, " ");
    let stripped = MULTIPACK_RE.replace_all(&stripped, " ");
    let stripped = MEASURE_RE.replace_all(&stripped, " ");
    let stripped = COUNT_RE.replace_all(&stripped, " ");

    let tokens = fold_tokens(&stripped);
    let without_flavour = flavour
        .map(fold_tokens)
        .filter(|f| !f.is_empty())
        .map(|f| remove_sequence(&tokens, &f))
        .filter(|t| !t.is_empty());

    without_flavour.unwrap_or(tokens).join(" ")
}

fn fold_tokens(text: &str) -> Vec<String> {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Removes every occurrence of the contiguous `needle` token run.
fn remove_sequence(tokens: &[String], needle: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i..].starts_with(needle) {
            i += needle.len();
        } else {
            out.push(tokens[i].clone());
            i += 1;
        }
    }
    out
}
