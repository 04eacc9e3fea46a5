//! Variant merge engine.
//!
//! Groups canonical records by `(lowercased brand, family key)` and folds
//! groups that differ only by flavour into one catalog product. Every group
//! decision is logged so an over-eager family key can be traced back.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use wscat_core::{CanonicalProduct, MergePolicy, MergedProduct};

use crate::family_key::family_key;

const SYNTHESIZED_ID_PREFIX: &str = "fam-";
const SYNTHESIZED_HASH_LEN: usize = 12;

/// Output of one merge pass.
#[derive(Debug, Default)]
pub struct MergeReport {
    pub products: Vec<MergedProduct>,
    /// Records dropped by the exclusion policy.
    pub excluded: usize,
    /// Groups that could not produce a valid product.
    pub dropped_groups: usize,
    /// Groups folded into one multi-flavour product.
    pub merged_groups: usize,
    /// Products replaced by a later product with the same id.
    pub duplicate_ids: usize,
}

impl MergeReport {
    /// Records that did not reach the catalog as their own product.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.excluded + self.dropped_groups + self.duplicate_ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    NoImages,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::NoImages => f.write_str("no member has an image"),
        }
    }
}

/// Runs exclusion, grouping and merging over one batch.
///
/// `observed_at` becomes `created_at`/`updated_at` of every output product.
/// Output order follows the first-seen order of each group.
#[must_use]
pub fn merge_batch(
    records: Vec<CanonicalProduct>,
    policy: &MergePolicy,
    observed_at: DateTime<Utc>,
) -> MergeReport {
    let mut report = MergeReport::default();

    let mut groups: Vec<(String, String, Vec<CanonicalProduct>)> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for record in records {
        if let Some(reason) = policy.exclusion_for(&record) {
            tracing::debug!(sku = %record.sku, %reason, "record excluded by policy");
            report.excluded += 1;
            continue;
        }
        let brand = record.brand.trim().to_lowercase();
        let key = family_key(&record.name, record.flavour.as_deref());
        match index.get(&(brand.clone(), key.clone())) {
            Some(&i) => groups[i].2.push(record),
            None => {
                index.insert((brand.clone(), key.clone()), groups.len());
                groups.push((brand, key, vec![record]));
            }
        }
    }

    let mut by_id: HashMap<String, usize> = HashMap::new();
    for (brand, key, members) in groups {
        for product in resolve_group(&brand, &key, members, observed_at, &mut report) {
            if let Some(&existing) = by_id.get(&product.id) {
                tracing::warn!(
                    id = %product.id,
                    family_key = %key,
                    "duplicate product id in batch, keeping the later record"
                );
                report.duplicate_ids += 1;
                report.products[existing] = product;
            } else {
                by_id.insert(product.id.clone(), report.products.len());
                report.products.push(product);
            }
        }
    }

    report
}

fn resolve_group(
    brand: &str,
    key: &str,
    members: Vec<CanonicalProduct>,
    observed_at: DateTime<Utc>,
    report: &mut MergeReport,
) -> Vec<MergedProduct> {
    let member_skus: Vec<String> = members.iter().map(|m| m.sku.clone()).collect();
    let distinct = distinct_flavours(&members);

    if members.len() < 2 || distinct.len() < 2 {
        tracing::debug!(
            family_key = %key,
            members = ?member_skus,
            decision = if members.len() < 2 { "single" } else { "separate" },
            "variant group resolved"
        );
        return members
            .into_iter()
            .map(|m| single_product(m, key, observed_at))
            .collect();
    }

    match merge_members(brand, key, members, &distinct, observed_at) {
        Ok(product) => {
            tracing::debug!(
                family_key = %key,
                members = ?member_skus,
                decision = "merge",
                "variant group resolved"
            );
            tracing::info!(
                id = %product.id,
                family_key = %key,
                flavours = ?product.flavours,
                members = product.member_skus.len(),
                "merged variant group"
            );
            report.merged_groups += 1;
            vec![product]
        }
        Err(reason) => {
            tracing::warn!(
                family_key = %key,
                members = ?member_skus,
                %reason,
                "dropped variant group"
            );
            report.dropped_groups += 1;
            Vec::new()
        }
    }
}

/// Distinct non-empty flavours, compared trimmed and case-insensitively,
/// keeping the first-seen spelling.
fn distinct_flavours(members: &[CanonicalProduct]) -> Vec<String> {
    let mut seen = HashSet::new();
    members
        .iter()
        .filter_map(|m| m.flavour.as_deref().map(str::trim))
        .filter(|f| !f.is_empty())
        .filter(|f| seen.insert(f.to_lowercase()))
        .map(str::to_owned)
        .collect()
}

fn single_product(
    record: CanonicalProduct,
    key: &str,
    observed_at: DateTime<Utc>,
) -> MergedProduct {
    let flavours = record
        .flavour
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|f| vec![f.to_owned()])
        .unwrap_or_default();
    MergedProduct {
        id: record.sku.clone(),
        name: record.name,
        brand: record.brand,
        category: record.category,
        price: record.price,
        in_stock: record.in_stock,
        images: record.image_urls,
        flavours,
        flavour_images: BTreeMap::new(),
        member_skus: vec![record.sku],
        family_key: key.to_owned(),
        description: record.description,
        created_at: observed_at,
        updated_at: observed_at,
    }
}

fn merge_members(
    brand: &str,
    key: &str,
    members: Vec<CanonicalProduct>,
    flavours: &[String],
    observed_at: DateTime<Utc>,
) -> Result<MergedProduct, DropReason> {
    let mut images: Vec<String> = Vec::new();
    let mut seen_images = HashSet::new();
    let mut first_image_by_flavour: BTreeMap<String, String> = BTreeMap::new();
    let mut member_skus: Vec<String> = Vec::new();
    let mut in_stock = false;

    for member in &members {
        for url in &member.image_urls {
            if seen_images.insert(url.clone()) {
                images.push(url.clone());
            }
        }
        if let (Some(flavour), Some(first)) = (member.flavour.as_deref(), member.image_urls.first())
        {
            let flavour = flavour.trim().to_lowercase();
            if !flavour.is_empty() {
                first_image_by_flavour
                    .entry(flavour)
                    .or_insert_with(|| first.clone());
            }
        }
        if !member_skus.contains(&member.sku) {
            member_skus.push(member.sku.clone());
        }
        in_stock |= member.in_stock;
    }

    if images.is_empty() {
        return Err(DropReason::NoImages);
    }

    let distinct_images: HashSet<&String> = first_image_by_flavour.values().collect();
    let flavour_images = if distinct_images.len() >= 2 {
        first_image_by_flavour
    } else {
        BTreeMap::new()
    };

    let id = members
        .iter()
        .find_map(|m| m.parent_sku.clone())
        .unwrap_or_else(|| synthesized_id(brand, key));

    let mut members = members.into_iter();
    let Some(base) = members.next() else {
        return Err(DropReason::NoImages);
    };
    let name = strip_flavour(&base.name, base.flavour.as_deref());

    Ok(MergedProduct {
        id,
        name,
        brand: base.brand,
        category: base.category,
        price: base.price,
        in_stock,
        images,
        flavours: flavours.to_vec(),
        flavour_images,
        member_skus,
        family_key: key.to_owned(),
        description: base.description,
        created_at: observed_at,
        updated_at: observed_at,
    })
}

/// `fam-` plus the first 12 hex digits of `sha256(brand|key)`; stable across
/// runs as long as brand and family key are.
pub(crate) fn synthesized_id(brand: &str, key: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(format!("{brand}|{key}").as_bytes()));
    format!("{SYNTHESIZED_ID_PREFIX}{}", &digest[..SYNTHESIZED_HASH_LEN])
}

/// Removes the base member's own flavour words from its display name.
pub(crate) fn strip_flavour(name: &str, flavour: Option<&str>) -> String {
    let Some(flavour) = flavour.map(str::trim).filter(|f| !f.is_empty()) else {
        return name.to_owned();
    };
    let lower_flavour = flavour.to_lowercase();
    let flavour_words: Vec<&str> = lower_flavour.split_whitespace().collect();
    let words: Vec<&str> = name.split_whitespace().collect();

    let mut kept: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let window_matches = i + flavour_words.len() <= words.len()
            && words[i..i + flavour_words.len()]
                .iter()
                .zip(&flavour_words)
                .all(|(w, f)| w.to_lowercase() == *f);
        if window_matches {
            i += flavour_words.len();
        } else {
            kept.push(words[i]);
            i += 1;
        }
    }

    let stripped = kept.join(" ");
    let stripped = stripped.trim_end_matches(['-', '–', ',', '/']).trim();
    if stripped.is_empty() {
        name.to_owned()
    } else {
        stripped.to_owned()
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
