//! Folds freshly merged products into the families already in the catalog.
//!
//! A batch only sees the records the source returned. An incremental run
//! that touches one flavour of a stored family, or a full run in which a
//! family gains its second flavour, must update the stored family instead of
//! writing a standalone row next to it.
//!
//! A batch product is related to a stored product when they share an id or
//! any member SKU, or when they have the same brand and family key and
//! together carry at least two distinct flavours (the same rule the merge
//! engine applies within a batch).

use std::collections::{BTreeMap, HashSet};

use wscat_core::MergedProduct;

use crate::merge::{strip_flavour, synthesized_id};

/// Output of [`reconcile_with_catalog`].
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Products to upsert, in first-touched order.
    pub products: Vec<MergedProduct>,
    /// Stored product ids absorbed by another product, keyed by the id that
    /// absorbed them. They are deleted once the absorbing product is written.
    pub retired: BTreeMap<String, Vec<String>>,
    /// Batch products that were folded into at least one stored product.
    pub folded: usize,
}

impl Reconciliation {
    /// Stored ids retired in favour of `id`.
    #[must_use]
    pub fn retired_by(&self, id: &str) -> &[String] {
        self.retired.get(id).map_or(&[][..], Vec::as_slice)
    }
}

/// Resolves every batch product against `stored`.
///
/// Stored products that the batch does not relate to are left out of the
/// result. A batch product whose members cover a stored product entirely
/// replaces it; otherwise the stored product's flavours, images, flavour
/// images and member SKUs are kept alongside the batch data.
#[must_use]
pub fn reconcile_with_catalog(
    batch: Vec<MergedProduct>,
    stored: Vec<MergedProduct>,
) -> Reconciliation {
    let stored_ids: HashSet<String> = stored.iter().map(|p| p.id.clone()).collect();
    let mut working = stored;
    let mut touched: Vec<String> = Vec::new();
    let mut retired: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut folded = 0;

    for product in batch {
        let (related, rest): (Vec<_>, Vec<_>) =
            working.into_iter().partition(|s| is_related(&product, s));
        working = rest;

        let result = if related.is_empty() {
            product
        } else {
            folded += 1;
            let result = fold(product, &related);
            for absorbed in related.iter().filter(|s| s.id != result.id) {
                touched.retain(|id| *id != absorbed.id);
                let mut chain = retired.remove(&absorbed.id).unwrap_or_default();
                if stored_ids.contains(&absorbed.id) {
                    chain.push(absorbed.id.clone());
                }
                tracing::info!(
                    retired = %absorbed.id,
                    into = %result.id,
                    family_key = %result.family_key,
                    "stored product absorbed into variant family"
                );
                retired.entry(result.id.clone()).or_default().extend(chain);
            }
            result
        };

        if !touched.contains(&result.id) {
            touched.push(result.id.clone());
        }
        working.push(result);
    }

    let mut by_id: BTreeMap<String, MergedProduct> =
        working.into_iter().map(|p| (p.id.clone(), p)).collect();
    let products = touched.iter().filter_map(|id| by_id.remove(id)).collect();
    retired.retain(|_, ids| !ids.is_empty());

    Reconciliation {
        products,
        retired,
        folded,
    }
}

fn is_related(product: &MergedProduct, stored: &MergedProduct) -> bool {
    if product.id == stored.id {
        return true;
    }
    let shares_sku = std::iter::once(&stored.id)
        .chain(&stored.member_skus)
        .any(|sku| *sku == product.id || product.member_skus.contains(sku));
    if shares_sku {
        return true;
    }
    same_family(product, stored)
        && distinct_flavours([product, stored].into_iter()).len() >= 2
}

fn same_family(a: &MergedProduct, b: &MergedProduct) -> bool {
    a.family_key == b.family_key
        && a.brand.trim().to_lowercase() == b.brand.trim().to_lowercase()
}

fn is_family(product: &MergedProduct) -> bool {
    product.flavours.len() >= 2
}

/// `true` when every member SKU of `stored` is also a member of `product`.
fn covers(product: &MergedProduct, stored: &MergedProduct) -> bool {
    stored
        .member_skus
        .iter()
        .all(|sku| product.member_skus.contains(sku))
}

/// Distinct flavours in first-seen order, compared trimmed and
/// case-insensitively.
fn distinct_flavours<'a>(sources: impl Iterator<Item = &'a MergedProduct>) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .flat_map(|p| p.flavours.iter())
        .map(|f| f.trim())
        .filter(|f| !f.is_empty() && seen.insert(f.to_lowercase()))
        .map(str::to_owned)
        .collect()
}

/// First image per lowercased flavour a product can vouch for.
fn first_images(product: &MergedProduct) -> BTreeMap<String, String> {
    if !product.flavour_images.is_empty() {
        return product.flavour_images.clone();
    }
    match (product.flavours.as_slice(), product.images.first()) {
        ([flavour], Some(image)) => {
            BTreeMap::from([(flavour.trim().to_lowercase(), image.clone())])
        }
        _ => BTreeMap::new(),
    }
}

fn dedup_concat<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    lists
        .flatten()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

fn fold(product: MergedProduct, related: &[MergedProduct]) -> MergedProduct {
    // Stored products the batch product covers contribute nothing but their
    // place in the family; the batch data is authoritative for them.
    let partial: Vec<&MergedProduct> = related.iter().filter(|s| !covers(&product, s)).collect();
    let sources: Vec<&MergedProduct> = partial.iter().copied().chain([&product]).collect();

    let member_skus = dedup_concat(sources.iter().map(|p| &p.member_skus));
    let images = dedup_concat(sources.iter().map(|p| &p.images));
    let flavours = distinct_flavours(sources.iter().copied());

    let mut image_by_flavour = BTreeMap::new();
    for source in &sources {
        image_by_flavour.extend(first_images(source));
    }
    let distinct_images: HashSet<&String> = image_by_flavour.values().collect();
    let flavour_images = if flavours.len() >= 2 && distinct_images.len() >= 2 {
        image_by_flavour
    } else {
        BTreeMap::new()
    };

    let family = flavours.len() >= 2;
    let id = if !family || is_family(&product) {
        product.id.clone()
    } else {
        related
            .iter()
            .find(|s| is_family(s))
            .map(|s| s.id.clone())
            .unwrap_or_else(|| {
                synthesized_id(&product.brand.trim().to_lowercase(), &product.family_key)
            })
    };

    // The base member keeps supplying name, price and category, as it does
    // within a batch; fresh batch data wins when the batch holds it.
    let base_sku = member_skus.first().cloned().unwrap_or_default();
    let base = if product.member_skus.contains(&base_sku) {
        &product
    } else {
        sources[0]
    };
    let name = match base.flavours.as_slice() {
        [flavour] if family => strip_flavour(&base.name, Some(flavour.as_str())),
        _ => base.name.clone(),
    };

    let in_stock = product.in_stock || partial.iter().any(|s| s.in_stock);
    let created_at = related
        .iter()
        .map(|s| s.created_at)
        .chain([product.created_at])
        .min()
        .unwrap_or(product.created_at);

    MergedProduct {
        id,
        name,
        brand: base.brand.clone(),
        category: base.category.clone(),
        price: base.price,
        in_stock,
        images,
        flavours,
        flavour_images,
        member_skus,
        family_key: product.family_key.clone(),
        description: base.description.clone(),
        created_at,
        updated_at: product.updated_at,
    }
}
