//! Catalog query service.
//!
//! Reads the catalog baseline from the store and layers the current override
//! generation on top at read time. Neither the store nor the cache is ever
//! written from here.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use wscat_core::{AppConfig, MergedProduct};
use wscat_db::{CatalogStore, ProductFilter};

use crate::error::QueryError;
use crate::overrides::{OverrideCache, OverrideGeneration};

pub const DEFAULT_PAGE_SIZE: u32 = 24;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    BestMatch,
    PriceAsc,
    PriceDesc,
}

impl SortKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::BestMatch => "best_match",
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
        }
    }
}

impl FromStr for SortKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "best_match" => Ok(SortKey::BestMatch),
            "price_asc" => Ok(SortKey::PriceAsc),
            "price_desc" => Ok(SortKey::PriceDesc),
            other => Err(QueryError::UnknownSort(other.to_owned())),
        }
    }
}

/// Filters, sort and paging of one catalog query. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// 1-based; values below 1 are clamped to 1.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<MergedProduct>,
    /// Matches after filtering, across all pages.
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    /// Every catalog category, independent of the filters.
    pub categories: Vec<String>,
}

/// Read side of the catalog.
#[derive(Clone)]
pub struct CatalogQueryService {
    store: Arc<dyn CatalogStore>,
    overrides: Arc<OverrideCache>,
    default_page_size: u32,
    max_page_size: u32,
}

impl CatalogQueryService {
    pub fn new(store: Arc<dyn CatalogStore>, overrides: Arc<OverrideCache>) -> Self {
        Self {
            store,
            overrides,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Uses the configured page sizes instead of the built-in ones.
    #[must_use]
    pub fn with_page_sizes(mut self, default_page_size: u32, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self.default_page_size = default_page_size.clamp(1, self.max_page_size);
        self
    }

    pub fn from_config(
        store: Arc<dyn CatalogStore>,
        overrides: Arc<OverrideCache>,
        config: &AppConfig,
    ) -> Self {
        Self::new(store, overrides)
            .with_page_sizes(config.query_default_page_size, config.query_max_page_size)
    }

    #[must_use]
    pub fn overrides(&self) -> &Arc<OverrideCache> {
        &self.overrides
    }

    /// Returns one page of products with override price/stock applied.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownSort`] or [`QueryError::InvertedPriceRange`]
    /// for invalid arguments, and [`QueryError::Store`] if the store fails.
    pub async fn query_products(&self, query: &ProductQuery) -> Result<ProductPage, QueryError> {
        let sort = query
            .sort
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(SortKey::from_str)
            .transpose()?
            .unwrap_or_default();
        if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
            if min > max {
                return Err(QueryError::InvertedPriceRange { min, max });
            }
        }

        let page = query.page.unwrap_or(1).max(1);
        let page_size = query
            .page_size
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        self.overrides.refresh_in_background().await;
        let generation = self.overrides.current();

        let filter = ProductFilter {
            category: query
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_owned),
        };
        let baseline = self.store.list_products(&filter).await?;
        let categories = self.store.list_categories().await?;

        let terms = search_terms(query.search.as_deref());
        let mut matches: Vec<(u8, MergedProduct)> = baseline
            .into_iter()
            .map(|product| apply_override(product, &generation))
            .filter(|product| {
                query.min_price.is_none_or(|min| product.price >= min)
                    && query.max_price.is_none_or(|max| product.price <= max)
            })
            .filter_map(|product| {
                if terms.is_empty() {
                    return Some((0, product));
                }
                matches_all_terms(&product, &terms).then(|| (relevance(&product, &terms), product))
            })
            .collect();

        match sort {
            SortKey::BestMatch => matches.sort_by(|(sa, a), (sb, b)| {
                sb.cmp(sa).then_with(|| by_name_then_id(a, b))
            }),
            SortKey::PriceAsc => matches.sort_by(|(_, a), (_, b)| {
                a.price.cmp(&b.price).then_with(|| by_name_then_id(a, b))
            }),
            SortKey::PriceDesc => matches.sort_by(|(_, a), (_, b)| {
                b.price.cmp(&a.price).then_with(|| by_name_then_id(a, b))
            }),
        }

        let total = matches.len();
        let offset = usize::try_from(page - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(usize::try_from(page_size).unwrap_or(usize::MAX));
        let items = matches
            .into_iter()
            .skip(offset)
            .take(usize::try_from(page_size).unwrap_or(usize::MAX))
            .map(|(_, product)| product)
            .collect();

        Ok(ProductPage {
            items,
            total,
            page,
            page_size,
            categories,
        })
    }

    /// Looks a product up by id or member SKU, with overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] if the store fails.
    pub async fn get_product_by_id(&self, id: &str) -> Result<Option<MergedProduct>, QueryError> {
        self.overrides.refresh_in_background().await;
        let generation = self.overrides.current();
        let product = self.store.get_product(id).await?;
        Ok(product.map(|p| apply_override(p, &generation)))
    }
}

/// Replaces price and stock with the override for the product id, or else
/// for the first member SKU that has one.
fn apply_override(mut product: MergedProduct, generation: &OverrideGeneration) -> MergedProduct {
    let entry = generation.lookup(&product.id).or_else(|| {
        product
            .member_skus
            .iter()
            .find_map(|sku| generation.lookup(sku))
    });
    if let Some(entry) = entry {
        if let Some(price) = entry.price {
            product.price = price;
        }
        if let Some(in_stock) = entry.in_stock {
            product.in_stock = in_stock;
        }
    }
    product
}

fn search_terms(search: Option<&str>) -> Vec<String> {
    search
        .map(|s| s.split_whitespace().map(str::to_lowercase).collect())
        .unwrap_or_default()
}

fn matches_all_terms(product: &MergedProduct, terms: &[String]) -> bool {
    let name = product.name.to_lowercase();
    let category = product.category.to_lowercase();
    let description = product
        .description
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    terms.iter().all(|term| {
        name.contains(term.as_str())
            || category.contains(term.as_str())
            || description.contains(term.as_str())
    })
}

/// Higher is better: name prefix, name word, name substring, category,
/// description. Multi-term searches score on the joined phrase.
fn relevance(product: &MergedProduct, terms: &[String]) -> u8 {
    let phrase = terms.join(" ");
    let name = product.name.to_lowercase();
    if name.starts_with(&phrase) {
        5
    } else if name
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| !word.is_empty() && word.starts_with(phrase.as_str()))
    {
        4
    } else if name.contains(&phrase) {
        3
    } else if product.category.to_lowercase().contains(&phrase) {
        2
    } else if product
        .description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains(&phrase))
    {
        1
    } else {
        0
    }
}

fn by_name_then_id(a: &MergedProduct, b: &MergedProduct) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
