//! Database operations for `catalog_products`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use wscat_core::{MergedProduct, StockSignal};

use crate::DbError;

const PRODUCT_COLUMNS: &str = "id, name, brand, category, price, in_stock, images, flavours, \
     flavour_images, member_skus, family_key, description, last_sync_run_id, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `catalog_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: Decimal,
    pub in_stock: bool,
    pub images: Vec<String>,
    pub flavours: Vec<String>,
    pub flavour_images: Json<BTreeMap<String, String>>,
    pub member_skus: Vec<String>,
    pub family_key: String,
    pub description: Option<String>,
    pub last_sync_run_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for MergedProduct {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            brand: row.brand,
            category: row.category,
            price: row.price,
            in_stock: row.in_stock,
            images: row.images,
            flavours: row.flavours,
            flavour_images: row.flavour_images.0,
            member_skus: row.member_skus,
            family_key: row.family_key,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored row carries a newer `updated_at`; nothing was written.
    SkippedNewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockApplyOutcome {
    Applied,
    /// No product has this SKU as its id or as a member SKU.
    UnknownSku,
    SkippedNewer,
}

/// Read-side filter for [`list_products`].
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive equality on `category`.
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// Inserts or updates a product keyed by `id`.
///
/// `product.updated_at` is the write timestamp. A stored row whose
/// `updated_at` is newer wins and the write is skipped. `created_at` is only
/// set on insert.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_product(
    pool: &PgPool,
    product: &MergedProduct,
    sync_run_id: Option<i64>,
) -> Result<UpsertOutcome, DbError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO catalog_products \
             (id, name, brand, category, price, in_stock, images, flavours, flavour_images, \
              member_skus, family_key, description, last_sync_run_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, \
             brand = EXCLUDED.brand, \
             category = EXCLUDED.category, \
             price = EXCLUDED.price, \
             in_stock = EXCLUDED.in_stock, \
             images = EXCLUDED.images, \
             flavours = EXCLUDED.flavours, \
             flavour_images = EXCLUDED.flavour_images, \
             member_skus = EXCLUDED.member_skus, \
             family_key = EXCLUDED.family_key, \
             description = EXCLUDED.description, \
             last_sync_run_id = EXCLUDED.last_sync_run_id, \
             updated_at = EXCLUDED.updated_at \
         WHERE catalog_products.updated_at <= EXCLUDED.updated_at \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.brand)
    .bind(&product.category)
    .bind(product.price)
    .bind(product.in_stock)
    .bind(&product.images)
    .bind(&product.flavours)
    .bind(Json(&product.flavour_images))
    .bind(&product.member_skus)
    .bind(&product.family_key)
    .bind(&product.description)
    .bind(sync_run_id)
    .bind(product.created_at)
    .bind(product.updated_at)
    .fetch_optional(pool)
    .await?;

    Ok(match inserted {
        Some(true) => UpsertOutcome::Inserted,
        Some(false) => UpsertOutcome::Updated,
        None => UpsertOutcome::SkippedNewer,
    })
}

/// Writes only the fields a stock signal carries onto the product whose id
/// is the signal SKU, or failing that, whose member SKUs contain it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a statement fails.
pub async fn apply_stock_signal(
    pool: &PgPool,
    signal: &StockSignal,
    observed_at: DateTime<Utc>,
) -> Result<StockApplyOutcome, DbError> {
    let Some(product_id) = resolve_sku(pool, &signal.sku).await? else {
        return Ok(StockApplyOutcome::UnknownSku);
    };

    let result = sqlx::query(
        "UPDATE catalog_products \
         SET price = COALESCE($2, price), \
             in_stock = COALESCE($3, in_stock), \
             updated_at = $4 \
         WHERE id = $1 AND updated_at <= $4",
    )
    .bind(&product_id)
    .bind(signal.price)
    .bind(signal.in_stock)
    .bind(observed_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(StockApplyOutcome::SkippedNewer);
    }
    Ok(StockApplyOutcome::Applied)
}

/// Deletes the product with id `id`; used when a product is absorbed into a
/// variant family.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn delete_product(pool: &PgPool, id: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM catalog_products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn resolve_sku(pool: &PgPool, sku: &str) -> Result<Option<String>, DbError> {
    let id = sqlx::query_scalar::<_, String>(
        "SELECT id FROM catalog_products \
         WHERE id = $1 OR $1 = ANY(member_skus) \
         ORDER BY (id = $1) DESC, id ASC \
         LIMIT 1",
    )
    .bind(sku)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------------

/// Fetches a product by id, falling back to a member-SKU match.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, sku: &str) -> Result<Option<MergedProduct>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM catalog_products \
         WHERE id = $1 OR $1 = ANY(member_skus) \
         ORDER BY (id = $1) DESC, id ASC \
         LIMIT 1"
    ))
    .bind(sku)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(MergedProduct::from))
}

/// Lists products ordered by `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    filter: &ProductFilter,
) -> Result<Vec<MergedProduct>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM catalog_products \
         WHERE ($1::TEXT IS NULL OR LOWER(category) = LOWER($1)) \
         ORDER BY id ASC"
    ))
    .bind(filter.category.as_deref())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(MergedProduct::from).collect())
}

/// Distinct categories, sorted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let categories = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT category FROM catalog_products ORDER BY category ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

/// Every SKU the catalog knows: product ids plus member SKUs, deduplicated
/// and sorted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn known_skus(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let skus = sqlx::query_scalar::<_, String>(
        "SELECT sku FROM ( \
             SELECT id AS sku FROM catalog_products \
             UNION \
             SELECT UNNEST(member_skus) AS sku FROM catalog_products \
         ) AS known \
         ORDER BY sku ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(skus)
}
