//! Multi-request fetch loops for `SupplierClient`.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ScraperError;
use crate::pagination::extract_next_cursor;
use crate::types::{StockLevel, SupplierProduct};

use super::{SupplierClient, MAX_PAGES, STOCK_CHUNK_SIZE};

impl SupplierClient {
    /// Fetches every product page, following `Link` cursors until no
    /// `rel="next"` remains.
    ///
    /// With `updated_since`, products whose `updated_at` is older are dropped
    /// client-side as well, since not every supplier honours
    /// `updated_at_min`. Products without a timestamp are always kept.
    ///
    /// All-or-nothing: any page failure discards earlier pages and returns
    /// the error, so a run never treats a truncated catalog as complete.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Self::fetch_products_page`] and returns
    /// [`ScraperError::PaginationLimit`] past [`MAX_PAGES`] pages.
    pub async fn fetch_all_products(
        &self,
        base_url: &str,
        limit: u32,
        inter_request_delay_ms: u64,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SupplierProduct>, ScraperError> {
        let mut all_products: Vec<SupplierProduct> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_count = 0usize;

        loop {
            page_count += 1;
            if page_count > MAX_PAGES {
                return Err(ScraperError::PaginationLimit {
                    base_url: base_url.to_owned(),
                    max_pages: MAX_PAGES,
                });
            }

            if page_count > 1 && inter_request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(inter_request_delay_ms)).await;
            }

            let (response, link_header) = self
                .fetch_products_page(base_url, limit, cursor.as_deref(), updated_since)
                .await?;

            tracing::debug!(
                base_url,
                page = page_count,
                products = response.products.len(),
                "fetched supplier product page"
            );
            all_products.extend(response.products);

            cursor = extract_next_cursor(link_header.as_deref());
            if cursor.is_none() {
                break;
            }
        }

        if let Some(since) = updated_since {
            all_products.retain(|p| p.updated_at.is_none_or(|ts| ts >= since));
        }

        Ok(all_products)
    }

    /// Fetches stock levels for `skus` in chunks of [`STOCK_CHUNK_SIZE`].
    /// SKUs the supplier does not know are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Propagates the first failing chunk's error.
    pub async fn fetch_stock(
        &self,
        base_url: &str,
        skus: &[String],
        inter_request_delay_ms: u64,
    ) -> Result<Vec<StockLevel>, ScraperError> {
        let mut levels = Vec::with_capacity(skus.len());
        for (index, chunk) in skus.chunks(STOCK_CHUNK_SIZE).enumerate() {
            if index > 0 && inter_request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(inter_request_delay_ms)).await;
            }
            let response = self.fetch_stock_page(base_url, chunk).await?;
            levels.extend(response.stock);
        }
        Ok(levels)
    }
}
