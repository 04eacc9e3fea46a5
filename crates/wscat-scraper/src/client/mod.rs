//! HTTP client for the supplier storefront (`products.json`, `stock.json`).

mod fetch_all;

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::error::ScraperError;
use crate::retry::retry_with_backoff;
use crate::types::{StockResponse, SupplierProductsResponse};

/// Maximum number of pages to fetch before returning an error.
/// Guards against suppliers whose cursors cycle.
///
/// Each page may be retried up to `max_retries` times, so the worst-case
/// request count is `MAX_PAGES * (1 + max_retries)`.
pub(super) const MAX_PAGES: usize = 200;

/// SKUs per `stock.json` request; keeps the query string well under common
/// URL length limits.
pub(super) const STOCK_CHUNK_SIZE: usize = 50;

/// HTTP client for one supplier storefront.
///
/// 429 and 404 map to typed errors, other non-2xx statuses to
/// [`ScraperError::UnexpectedStatus`]. Transient failures (429, 5xx, network)
/// are retried with exponential back-off up to `max_retries` extra attempts.
pub struct SupplierClient {
    pub(super) client: Client,
    pub(super) max_retries: u32,
    /// Base delay for back-off: the n-th retry waits `backoff_base_ms * 2^(n-1)`.
    pub(super) backoff_base_ms: u64,
}

impl SupplierClient {
    /// Creates a client with the configured timeout, `User-Agent` and retry
    /// policy. `max_retries = 0` disables retries.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_ms,
        })
    }

    /// Fetches one page of products, returning it with the raw `Link` header.
    ///
    /// `updated_since` is forwarded as `updated_at_min`; suppliers that ignore
    /// it return everything and the caller filters.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`]: HTTP 429 after all retries.
    /// - [`ScraperError::NotFound`]: HTTP 404 (not retried).
    /// - [`ScraperError::UnexpectedStatus`]: other non-2xx (5xx retried).
    /// - [`ScraperError::Http`]: network or TLS failure after all retries.
    /// - [`ScraperError::Deserialize`]: body is not the expected JSON.
    /// - [`ScraperError::InvalidBaseUrl`]: `base_url` is not an http(s) URL.
    pub async fn fetch_products_page(
        &self,
        base_url: &str,
        limit: u32,
        page_info: Option<&str>,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<(SupplierProductsResponse, Option<String>), ScraperError> {
        let limit = limit.to_string();
        let since = updated_since.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true));

        let mut params: Vec<(&str, &str)> = vec![("limit", &limit)];
        if let Some(since) = since.as_deref() {
            params.push(("updated_at_min", since));
        }
        if let Some(cursor) = page_info {
            params.push(("page_info", cursor));
        }

        let url = Self::endpoint_url(base_url, "products.json", &params)?;
        self.get_json(url, format!("products page from {base_url}"))
            .await
    }

    /// Fetches current price/stock for one chunk of SKUs.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fetch_products_page`].
    pub async fn fetch_stock_page(
        &self,
        base_url: &str,
        skus: &[String],
    ) -> Result<StockResponse, ScraperError> {
        let joined = skus.join(",");
        let url = Self::endpoint_url(base_url, "stock.json", &[("skus", &joined)])?;
        let (response, _) = self
            .get_json(url, format!("stock levels from {base_url}"))
            .await?;
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        context: String,
    ) -> Result<(T, Option<String>), ScraperError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let url = url.clone();
            let context = context.clone();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await?;
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .unwrap_or(60);
                    return Err(ScraperError::RateLimited {
                        domain: host_of(&url),
                        retry_after_secs,
                    });
                }

                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(ScraperError::NotFound { url });
                }

                if !status.is_success() {
                    return Err(ScraperError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }

                // Link header must be read before the body consumes the response.
                let link_header = response
                    .headers()
                    .get(reqwest::header::LINK)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);

                let body = response.text().await?;
                let parsed = serde_json::from_str::<T>(&body)
                    .map_err(|source| ScraperError::Deserialize { context, source })?;

                Ok((parsed, link_header))
            }
        })
        .await
    }

    /// Builds `{base_url}/{path}?{params}`, keeping any path prefix on the
    /// base URL (`https://host/api/v2` → `https://host/api/v2/products.json`).
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidBaseUrl`] when `base_url` does not parse
    /// or is not http(s).
    fn endpoint_url(
        base_url: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<String, ScraperError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let mut url = Url::parse(&format!("{trimmed}/{path}")).map_err(|e| {
            ScraperError::InvalidBaseUrl {
                base_url: base_url.to_owned(),
                reason: e.to_string(),
            }
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScraperError::InvalidBaseUrl {
                base_url: base_url.to_owned(),
                reason: format!("unsupported scheme \"{}\"", url.scheme()),
            });
        }

        url.set_query(None);
        url.set_fragment(None);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter().copied());
        }
        Ok(url.to_string())
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}
