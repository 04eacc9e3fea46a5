use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use wscat_catalog::{ProductPage, ProductQuery};
use wscat_core::MergedProduct;

use crate::middleware::RequestId;

use super::{map_query_error, ApiError, ApiResponse, AppState};

/// Query string of `GET /api/v1/products`. Prices arrive as text so a bad
/// value produces the JSON error envelope instead of a bare rejection.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort: Option<String>,
}

fn parse_price(
    request_id: &str,
    field: &str,
    value: Option<&str>,
) -> Result<Option<Decimal>, ApiError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match Decimal::from_str(raw) {
        Ok(price) if price >= Decimal::ZERO => Ok(Some(price)),
        _ => Err(ApiError::new(
            request_id,
            "validation_error",
            format!("{field} must be a non-negative decimal, got {raw:?}"),
        )),
    }
}

impl ProductListQuery {
    fn into_product_query(self, request_id: &str) -> Result<ProductQuery, ApiError> {
        Ok(ProductQuery {
            min_price: parse_price(request_id, "min_price", self.min_price.as_deref())?,
            max_price: parse_price(request_id, "max_price", self.max_price.as_deref())?,
            page: self.page,
            page_size: self.page_size,
            category: self.category,
            search: self.search,
            sort: self.sort,
        })
    }
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<ProductPage>>, ApiError> {
    let query = query.into_product_query(&req_id.0)?;
    let page = state
        .catalog
        .query_products(&query)
        .await
        .map_err(|e| map_query_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(page, req_id.0)))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MergedProduct>>, ApiError> {
    let product = state
        .catalog
        .get_product_by_id(&id)
        .await
        .map_err(|e| map_query_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("product {id} not found"),
            )
        })?;

    Ok(Json(ApiResponse::new(product, req_id.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_prices_are_absent() {
        assert_eq!(parse_price("r", "min_price", Some("  ")).unwrap(), None);
        assert_eq!(parse_price("r", "min_price", None).unwrap(), None);
    }

    #[test]
    fn prices_parse_as_decimals() {
        let query = ProductListQuery {
            min_price: Some("4.50".to_string()),
            max_price: Some("20".to_string()),
            ..ProductListQuery::default()
        }
        .into_product_query("r")
        .unwrap();
        assert_eq!(query.min_price, Some(Decimal::new(450, 2)));
        assert_eq!(query.max_price, Some(Decimal::from(20)));
    }

    #[test]
    fn negative_or_garbled_prices_are_validation_errors() {
        for bad in ["-1", "cheap", "£5"] {
            let err = parse_price("req-9", "max_price", Some(bad)).unwrap_err();
            assert_eq!(err.error.code, "validation_error");
            assert!(err.error.message.starts_with("max_price"));
            assert_eq!(err.meta.request_id, "req-9");
        }
    }
}
