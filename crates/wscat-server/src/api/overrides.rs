use axum::{extract::State, Extension, Json};
use wscat_catalog::OverrideStatus;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState};

/// Refreshes the override cache if the feed changed, then reports its state.
pub(super) async fn override_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<OverrideStatus>> {
    let overrides = state.catalog.overrides();
    overrides.refresh_if_stale().await;
    Json(ApiResponse::new(overrides.status(), req_id.0))
}
