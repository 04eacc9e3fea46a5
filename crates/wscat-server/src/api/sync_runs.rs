use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wscat_core::{SyncRun, SyncRunType, TriggerSource};

use crate::middleware::RequestId;

use super::{map_db_error, map_sync_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SyncRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TriggerSyncRequest {
    #[serde(rename = "type")]
    pub run_type: SyncRunType,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    sync_run_id: Uuid,
    run_type: SyncRunType,
    trigger_source: TriggerSource,
    status: wscat_core::SyncRunStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    fetched_count: i32,
    upserted_count: i32,
    error_count: i32,
    skipped_count: i32,
    error_message: Option<String>,
}

impl From<SyncRun> for SyncRunItem {
    fn from(run: SyncRun) -> Self {
        Self {
            sync_run_id: run.public_id,
            run_type: run.run_type,
            trigger_source: run.trigger_source,
            status: run.status,
            started_at: run.started_at,
            completed_at: run.completed_at,
            fetched_count: run.fetched_count,
            upserted_count: run.upserted_count,
            error_count: run.error_count,
            skipped_count: run.skipped_count,
            error_message: run.error_message,
        }
    }
}

pub(super) async fn list_sync_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SyncRunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    let runs = state
        .store
        .list_sync_runs(normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = runs.into_iter().map(SyncRunItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// Starts a run in the background and answers with its `running` record.
pub(super) async fn trigger_sync_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TriggerSyncRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SyncRunItem>>), ApiError> {
    let run = state
        .sync
        .start(body.run_type, TriggerSource::Api)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    tracing::info!(run_id = run.id, run_type = %run.run_type, "sync run started via api");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(SyncRunItem::from(run), req_id.0)),
    ))
}
