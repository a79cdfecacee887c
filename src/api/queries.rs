use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::{
    ApiError, ApiResponse, AppState, NotificationEvent, QueryListResponse, QueryStatusDto,
    QuerySummaryDto, SubmitQueryRequest, SubmitQueryResponse,
};
use crate::models::{ListDirection, QueryRecord};

const MAX_PAGE_SIZE: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 50;

/// Submit path: write the `Pending` record, hand the id to the
/// dispatcher, return immediately. Never waits for the worker.
///
/// If dispatch fails after the record is written, the record is left
/// `Pending` until its TTL reclaims it; the caller gets a clear
/// dispatch failure instead of a phantom success.
pub async fn submit_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitQueryRequest>,
) -> Result<Json<ApiResponse<SubmitQueryResponse>>, ApiError> {
    let user_id = payload.user_id.trim();
    let query_text = payload.query_text.trim();

    if user_id.is_empty() {
        return Err(ApiError::validation("user_id must not be empty"));
    }
    if query_text.is_empty() {
        return Err(ApiError::validation("query_text must not be empty"));
    }

    let retention_seconds = state.config().read().await.retention.ttl_seconds();
    let record = QueryRecord::new(user_id, query_text, retention_seconds);

    state.store().create_query(&record).await?;
    state.dispatcher().dispatch(&record.query_id).await?;

    info!("Query {} submitted by {}", record.query_id, user_id);
    metrics::counter!("queries_submitted_total").increment(1);
    let _ = state.event_bus().send(NotificationEvent::QuerySubmitted {
        query_id: record.query_id.clone(),
        user_id: user_id.to_string(),
    });

    Ok(Json(ApiResponse::success(SubmitQueryResponse {
        query_id: record.query_id,
        create_time: record.create_time,
    })))
}

pub async fn get_query(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> Result<Json<ApiResponse<QueryStatusDto>>, ApiError> {
    let record = state.store().get_query(&query_id).await?;
    Ok(Json(ApiResponse::success(QueryStatusDto::from(record))))
}

#[derive(Debug, Deserialize)]
pub struct ListQueriesParams {
    pub user_id: String,
    #[serde(default)]
    pub direction: ListDirection,
    #[serde(default)]
    pub page: u64,
    pub limit: Option<u64>,
}

pub async fn list_queries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQueriesParams>,
) -> Result<Json<ApiResponse<QueryListResponse>>, ApiError> {
    if params.user_id.trim().is_empty() {
        return Err(ApiError::validation("user_id must not be empty"));
    }

    let page_size = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (records, total_pages) = state
        .store()
        .list_queries_by_user(&params.user_id, params.direction, params.page, page_size)
        .await?;

    let queries: Vec<QuerySummaryDto> = records.into_iter().map(QuerySummaryDto::from).collect();

    Ok(Json(ApiResponse::success(QueryListResponse {
        queries,
        page: params.page,
        total_pages,
    })))
}
