use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, SystemStatus};
use crate::models::QueryState;

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatus>>, ApiError> {
    let store = state.store();

    let pending = store.count_queries_by_state(QueryState::Pending).await?;
    let complete = store.count_queries_by_state(QueryState::Complete).await?;
    let failed = store.count_queries_by_state(QueryState::Failed).await?;

    Ok(Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        pending_queries: pending,
        complete_queries: complete,
        failed_queries: failed,
    })))
}
