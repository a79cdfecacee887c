use serde::{Deserialize, Serialize};

use crate::models::{QueryRecord, QueryState};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitQueryRequest {
    pub user_id: String,
    pub query_text: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitQueryResponse {
    pub query_id: String,
    pub create_time: i64,
}

/// Full status view of one query, as returned by the status endpoint.
#[derive(Debug, Serialize)]
pub struct QueryStatusDto {
    pub query_id: String,
    pub state: QueryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    pub create_time: i64,
}

impl From<QueryRecord> for QueryStatusDto {
    fn from(record: QueryRecord) -> Self {
        Self {
            query_id: record.query_id,
            state: record.state,
            answer_text: record.answer_text,
            error_message: record.error_message,
            sources: record.sources,
            create_time: record.create_time,
        }
    }
}

/// Compact row for per-user listings.
#[derive(Debug, Serialize)]
pub struct QuerySummaryDto {
    pub query_id: String,
    pub query_text: String,
    pub state: QueryState,
    pub create_time: i64,
}

impl From<QueryRecord> for QuerySummaryDto {
    fn from(record: QueryRecord) -> Self {
        Self {
            query_id: record.query_id,
            query_text: record.query_text,
            state: record.state,
            create_time: record.create_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryListResponse {
    pub queries: Vec<QuerySummaryDto>,
    pub page: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub pending_queries: u64,
    pub complete_queries: u64,
    pub failed_queries: u64,
}
