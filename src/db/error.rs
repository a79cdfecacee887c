use thiserror::Error;

/// Typed failures for query record operations.
///
/// `NotFound` and `InvalidTransition` are expected under normal
/// operation (expired reads, duplicate worker deliveries) and are
/// handled locally by callers; `Unavailable` is the only variant that
/// represents a real infrastructure fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query {0} not found")]
    NotFound(String),

    #[error("query {0} already exists")]
    Conflict(String),

    #[error("query {0} is already terminal")]
    InvalidTransition(String),

    #[error("store unavailable: {0}")]
    Unavailable(#[from] sea_orm::DbErr),
}

impl StoreError {
    /// True for errors a retry loop should re-attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
