use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a submitted query.
///
/// `Pending` transitions exactly once to one of the terminal states;
/// terminal records are never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryState {
    Pending,
    Complete,
    Failed,
}

impl QueryState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Payload for the single pending -> terminal transition.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    Complete {
        answer_text: String,
        sources: Vec<String>,
    },
    Failed {
        error_message: String,
    },
}

impl TerminalOutcome {
    #[must_use]
    pub const fn state(&self) -> QueryState {
        match self {
            Self::Complete { .. } => QueryState::Complete,
            Self::Failed { .. } => QueryState::Failed,
        }
    }
}

/// One durable record per submitted query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub user_id: String,
    pub query_text: String,
    pub state: QueryState,
    pub answer_text: Option<String>,
    pub error_message: Option<String>,
    pub sources: Vec<String>,
    pub create_time: i64,
    pub ttl: i64,
}

impl QueryRecord {
    /// Builds a fresh `Pending` record with a generated id. The TTL
    /// is an absolute expiry timestamp derived from the retention
    /// window.
    #[must_use]
    pub fn new(user_id: &str, query_text: &str, retention_seconds: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            query_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            query_text: query_text.to_string(),
            state: QueryState::Pending,
            answer_text: None,
            error_message: None,
            sources: Vec::new(),
            create_time: now,
            ttl: now + retention_seconds,
        }
    }

    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.ttl <= now
    }
}

/// Sort direction for per-user listings. Newest-first is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListDirection {
    #[default]
    Desc,
    Asc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [QueryState::Pending, QueryState::Complete, QueryState::Failed] {
            assert_eq!(QueryState::parse(state.as_str()), Some(state));
        }
        assert_eq!(QueryState::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!QueryState::Pending.is_terminal());
        assert!(QueryState::Complete.is_terminal());
        assert!(QueryState::Failed.is_terminal());
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = QueryRecord::new("u1", "what is RAG?", 3600);
        assert_eq!(record.state, QueryState::Pending);
        assert!(record.answer_text.is_none());
        assert!(record.error_message.is_none());
        assert_eq!(record.ttl, record.create_time + 3600);
        assert!(!record.is_expired(record.create_time));
        assert!(record.is_expired(record.create_time + 3600));
    }
}
