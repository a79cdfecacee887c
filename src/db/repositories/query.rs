use crate::db::error::StoreError;
use crate::entities::{prelude::*, query_records};
use crate::models::{ListDirection, QueryRecord, QueryState, TerminalOutcome};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use tracing::info;

/// Repository for query record operations.
///
/// The conditional terminal update here is the only synchronization
/// primitive in the system; every read excludes rows past their TTL
/// even when they have not been physically reclaimed yet.
pub struct QueryRepository {
    conn: DatabaseConnection,
}

impl QueryRepository {
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Model Conversion Helpers
    // ========================================================================

    fn map_record(m: query_records::Model) -> Result<QueryRecord, StoreError> {
        let state = QueryState::parse(&m.state).ok_or_else(|| {
            StoreError::Unavailable(DbErr::Custom(format!(
                "query {} has unknown state '{}'",
                m.query_id, m.state
            )))
        })?;

        let sources = match m.sources.as_deref() {
            Some(raw) => serde_json::from_str(raw).unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(QueryRecord {
            query_id: m.query_id,
            user_id: m.user_id,
            query_text: m.query_text,
            state,
            answer_text: m.answer_text,
            error_message: m.error_message,
            sources,
            create_time: m.create_time,
            ttl: m.ttl,
        })
    }

    // ========================================================================
    // Query Record Operations
    // ========================================================================

    pub async fn create(&self, record: &QueryRecord) -> Result<(), StoreError> {
        let sources = if record.sources.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.sources).unwrap_or_default())
        };

        let active_model = query_records::ActiveModel {
            query_id: Set(record.query_id.clone()),
            user_id: Set(record.user_id.clone()),
            query_text: Set(record.query_text.clone()),
            state: Set(record.state.as_str().to_string()),
            answer_text: Set(record.answer_text.clone()),
            error_message: Set(record.error_message.clone()),
            sources: Set(sources),
            create_time: Set(record.create_time),
            ttl: Set(record.ttl),
        };

        match QueryRecords::insert(active_model).exec(&self.conn).await {
            Ok(_) => Ok(()),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(StoreError::Conflict(record.query_id.clone()))
                }
                _ => Err(StoreError::Unavailable(e)),
            },
        }
    }

    pub async fn get(&self, query_id: &str) -> Result<QueryRecord, StoreError> {
        let now = Utc::now().timestamp();

        let row = QueryRecords::find()
            .filter(query_records::Column::QueryId.eq(query_id))
            .filter(query_records::Column::Ttl.gt(now))
            .one(&self.conn)
            .await?;

        row.map_or_else(
            || Err(StoreError::NotFound(query_id.to_string())),
            Self::map_record,
        )
    }

    /// Compare-and-set transition from `pending` to a terminal state.
    ///
    /// A single conditional UPDATE guards against duplicate worker
    /// deliveries: the second writer matches zero rows and gets
    /// `InvalidTransition` instead of overwriting the first result.
    pub async fn finish(
        &self,
        query_id: &str,
        outcome: &TerminalOutcome,
    ) -> Result<(), StoreError> {
        let mut update = QueryRecords::update_many()
            .col_expr(
                query_records::Column::State,
                Expr::value(outcome.state().as_str()),
            )
            .filter(query_records::Column::QueryId.eq(query_id))
            .filter(query_records::Column::State.eq(QueryState::Pending.as_str()));

        update = match outcome {
            TerminalOutcome::Complete {
                answer_text,
                sources,
            } => {
                let sources_json = if sources.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(sources).unwrap_or_default())
                };
                update
                    .col_expr(
                        query_records::Column::AnswerText,
                        Expr::value(answer_text.clone()),
                    )
                    .col_expr(query_records::Column::Sources, Expr::value(sources_json))
            }
            TerminalOutcome::Failed { error_message } => update.col_expr(
                query_records::Column::ErrorMessage,
                Expr::value(error_message.clone()),
            ),
        };

        let result = update.exec(&self.conn).await?;

        if result.rows_affected > 0 {
            return Ok(());
        }

        // Zero rows matched: either the record is already terminal or
        // it never existed. Distinguish for the caller.
        let exists = QueryRecords::find()
            .filter(query_records::Column::QueryId.eq(query_id))
            .one(&self.conn)
            .await?;

        match exists {
            Some(_) => Err(StoreError::InvalidTransition(query_id.to_string())),
            None => Err(StoreError::NotFound(query_id.to_string())),
        }
    }

    /// One page of a user's queries ordered by creation time.
    /// Returns the rows plus the total page count.
    pub async fn list_by_user(
        &self,
        user_id: &str,
        direction: ListDirection,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<QueryRecord>, u64), StoreError> {
        let now = Utc::now().timestamp();

        let mut find = QueryRecords::find()
            .filter(query_records::Column::UserId.eq(user_id))
            .filter(query_records::Column::Ttl.gt(now));

        find = match direction {
            ListDirection::Desc => find
                .order_by_desc(query_records::Column::CreateTime)
                .order_by_desc(query_records::Column::QueryId),
            ListDirection::Asc => find
                .order_by_asc(query_records::Column::CreateTime)
                .order_by_asc(query_records::Column::QueryId),
        };

        let paginator = find.paginate(&self.conn, page_size.max(1));
        let total_pages = paginator.num_pages().await?;
        let rows = paginator.fetch_page(page).await?;

        let records = rows
            .into_iter()
            .map(Self::map_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((records, total_pages))
    }

    pub async fn count_by_state(&self, state: QueryState) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp();

        let count = QueryRecords::find()
            .filter(query_records::Column::State.eq(state.as_str()))
            .filter(query_records::Column::Ttl.gt(now))
            .count(&self.conn)
            .await?;

        Ok(count)
    }

    /// Physically reclaims rows past their TTL. Reads already exclude
    /// them; this just keeps the table from growing without bound.
    pub async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let result = QueryRecords::delete_many()
            .filter(query_records::Column::Ttl.lte(now))
            .exec(&self.conn)
            .await?;

        if result.rows_affected > 0 {
            info!("Purged {} expired query records", result.rows_affected);
        }

        Ok(result.rows_affected)
    }
}
