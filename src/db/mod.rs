use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::models::{ListDirection, QueryRecord, QueryState, TerminalOutcome};

pub mod error;
pub mod migrator;
pub mod repositories;

pub use error::StoreError;

/// Durable home of every query record. All handler coordination goes
/// through here; there is no other shared state between invocations.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    fn query_repo(&self) -> repositories::query::QueryRepository {
        repositories::query::QueryRepository::new(self.conn.clone())
    }

    /// Writes a fresh `Pending` record. `Conflict` on duplicate id.
    pub async fn create_query(&self, record: &QueryRecord) -> Result<(), StoreError> {
        self.query_repo().create(record).await
    }

    /// `NotFound` covers both unknown and expired ids.
    pub async fn get_query(&self, query_id: &str) -> Result<QueryRecord, StoreError> {
        self.query_repo().get(query_id).await
    }

    /// Conditional pending -> terminal transition (compare-and-set).
    pub async fn finish_query(
        &self,
        query_id: &str,
        outcome: &TerminalOutcome,
    ) -> Result<(), StoreError> {
        self.query_repo().finish(query_id, outcome).await
    }

    pub async fn list_queries_by_user(
        &self,
        user_id: &str,
        direction: ListDirection,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<QueryRecord>, u64), StoreError> {
        self.query_repo()
            .list_by_user(user_id, direction, page, page_size)
            .await
    }

    /// A user's queries as one lazy ordered stream; pages are fetched
    /// on demand so the caller never holds more than one page.
    pub fn stream_queries_by_user(
        &self,
        user_id: &str,
        direction: ListDirection,
        page_size: u64,
    ) -> impl futures::Stream<Item = Result<QueryRecord, StoreError>> + Send + use<> {
        let store = self.clone();
        let user_id = user_id.to_string();

        futures::stream::try_unfold(
            (store, user_id, 0u64, VecDeque::<QueryRecord>::new(), false),
            move |(store, user_id, mut page, mut buffer, mut exhausted)| async move {
                loop {
                    if let Some(record) = buffer.pop_front() {
                        return Ok(Some((record, (store, user_id, page, buffer, exhausted))));
                    }
                    if exhausted {
                        return Ok(None);
                    }

                    let (rows, total_pages) = store
                        .query_repo()
                        .list_by_user(&user_id, direction, page, page_size)
                        .await?;
                    page += 1;
                    exhausted = rows.is_empty() || page >= total_pages;
                    buffer.extend(rows);
                }
            },
        )
    }

    pub async fn count_queries_by_state(&self, state: QueryState) -> Result<u64, StoreError> {
        self.query_repo().count_by_state(state).await
    }

    pub async fn purge_expired_queries(&self, now: i64) -> Result<u64, StoreError> {
        self.query_repo().purge_expired(now).await
    }
}
