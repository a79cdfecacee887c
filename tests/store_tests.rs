use chrono::Utc;
use futures::TryStreamExt;
use ragarr::config::{GeneralConfig, RetentionConfig};
use ragarr::db::{Store, StoreError};
use ragarr::models::{ListDirection, QueryRecord, QueryState, TerminalOutcome};
use ragarr::scheduler::Scheduler;
use uuid::Uuid;

async fn memory_store() -> Store {
    Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("Failed to open in-memory store")
}

fn record_for(user_id: &str, query_text: &str) -> QueryRecord {
    QueryRecord::new(user_id, query_text, 3600)
}

#[tokio::test]
async fn test_create_and_get_round_trip() {
    let store = memory_store().await;

    let record = record_for("u1", "what is RAG?");
    store.create_query(&record).await.unwrap();

    let loaded = store.get_query(&record.query_id).await.unwrap();
    assert_eq!(loaded.query_id, record.query_id);
    assert_eq!(loaded.state, QueryState::Pending);
    assert_eq!(loaded.query_text, "what is RAG?");
    assert!(loaded.answer_text.is_none());
    assert!(loaded.error_message.is_none());
}

#[tokio::test]
async fn test_default_database_path_opens_file_store() {
    let default_url = GeneralConfig::default().database_path;
    let file = default_url
        .strip_prefix("sqlite:")
        .expect("default database path must carry the sqlite scheme");

    let dir = std::env::temp_dir().join(format!("ragarr-store-{}", Uuid::new_v4()));
    let url = format!("sqlite:{}", dir.join(file).display());

    let store = Store::new(&url).await.unwrap();

    let record = record_for("u1", "survives a file-backed store");
    store.create_query(&record).await.unwrap();

    let loaded = store.get_query(&record.query_id).await.unwrap();
    assert_eq!(loaded.query_text, "survives a file-backed store");

    drop(store);
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_duplicate_id_conflicts() {
    let store = memory_store().await;

    let record = record_for("u1", "once");
    store.create_query(&record).await.unwrap();

    let err = store.create_query(&record).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_terminal_update_is_compare_and_set() {
    let store = memory_store().await;

    let record = record_for("u1", "race me");
    store.create_query(&record).await.unwrap();

    store
        .finish_query(
            &record.query_id,
            &TerminalOutcome::Complete {
                answer_text: "first result".to_string(),
                sources: vec!["doc-1".to_string()],
            },
        )
        .await
        .unwrap();

    // A late duplicate delivery must not overwrite the first result.
    let err = store
        .finish_query(
            &record.query_id,
            &TerminalOutcome::Failed {
                error_message: "late failure".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)));

    let loaded = store.get_query(&record.query_id).await.unwrap();
    assert_eq!(loaded.state, QueryState::Complete);
    assert_eq!(loaded.answer_text.as_deref(), Some("first result"));
    assert_eq!(loaded.sources, vec!["doc-1".to_string()]);
    assert!(loaded.error_message.is_none());
}

#[tokio::test]
async fn test_finish_unknown_id_is_not_found() {
    let store = memory_store().await;

    let err = store
        .finish_query(
            "missing",
            &TerminalOutcome::Failed {
                error_message: "whatever".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_expired_records_are_invisible() {
    let store = memory_store().await;

    let mut expired = record_for("u1", "old news");
    expired.create_time = Utc::now().timestamp() - 7200;
    expired.ttl = Utc::now().timestamp() - 3600;
    store.create_query(&expired).await.unwrap();

    let fresh = record_for("u1", "still valid");
    store.create_query(&fresh).await.unwrap();

    let err = store.get_query(&expired.query_id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let (records, _) = store
        .list_queries_by_user("u1", ListDirection::Desc, 0, 50)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].query_id, fresh.query_id);

    // The expired row still physically exists until purged.
    let purged = store
        .purge_expired_queries(Utc::now().timestamp())
        .await
        .unwrap();
    assert_eq!(purged, 1);

    let purged_again = store
        .purge_expired_queries(Utc::now().timestamp())
        .await
        .unwrap();
    assert_eq!(purged_again, 0);

    assert!(store.get_query(&fresh.query_id).await.is_ok());
}

#[tokio::test]
async fn test_list_orders_and_paginates() {
    let store = memory_store().await;

    let base = Utc::now().timestamp();
    for i in 0..5 {
        let mut record = record_for("u1", &format!("query {i}"));
        record.create_time = base - 100 + i;
        record.ttl = base + 3600;
        store.create_query(&record).await.unwrap();
    }

    let (page0, total_pages) = store
        .list_queries_by_user("u1", ListDirection::Desc, 0, 2)
        .await
        .unwrap();
    assert_eq!(total_pages, 3);
    assert_eq!(page0.len(), 2);
    assert_eq!(page0[0].query_text, "query 4");
    assert_eq!(page0[1].query_text, "query 3");

    let (page2, _) = store
        .list_queries_by_user("u1", ListDirection::Desc, 2, 2)
        .await
        .unwrap();
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0].query_text, "query 0");

    let (ascending, _) = store
        .list_queries_by_user("u1", ListDirection::Asc, 0, 50)
        .await
        .unwrap();
    assert_eq!(ascending[0].query_text, "query 0");
    assert_eq!(ascending[4].query_text, "query 4");
}

#[tokio::test]
async fn test_stream_walks_all_pages_in_order() {
    let store = memory_store().await;

    let base = Utc::now().timestamp();
    for i in 0..7 {
        let mut record = record_for("u1", &format!("query {i}"));
        record.create_time = base - 100 + i;
        record.ttl = base + 3600;
        store.create_query(&record).await.unwrap();
    }

    let records: Vec<_> = store
        .stream_queries_by_user("u1", ListDirection::Desc, 3)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(records.len(), 7);
    let times: Vec<i64> = records.iter().map(|r| r.create_time).collect();
    assert!(times.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_scheduler_purge_pass_reclaims_only_expired() {
    let store = memory_store().await;

    let mut expired = record_for("u1", "stale");
    expired.create_time = Utc::now().timestamp() - 7200;
    expired.ttl = Utc::now().timestamp() - 3600;
    store.create_query(&expired).await.unwrap();

    let fresh = record_for("u1", "current");
    store.create_query(&fresh).await.unwrap();

    let scheduler = Scheduler::new(store.clone(), RetentionConfig::default());
    let purged = scheduler.run_once().await.unwrap();
    assert_eq!(purged, 1);

    assert!(store.get_query(&fresh.query_id).await.is_ok());
}

#[tokio::test]
async fn test_count_by_state() {
    let store = memory_store().await;

    let a = record_for("u1", "a");
    let b = record_for("u1", "b");
    store.create_query(&a).await.unwrap();
    store.create_query(&b).await.unwrap();

    store
        .finish_query(
            &a.query_id,
            &TerminalOutcome::Failed {
                error_message: "boom".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        store.count_queries_by_state(QueryState::Pending).await.unwrap(),
        1
    );
    assert_eq!(
        store.count_queries_by_state(QueryState::Failed).await.unwrap(),
        1
    );
    assert_eq!(
        store
            .count_queries_by_state(QueryState::Complete)
            .await
            .unwrap(),
        0
    );
}
