use async_trait::async_trait;
use ragarr::config::WorkerConfig;
use ragarr::db::Store;
use ragarr::engine::{AnswerEngine, EngineAnswer, EngineError};
use ragarr::models::{QueryRecord, QueryState};
use ragarr::worker::{ChannelDispatcher, DispatchError, Dispatcher, Worker};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Counts invocations so tests can prove the engine ran exactly once.
struct CountingEngine {
    calls: AtomicUsize,
    fail_with: Option<String>,
}

impl CountingEngine {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_with: None,
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_with: Some(message.to_string()),
        })
    }
}

#[async_trait]
impl AnswerEngine for CountingEngine {
    async fn answer(&self, query_text: &str) -> Result<EngineAnswer, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(EngineError::Api {
                status: 503,
                message: message.clone(),
            }),
            None => Ok(EngineAnswer {
                answer_text: format!("answer to: {query_text}"),
                sources: vec!["doc-7".to_string()],
            }),
        }
    }
}

async fn setup(engine: Arc<CountingEngine>) -> (Store, Worker) {
    let store = Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("Failed to open in-memory store");
    let (event_bus, _) = broadcast::channel(16);
    let worker = Worker::new(
        store.clone(),
        engine,
        event_bus,
        &WorkerConfig::default(),
    );
    (store, worker)
}

#[tokio::test]
async fn test_process_completes_pending_query() {
    let engine = CountingEngine::succeeding();
    let (store, worker) = setup(Arc::clone(&engine)).await;

    let record = QueryRecord::new("u1", "what is RAG?", 3600);
    store.create_query(&record).await.unwrap();

    worker.process(&record.query_id).await.unwrap();

    let loaded = store.get_query(&record.query_id).await.unwrap();
    assert_eq!(loaded.state, QueryState::Complete);
    assert_eq!(loaded.answer_text.as_deref(), Some("answer to: what is RAG?"));
    assert_eq!(loaded.sources, vec!["doc-7".to_string()]);
    assert!(loaded.error_message.is_none());
}

#[tokio::test]
async fn test_duplicate_delivery_is_a_noop() {
    let engine = CountingEngine::succeeding();
    let (store, worker) = setup(Arc::clone(&engine)).await;

    let record = QueryRecord::new("u1", "asked once", 3600);
    store.create_query(&record).await.unwrap();

    worker.process(&record.query_id).await.unwrap();
    worker.process(&record.query_id).await.unwrap();

    // Second delivery returned before ever touching the engine.
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

    let loaded = store.get_query(&record.query_id).await.unwrap();
    assert_eq!(loaded.state, QueryState::Complete);
}

#[tokio::test]
async fn test_engine_failure_is_recorded() {
    let engine = CountingEngine::failing("timeout contacting model");
    let (store, worker) = setup(Arc::clone(&engine)).await;

    let record = QueryRecord::new("u1", "doomed", 3600);
    store.create_query(&record).await.unwrap();

    worker.process(&record.query_id).await.unwrap();

    let loaded = store.get_query(&record.query_id).await.unwrap();
    assert_eq!(loaded.state, QueryState::Failed);
    assert!(
        loaded
            .error_message
            .as_deref()
            .unwrap()
            .contains("timeout contacting model")
    );
    assert!(loaded.answer_text.is_none());

    // A failed query stays failed; re-delivery does not rerun it.
    worker.process(&record.query_id).await.unwrap();
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_process_unknown_id_is_fatal_noop() {
    let engine = CountingEngine::succeeding();
    let (_store, worker) = setup(Arc::clone(&engine)).await;

    // Nothing to do, nothing to retry.
    worker.process("missing").await.unwrap();
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dispatcher_rejects_when_queue_full() {
    let (dispatcher, _rx) = ChannelDispatcher::new(1);

    dispatcher.dispatch("q1").await.unwrap();
    let err = dispatcher.dispatch("q2").await.unwrap_err();
    assert!(matches!(err, DispatchError::QueueFull));
}

#[tokio::test]
async fn test_dispatcher_rejects_when_worker_gone() {
    let (dispatcher, rx) = ChannelDispatcher::new(4);
    drop(rx);

    let err = dispatcher.dispatch("q1").await.unwrap_err();
    assert!(matches!(err, DispatchError::WorkerGone));
}

#[tokio::test]
async fn test_worker_loop_drains_dispatched_jobs() {
    let engine = CountingEngine::succeeding();
    let (store, worker) = setup(Arc::clone(&engine)).await;

    let record = QueryRecord::new("u1", "via the queue", 3600);
    store.create_query(&record).await.unwrap();

    let (dispatcher, rx) = ChannelDispatcher::new(4);
    let handle = tokio::spawn(Arc::new(worker).run(rx));

    dispatcher.dispatch(&record.query_id).await.unwrap();

    let mut state = QueryState::Pending;
    for _ in 0..100 {
        state = store.get_query(&record.query_id).await.unwrap().state;
        if state.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(state, QueryState::Complete);

    drop(dispatcher);
    handle.await.unwrap();
}
