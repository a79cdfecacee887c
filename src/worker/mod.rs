//! Asynchronous side of the system: the dispatch boundary the
//! front door publishes into, and the worker that drains it.
//!
//! Delivery is at-least-once from the worker's point of view (a retry
//! may re-enqueue an id that already finished), so `process` is
//! idempotent: the store's compare-and-set terminal update makes the
//! second delivery a no-op instead of an overwrite.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::api::NotificationEvent;
use crate::config::WorkerConfig;
use crate::db::{Store, StoreError};
use crate::engine::AnswerEngine;
use crate::models::TerminalOutcome;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker queue is full")]
    QueueFull,

    #[error("worker is not running")]
    WorkerGone,
}

/// One unit of asynchronous work: "process this query id". The id is
/// the entire payload; everything else lives in the record store.
#[derive(Debug, Clone)]
pub struct QueryJob {
    pub query_id: String,
}

/// Fire-and-forget trigger for asynchronous query processing.
/// Returns as soon as the job is accepted; never waits for completion.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, query_id: &str) -> Result<(), DispatchError>;
}

/// In-process dispatcher over a bounded mpsc channel.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<QueryJob>,
}

impl ChannelDispatcher {
    #[must_use]
    pub fn new(queue_capacity: usize) -> (Self, mpsc::Receiver<QueryJob>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn dispatch(&self, query_id: &str) -> Result<(), DispatchError> {
        self.tx
            .try_send(QueryJob {
                query_id: query_id.to_string(),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::WorkerGone,
            })
    }
}

// ============================================================================
// Worker
// ============================================================================

pub struct Worker {
    store: Store,
    engine: Arc<dyn AnswerEngine>,
    event_bus: broadcast::Sender<NotificationEvent>,
    retry_limit: u32,
    retry_delay: Duration,
}

impl Worker {
    #[must_use]
    pub fn new(
        store: Store,
        engine: Arc<dyn AnswerEngine>,
        event_bus: broadcast::Sender<NotificationEvent>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            event_bus,
            retry_limit: config.update_retry_limit,
            retry_delay: Duration::from_millis(config.update_retry_delay_ms),
        }
    }

    /// Drains the dispatch queue until all senders are gone. Each job
    /// runs in its own task; jobs never share state except the store.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<QueryJob>) {
        info!("Worker loop started");
        while let Some(job) = rx.recv().await {
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                worker.handle(job).await;
            });
        }
        info!("Worker loop stopped");
    }

    async fn handle(&self, job: QueryJob) {
        let mut attempt = 0u32;
        loop {
            match self.process(&job.query_id).await {
                Ok(()) => return,
                Err(e) if e.is_retryable() && attempt < self.retry_limit => {
                    attempt += 1;
                    warn!(
                        "Processing query {} failed (attempt {}/{}): {}",
                        job.query_id, attempt, self.retry_limit, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!("Giving up on query {}: {}", job.query_id, e);
                    return;
                }
            }
        }
    }

    /// Processes one query end to end. Safe to call any number of
    /// times for the same id; only the first caller's result sticks.
    ///
    /// The only error returned is a store outage during the terminal
    /// write, which the caller's retry policy re-attempts. Engine
    /// failures are recorded in the record itself, never surfaced.
    pub async fn process(&self, query_id: &str) -> Result<(), StoreError> {
        let record = match self.store.get_query(query_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                warn!("Dispatched query {} no longer exists, skipping", query_id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if record.state.is_terminal() {
            debug!("Query {} already terminal, duplicate delivery", query_id);
            return Ok(());
        }

        let outcome = match self.engine.answer(&record.query_text).await {
            Ok(answer) => TerminalOutcome::Complete {
                answer_text: answer.answer_text,
                sources: answer.sources,
            },
            Err(e) => {
                warn!("Engine failed for query {}: {}", query_id, e);
                TerminalOutcome::Failed {
                    error_message: e.to_string(),
                }
            }
        };

        match self.store.finish_query(query_id, &outcome).await {
            Ok(()) => {
                match &outcome {
                    TerminalOutcome::Complete { .. } => {
                        info!("Query {} complete", query_id);
                        metrics::counter!("queries_completed_total").increment(1);
                        let _ = self.event_bus.send(NotificationEvent::QueryCompleted {
                            query_id: query_id.to_string(),
                        });
                    }
                    TerminalOutcome::Failed { error_message } => {
                        metrics::counter!("queries_failed_total").increment(1);
                        let _ = self.event_bus.send(NotificationEvent::QueryFailed {
                            query_id: query_id.to_string(),
                            error_message: error_message.clone(),
                        });
                    }
                }
                Ok(())
            }
            // Another delivery won the race; its result stands.
            Err(StoreError::InvalidTransition(_)) => {
                debug!("Query {} finished by a concurrent delivery", query_id);
                Ok(())
            }
            // Record expired between the read and the write.
            Err(StoreError::NotFound(_)) => {
                warn!("Query {} expired before its result was written", query_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
