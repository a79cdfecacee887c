use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc};

use crate::api::NotificationEvent;
use crate::config::Config;
use crate::db::Store;
use crate::engine::{AnswerEngine, HttpAnswerEngine};
use crate::worker::{ChannelDispatcher, Dispatcher, QueryJob, Worker};

/// Everything a handler invocation needs, injected explicitly. No
/// invocation owns mutable state of its own; the store is the only
/// coordination point.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub engine: Arc<dyn AnswerEngine>,

    pub dispatcher: Arc<dyn Dispatcher>,

    pub event_bus: broadcast::Sender<NotificationEvent>,
}

impl SharedState {
    /// Wires up the production engine. Returns the dispatch receiver
    /// so the caller decides where the worker loop runs.
    pub async fn new(config: Config) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<QueryJob>)> {
        let engine: Arc<dyn AnswerEngine> = Arc::new(HttpAnswerEngine::from_config(&config.engine)?);
        Self::with_engine(config, engine).await
    }

    /// Same wiring with a caller-supplied engine; tests use this to
    /// script answers without a network.
    pub async fn with_engine(
        config: Config,
        engine: Arc<dyn AnswerEngine>,
    ) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<QueryJob>)> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size);
        let (dispatcher, rx) = ChannelDispatcher::new(config.worker.queue_capacity);

        let state = Arc::new(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            engine,
            dispatcher: Arc::new(dispatcher),
            event_bus,
        });

        Ok((state, rx))
    }

    /// Spawns the worker loop draining `rx`.
    pub async fn start_worker(
        self: &Arc<Self>,
        rx: mpsc::Receiver<QueryJob>,
    ) -> tokio::task::JoinHandle<()> {
        let worker_config = self.config.read().await.worker.clone();
        let worker = Arc::new(Worker::new(
            self.store.clone(),
            Arc::clone(&self.engine),
            self.event_bus.clone(),
            &worker_config,
        ));
        tokio::spawn(worker.run(rx))
    }
}
