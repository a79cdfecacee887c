pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod worker;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
pub use config::Config;
use db::Store;
use models::{ListDirection, QueryRecord, QueryState};
use scheduler::Scheduler;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use worker::Worker;

#[derive(Parser)]
#[command(name = "ragarr")]
#[command(author, version, about = "Asynchronous RAG query service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server, worker and purge scheduler
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Submit a query against the local store and answer it inline
    #[command(alias = "s")]
    Submit {
        /// Submitting user id
        user_id: String,
        /// Query text
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Show the current state of a query
    Status {
        /// Query id returned at submission
        query_id: String,
    },

    /// List a user's queries, newest first
    #[command(alias = "ls", alias = "l")]
    List {
        /// User id to list queries for
        user_id: String,
    },

    /// Reclaim expired query records now
    Purge,

    /// Create a default config.toml
    #[command(alias = "--init")]
    Init,
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "ragarr")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Daemon) => run_daemon(config, prometheus_handle).await,
        Some(Commands::Submit { user_id, query }) => {
            cmd_submit(&config, &user_id, &query.join(" ")).await
        }
        Some(Commands::Status { query_id }) => cmd_status(&config, &query_id).await,
        Some(Commands::List { user_id }) => cmd_list(&config, &user_id).await,
        Some(Commands::Purge) => cmd_purge(&config).await,
        Some(Commands::Init) => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists");
            }
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Ragarr v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let (shared, job_rx) = SharedState::new(config.clone()).await?;

    let worker_handle = shared.start_worker(job_rx).await;

    let scheduler = Arc::new(Scheduler::new(
        shared.store.clone(),
        config.retention.clone(),
    ));
    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = scheduler.start().await {
                error!("Scheduler error: {}", e);
            }
        })
    };

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        info!("Starting Web API on port {}", port);

        let api_state = api::create_app_state(Arc::clone(&shared), prometheus_handle);
        let app = api::router(api_state).await;
        let addr = format!("0.0.0.0:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        Some(tokio::spawn(async move {
            info!("🌐 Web Server running at http://0.0.0.0:{}", port);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler.stop().await;
    scheduler_handle.abort();
    worker_handle.abort();
    if let Some(handle) = server_handle {
        handle.abort();
    }
    info!("Daemon stopped");

    Ok(())
}

async fn cmd_submit(config: &Config, user_id: &str, query_text: &str) -> anyhow::Result<()> {
    if query_text.trim().is_empty() {
        println!("Query text must not be empty");
        return Ok(());
    }

    let (shared, _job_rx) = SharedState::new(config.clone()).await?;

    let record = QueryRecord::new(user_id, query_text, config.retention.ttl_seconds());
    shared.store.create_query(&record).await?;
    println!("Submitted query {}", record.query_id);

    // No daemon here, so answer inline instead of dispatching.
    let worker = Worker::new(
        shared.store.clone(),
        Arc::clone(&shared.engine),
        shared.event_bus.clone(),
        &config.worker,
    );
    worker.process(&record.query_id).await?;

    let result = shared.store.get_query(&record.query_id).await?;
    match result.state {
        QueryState::Complete => {
            println!();
            println!("{}", result.answer_text.unwrap_or_default());
            if !result.sources.is_empty() {
                println!();
                println!("Sources: {}", result.sources.join(", "));
            }
        }
        QueryState::Failed => {
            println!(
                "Query failed: {}",
                result.error_message.unwrap_or_default()
            );
        }
        QueryState::Pending => {
            println!("Query is still pending");
        }
    }

    Ok(())
}

async fn cmd_status(config: &Config, query_id: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    match store.get_query(query_id).await {
        Ok(record) => {
            println!("Query:   {}", record.query_text);
            println!("State:   {}", record.state.as_str());
            if let Some(answer) = record.answer_text {
                println!("Answer:  {}", answer);
            }
            if let Some(err) = record.error_message {
                println!("Error:   {}", err);
            }
            if !record.sources.is_empty() {
                println!("Sources: {}", record.sources.join(", "));
            }
        }
        Err(db::StoreError::NotFound(_)) => {
            println!("Query {} not found (unknown or expired)", query_id);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn cmd_list(config: &Config, user_id: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let (records, _) = store
        .list_queries_by_user(user_id, ListDirection::Desc, 0, 50)
        .await?;

    if records.is_empty() {
        println!("No queries for user {}", user_id);
        return Ok(());
    }

    for record in records {
        println!(
            "{}  [{}]  {}",
            record.query_id,
            record.state.as_str(),
            record.query_text
        );
    }

    Ok(())
}

async fn cmd_purge(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let scheduler = Scheduler::new(store, config.retention.clone());
    let purged = scheduler.run_once().await?;
    println!("Purged {} expired query records", purged);

    Ok(())
}
