use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use jobdesk::api::{self, AppState};
use jobdesk::chat::ChatEngine;
use jobdesk::config::{self, Config, QueueBackend, SearchBackend};
use jobdesk::ingestion::IngestionWorker;
use jobdesk::llm::build_chat_client;
use jobdesk::logging;
use jobdesk::metrics::PipelineMetrics;
use jobdesk::query::QueryService;
use jobdesk::queue::{InMemoryQueue, QueueConsumer, QueuePublisher, QueueTransport, ServiceBusQueue};
use jobdesk::search::{InMemoryIndex, SearchIndex, SearchService};
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Parser)]
#[command(
    name = "jobdesk",
    about = "Job description intake, ingestion worker, and RAG chat service"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and run ingestion workers in-process.
    Serve {
        /// Port to bind; overrides `SERVER_PORT`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Consume the queue without serving HTTP.
    Worker,
    /// Create the search index schema if it does not exist, then exit.
    EnsureIndex,
}

struct Backends {
    index: Arc<dyn SearchIndex>,
    transport: Arc<dyn QueueTransport>,
    consumer: Arc<dyn QueueConsumer>,
}

impl Backends {
    fn from_config(config: &Config) -> Result<Self> {
        let index: Arc<dyn SearchIndex> = match config.search.backend {
            SearchBackend::Azure => Arc::new(
                SearchService::new(&config.search).context("Failed to build search client")?,
            ),
            SearchBackend::Memory => Arc::new(InMemoryIndex::new()),
        };

        let (transport, consumer): (Arc<dyn QueueTransport>, Arc<dyn QueueConsumer>) =
            match config.queue.backend {
                QueueBackend::ServiceBus => {
                    let queue = Arc::new(
                        ServiceBusQueue::new(&config.queue)
                            .context("Failed to build service bus client")?,
                    );
                    (
                        queue.clone() as Arc<dyn QueueTransport>,
                        queue as Arc<dyn QueueConsumer>,
                    )
                }
                QueueBackend::Memory => {
                    let queue = Arc::new(InMemoryQueue::new(
                        config.queue.max_delivery_count,
                        config.queue.receive_timeout,
                    ));
                    (
                        queue.clone() as Arc<dyn QueueTransport>,
                        queue as Arc<dyn QueueConsumer>,
                    )
                }
            };

        tracing::info!(
            search = ?config.search.backend,
            queue = ?config.queue.backend,
            llm = ?config.llm.provider,
            "Backends configured"
        );
        Ok(Self {
            index,
            transport,
            consumer,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();
    let cli = Cli::parse();

    let backends = Backends::from_config(config)?;
    let metrics = Arc::new(PipelineMetrics::new());

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::EnsureIndex => {
            backends
                .index
                .ensure_index()
                .await
                .context("Failed to ensure search index")?;
            tracing::info!(index = %config.search.index_name, "Search index ready");
            Ok(())
        }
        Command::Worker => {
            if config.queue.backend == QueueBackend::Memory {
                tracing::warn!("Worker started with the in-memory queue; it will only see its own messages");
            }
            ensure_index(&backends).await?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let workers = spawn_workers(config, &backends, &metrics, shutdown_rx);
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
            workers.await.context("Worker task panicked")?;
            Ok(())
        }
        Command::Serve { port } => serve(config, backends, metrics, port).await,
    }
}

async fn serve(
    config: &'static Config,
    backends: Backends,
    metrics: Arc<PipelineMetrics>,
    port: Option<u16>,
) -> Result<()> {
    ensure_index(&backends).await?;
    let llm = build_chat_client(&config.llm).context("Failed to build language model client")?;

    let state = AppState {
        publisher: Arc::new(QueuePublisher::new(
            backends.transport.clone(),
            metrics.clone(),
        )),
        queries: Arc::new(QueryService::new(backends.index.clone())),
        chat: Arc::new(ChatEngine::new(
            backends.index.clone(),
            llm,
            metrics.clone(),
        )),
        metrics: metrics.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_workers(config, &backends, &metrics, shutdown_rx);

    let (listener, port) = bind_listener(port.or(config.server_port))
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    workers.await.context("Worker task panicked")?;
    Ok(())
}

async fn ensure_index(backends: &Backends) -> Result<()> {
    backends
        .index
        .ensure_index()
        .await
        .context("Failed to ensure search index")
}

fn spawn_workers(
    config: &Config,
    backends: &Backends,
    metrics: &Arc<PipelineMetrics>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let worker = Arc::new(IngestionWorker::new(
        backends.index.clone(),
        config.retry,
        metrics.clone(),
    ));
    let consumer = backends.consumer.clone();
    let concurrency = config.worker_concurrency.max(1);
    tracing::info!(concurrency, "Starting ingestion workers");

    tokio::spawn(async move {
        let loops = (0..concurrency).map(|_| {
            let worker = worker.clone();
            let consumer = consumer.clone();
            let shutdown = shutdown.clone();
            async move { worker.run(consumer, shutdown).await }
        });
        join_all(loops).await;
    })
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested");
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 7071..=7171;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 7071-7171",
    ))
}
