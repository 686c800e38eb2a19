use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use linkguard::bot::{
    self, IngestHandler, MaxClient, MemberDirectory, MembershipHandler, ReplySink,
};
use linkguard::config::{BotConfig, QueueConfig, ScannerConfig, StoreConfig, WorkerConfig};
use linkguard::danger::DangerAggregator;
use linkguard::dedup::DedupGuard;
use linkguard::error::Error;
use linkguard::queue::TaskQueue;
use linkguard::scanner::OpenTipScanner;
use linkguard::store::{ItemStore, LibSqlBackend};
use linkguard::worker::{self, ProcessorDeps};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let role = std::env::args().nth(1).unwrap_or_default();
    let result = match role.as_str() {
        "bot" => run_bot().await,
        "worker" => run_worker().await,
        other => {
            eprintln!("Usage: linkguard <bot|worker>");
            if !other.is_empty() {
                eprintln!("Unknown role: {other}");
            }
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Fatal error");
        if matches!(e, Error::Config(_)) {
            // Damp restart storms under process supervision.
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        std::process::exit(1);
    }
}

async fn open_store() -> Result<Arc<dyn ItemStore>, Error> {
    let store_config = StoreConfig::from_env();
    let store = LibSqlBackend::new_local(Path::new(&store_config.path)).await?;
    Ok(Arc::new(store))
}

/// Ingestion process: long-poll the platform, persist sightings, queue tasks.
async fn run_bot() -> Result<(), Error> {
    let bot_config = BotConfig::from_env()?;
    let store = open_store().await?;
    let queue = Arc::new(TaskQueue::connect(&QueueConfig::from_env()).await?);
    let client = Arc::new(MaxClient::new(bot_config));

    let replies = Arc::clone(&client) as Arc<dyn ReplySink>;
    let members = Arc::clone(&client) as Arc<dyn MemberDirectory>;

    let ingest = IngestHandler::new(Arc::clone(&store), queue, Arc::clone(&replies));
    let membership = MembershipHandler::new(
        DangerAggregator::new(Arc::clone(&store)),
        DedupGuard::default(),
        members,
        replies,
    );

    bot::run(client, ingest, membership).await
}

/// Worker process: consume tasks, resolve verdicts, reply.
async fn run_worker() -> Result<(), Error> {
    let bot_config = BotConfig::from_env()?;
    let worker_config = WorkerConfig::from_env();
    let store = open_store().await?;
    let queue = Arc::new(TaskQueue::connect(&QueueConfig::from_env()).await?);
    let client = Arc::new(MaxClient::new(bot_config));

    let deps = ProcessorDeps {
        store,
        scanner: Arc::new(OpenTipScanner::new(ScannerConfig::from_env())),
        replies: Arc::clone(&client) as Arc<dyn ReplySink>,
        files: client,
    };

    worker::run(queue, deps, worker_config.prefetch).await
}
