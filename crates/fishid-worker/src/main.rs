//! Photo classification worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fishid_models::SpeciesCatalog;
use fishid_queue::{Notifier, NotifierConfig, RedisNotifier, RedisWorkQueue, WorkQueue};
use fishid_results::RedisResultStore;
use fishid_storage::S3ObjectStore;
use fishid_worker::{HttpClassifier, MessageProcessor, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting fishid-worker");

    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fishid=info,info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid WORKER_METRICS_ADDR '{}'", addr))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let queue = RedisWorkQueue::from_env().context("failed to create work queue")?;
    queue.init().await.context("failed to initialise work queue")?;
    let visibility = queue.config().visibility_timeout;
    if !config.fits_visibility(visibility) {
        warn!(
            job_timeout = ?config.job_timeout,
            visibility_timeout = ?visibility,
            "Job timeout is not below the queue visibility timeout; slow messages may be processed twice concurrently"
        );
    }

    let objects = S3ObjectStore::from_env().context("failed to create object store")?;
    let results = RedisResultStore::from_env().context("failed to create result store")?;
    let classifier = HttpClassifier::from_env().context("failed to create classifier client")?;
    match classifier.health_check().await {
        Ok(true) => info!("Classifier is healthy"),
        Ok(false) | Err(_) => warn!("Classifier health check failed; continuing"),
    }
    let catalog = SpeciesCatalog::from_env().context("failed to load species catalog")?;
    info!(species = catalog.len(), "Loaded species catalog");

    let mut processor = MessageProcessor::new(
        Arc::new(objects),
        Arc::new(results),
        Arc::new(classifier),
        Arc::new(catalog),
    );
    let notifier_config = NotifierConfig::from_env();
    if notifier_config.enabled {
        let notifier: Arc<dyn Notifier> =
            Arc::new(RedisNotifier::new(&notifier_config).context("failed to create notifier")?);
        processor = processor.with_notifier(notifier);
    }

    let queue: Arc<dyn WorkQueue> = Arc::new(queue);
    let pool = WorkerPool::new(config, queue, Arc::new(processor));

    let shutdown = pool.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown.shutdown();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    pool.run().await?;
    Ok(())
}
