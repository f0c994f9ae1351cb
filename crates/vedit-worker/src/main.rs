//! Video edit worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_media::{check_program, ProcessEngine};
use vedit_queue::{QueueConfig, RedisJobRegistry, RedisWorkQueue};
use vedit_worker::{JobExecutor, PipelineContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting vedit-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => info!("Metrics exporter listening on {}", addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    for program in ["ffmpeg", "ffprobe"] {
        if let Err(e) = check_program(program) {
            warn!("{}; jobs will fail until it is installed", e);
        }
    }

    let queue_config = QueueConfig::from_env();
    let queue = match RedisWorkQueue::new(queue_config.clone()) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create work queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize work queue: {}", e);
        std::process::exit(1);
    }
    let registry = match RedisJobRegistry::new(queue_config) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to create job registry: {}", e);
            std::process::exit(1);
        }
    };

    let queue = Arc::new(queue);
    let registry = Arc::new(registry);
    let instances = config.instances;
    let ctx = Arc::new(PipelineContext::new(config, Arc::new(ProcessEngine::new())));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_id = uuid::Uuid::new_v4().simple().to_string();

    let mut handles = Vec::with_capacity(instances);
    for i in 0..instances {
        let executor = JobExecutor::new(
            ctx.clone(),
            queue.clone(),
            registry.clone(),
            format!("worker-{}-{}", worker_id, i),
        );
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { executor.run(shutdown).await }));
    }

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal, finishing in-flight jobs");
    let _ = shutdown_tx.send(true);

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Executor task failed: {}", e);
        }
    }

    info!("Worker shutdown complete");
}

/// Colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "vedit=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

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
