mod api;
mod document;
mod error;
mod monitor;
mod pipeline;
mod storage;
mod utils;


use axum::{middleware, Router};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::error::MigrationError;
use crate::monitor::ProgressMonitor;
use crate::pipeline::{BackfillFeed, ChangeBatchHandler, DeadletterExporter, FeedStats};
use crate::storage::{
    ClientPool, DeadletterSink, DynamoDBFactory, DynamoDBJobStore, JobStore, S3DeadletterSink,
    StoreProvider,
};
use crate::utils::{Config, Metrics};

/// Dokument-Migration zwischen Collections mit Fortschritts-Monitoring
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML Konfigurationsdatei
    #[arg(long)]
    config: Option<PathBuf>,
}

type FeedResult = (String, Result<FeedStats, MigrationError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    utils::init_logging(config.log_format);

    tracing::info!(
        admin_port = config.admin_port,
        jobs_account = %config.jobs_account,
        jobs_table = %config.jobs_table,
        "Starting document migrator"
    );

    let metrics = Arc::new(Metrics::new());

    // Ein Client pro Account, von allen Komponenten geteilt
    let pool = Arc::new(ClientPool::new(DynamoDBFactory::new(
        config.accounts.clone(),
        config.retry.clone(),
    )));

    let jobs_client = pool.get_or_create(&config.jobs_account).await?;
    let jobs: Arc<dyn JobStore> = Arc::new(DynamoDBJobStore::new(
        jobs_client,
        config.jobs_table.clone(),
        config.retry.clone(),
    ));

    let deadletter = deadletter_sink(&config).await?;

    let shutdown = CancellationToken::new();

    let monitor = Arc::new(ProgressMonitor::new(
        jobs.clone(),
        pool.clone(),
        config.monitor_settings(),
        metrics.clone(),
    ));
    let monitor_task = tokio::spawn(monitor.run(shutdown.clone()));

    let mut feeds = JoinSet::new();
    if config.backfill_enabled {
        spawn_backfills(
            &config,
            pool.as_ref(),
            jobs.as_ref(),
            deadletter.as_ref(),
            &metrics,
            &shutdown,
            &mut feeds,
        )
        .await?;
    }

    let app = Router::new()
        .nest("/api/admin", api::admin_router(metrics.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware)),
        );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.admin_port)).await?;
    tracing::info!("Admin server listening on port {}", config.admin_port);

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    // Server kann auch ohne Signal enden
    shutdown.cancel();

    if let Err(e) = monitor_task.await {
        tracing::error!(error = %e, "Progress monitor task failed");
    }

    while let Some(joined) = feeds.join_next().await {
        match joined {
            Ok((job_id, Ok(stats))) => {
                tracing::info!(job_id = %job_id, stats = ?stats, "Backfill stopped");
            }
            Ok((job_id, Err(e))) => {
                tracing::error!(job_id = %job_id, error = %e, "Backfill aborted");
            }
            Err(e) => tracing::error!(error = %e, "Backfill task failed"),
        }
    }

    tracing::info!("Document migrator stopped");
    Ok(())
}

/// S3 Sink nur wenn ein Bucket konfiguriert ist
async fn deadletter_sink(config: &Config) -> anyhow::Result<Option<Arc<dyn DeadletterSink>>> {
    let Some(bucket) = &config.deadletter_bucket else {
        tracing::warn!("No deadletter bucket configured, failed documents are only logged");
        return Ok(None);
    };

    let account = config.account(config.deadletter_account())?;
    let sdk_config = storage::pool::load_sdk_config(account).await;
    let sink = S3DeadletterSink::new(
        aws_sdk_s3::Client::new(&sdk_config),
        bucket.clone(),
        config.retry.clone(),
    );

    tracing::info!(bucket = %bucket, account = config.deadletter_account(), "Deadletter sink configured");
    Ok(Some(Arc::new(sink)))
}

/// Ein Backfill-Feed pro aktivem Job
async fn spawn_backfills(
    config: &Config,
    stores: &dyn StoreProvider,
    jobs: &dyn JobStore,
    deadletter: Option<&Arc<dyn DeadletterSink>>,
    metrics: &Arc<Metrics>,
    shutdown: &CancellationToken,
    feeds: &mut JoinSet<FeedResult>,
) -> anyhow::Result<()> {
    for job in jobs.list_active().await? {
        let source = stores.collection(&job.source).await?;
        let destination = stores.collection(&job.destination).await?;

        let handler = ChangeBatchHandler::for_job(
            &job,
            destination,
            deadletter.cloned().map(DeadletterExporter::new),
            metrics.clone(),
        );
        let feed = BackfillFeed::new(
            source,
            config.backfill_page_size,
            job.modified_since(Utc::now()),
            config.retry.clone(),
        );

        let cancel = shutdown.clone();
        feeds.spawn(async move {
            let result = feed.run(&handler, &cancel).await;
            (handler.job_id().to_string(), result)
        });
    }

    tracing::info!(feeds = feeds.len(), "Backfill feeds started");
    Ok(())
}

/// Logging middleware
async fn logging_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
