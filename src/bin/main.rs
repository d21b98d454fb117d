//! Service entrypoint (spec `[AMBIENT] Graceful shutdown & service
//! runtime`): loads config, wires every component, runs migrations, spawns
//! the background services, and serves the HTTP surface until SIGTERM/
//! SIGINT, mirroring the teacher's `bin/server.rs` boot sequence shape
//! (logging init, `PgPoolOptions`, `axum::serve`) generalized to this
//! crate's multi-service runtime.

use std::sync::Arc;

use anyhow::{Context, Result};
use control_plane::adapters::{
    HttpApiKeyValidator, HttpBillingClient, HttpCanvasLookup, HttpDriveService, HttpSandboxProvider,
    HttpStaticFileLookup, HttpWorkflowEngineClient,
};
use control_plane::audit::ApiCallTracker;
use control_plane::config::{AppConfig, LogFormat};
use control_plane::execution::{ExecutionRecordProjector, ScaleboxService};
use control_plane::priority::PgPriorityInputs;
use control_plane::queue::{JobQueue, PostgresJobQueue};
use control_plane::sandbox::SandboxPool;
use control_plane::schedule::ScheduleEngine;
use control_plane::server::state::AppState;
use control_plane::webhook::WebhookService;
use control_plane::worker::{
    run_until_shutdown, sandbox_kill::SandboxKillConsumer, sandbox_pause::SandboxPauseConsumer,
    scalebox_execute::ScaleboxExecuteConsumer, schedule_execute::ScheduleExecuteConsumer,
    schedule_scanner::ScheduleScanner, Service,
};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    tracing::info!(port = config.port, "starting scalebox control plane");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let redis = control_plane::redis::connect(config.redis_url.as_str())
        .await
        .context("failed to connect to redis")?;

    let canvas: Arc<dyn control_plane::external::CanvasLookup> =
        Arc::new(HttpCanvasLookup::from_env().context("failed to configure canvas service adapter")?);
    let workflow_engine: Arc<dyn control_plane::external::WorkflowEngineClient> =
        Arc::new(HttpWorkflowEngineClient::from_env().context("failed to configure workflow engine adapter")?);
    let drive: Arc<dyn control_plane::external::DriveService> =
        Arc::new(HttpDriveService::from_env().context("failed to configure drive service adapter")?);
    let api_key_validator: Arc<dyn control_plane::ingress::ApiKeyValidator> =
        Arc::new(HttpApiKeyValidator::from_env().context("failed to configure auth service adapter")?);
    let files: Arc<dyn control_plane::variables::StaticFileLookup> =
        Arc::new(HttpStaticFileLookup::from_env().context("failed to configure static files adapter")?);
    let billing = HttpBillingClient::from_env().context("failed to configure billing adapter")?;
    let sandbox_provider: Arc<dyn control_plane::sandbox::provider::SandboxProvider> = Arc::new(
        HttpSandboxProvider::new(config.sandbox.provider_base_url.clone(), config.sandbox.api_key.clone())
            .context("failed to configure sandbox provider adapter")?,
    );

    // All four named queues (spec §6) are backed by one `queue_jobs` table,
    // matching the teacher's single job table with a discriminator column.
    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(pool.clone()));

    let sandbox_pool = Arc::new(SandboxPool::new(
        redis.clone(),
        sandbox_provider.clone(),
        queue.clone(),
        queue.clone(),
        config.sandbox.clone(),
    ));
    let scalebox = Arc::new(ScaleboxService::new(
        redis.clone(),
        sandbox_pool.clone(),
        drive.clone(),
        queue.clone(),
        config.sandbox.clone(),
    ));

    let priority_inputs: Arc<dyn control_plane::priority::PriorityInputs> =
        Arc::new(PgPriorityInputs::new(pool.clone(), billing));
    let schedule_engine = Arc::new(ScheduleEngine::new(
        pool.clone(),
        redis.clone(),
        queue.clone(),
        priority_inputs,
        canvas.clone(),
        config.scheduling.clone(),
    ));

    let webhooks = Arc::new(WebhookService::new(
        pool.clone(),
        redis.clone(),
        config.ingress.webhook_config_cache_ttl,
    ));
    let audit = Arc::new(ApiCallTracker::new(pool.clone()));
    let projector = Arc::new(ExecutionRecordProjector::new(pool.clone(), workflow_engine.clone()));

    let state = AppState {
        pool: pool.clone(),
        redis: redis.clone(),
        config: Arc::new(config.clone()),
        api_key_validator,
        canvas: canvas.clone(),
        files: files.clone(),
        webhooks,
        audit,
        projector: projector.clone(),
        scalebox: scalebox.clone(),
        schedule_engine: schedule_engine.clone(),
    };

    let shutdown = CancellationToken::new();
    let services: Vec<Box<dyn Service>> = vec![
        Box::new(ScheduleScanner::new(schedule_engine.clone(), config.scheduling.scan_interval)),
        Box::new(ScheduleExecuteConsumer::new(
            queue.clone(),
            projector.clone(),
            workflow_engine.clone(),
            canvas.clone(),
            files.clone(),
        )),
        Box::new(ScaleboxExecuteConsumer::new(
            queue.clone(),
            scalebox.clone(),
            config.sandbox.api_key.clone(),
        )),
        Box::new(SandboxPauseConsumer::new(queue.clone(), redis.clone(), sandbox_provider.clone())),
        Box::new(SandboxKillConsumer::new(queue.clone(), sandbox_provider.clone(), config.sandbox.clone())),
    ];
    let service_handles = run_until_shutdown(services, shutdown.clone());

    let router = control_plane::server::build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .context("failed to bind HTTP listener")?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        wait_for_shutdown_signal().await;
        server_shutdown.cancel();
    })
    .await
    .context("HTTP server exited with an error")?;

    for handle in service_handles {
        if let Err(error) = handle.await {
            tracing::error!(%error, "background service task panicked");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_logging() {
    let format = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,control_plane=debug,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Waits for either SIGTERM or Ctrl-C, matching the teacher's `axum::serve`
/// + `ctrl_c` pattern generalized to also honor SIGTERM under a process
/// supervisor (spec `[AMBIENT] Graceful shutdown`).
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
