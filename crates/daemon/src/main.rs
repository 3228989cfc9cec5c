//! Bookgen Engine - Main Entry Point
//! JSON-RPC server + per-job generation drivers over a SQLite store

mod config;
mod logging;
mod templates;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use bookgen_api_rpc::{RpcServer, RpcServerConfig};
use bookgen_core::application::{
    BatchScheduler, GenerationService, ProgressTracker, RecoveryService, SchedulerConfig,
    SubmitDefaults,
};
use bookgen_core::port::{SystemTimeProvider, UuidProvider};
use bookgen_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use bookgen_infra_system::{FsBookExporter, HttpContentGenerator, HttpGeneratorConfig};

use crate::config::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration, then logging
    let config = DaemonConfig::load()?;
    logging::init(&config.log.format)?;

    info!("Bookgen Engine v{} starting...", VERSION);

    // 2. Initialize database
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(db_path = %db_path.display(), "Initializing database...");

    let pool = create_pool(&format!("sqlite://{}", db_path.display()))
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let tracker = Arc::new(ProgressTracker::new(time_provider.clone()));

    let api_key = config.api_key();
    if api_key.is_none() {
        tracing::warn!(
            env = %config.generator.api_key_env,
            "No API key set; generator requests will be unauthenticated"
        );
    }
    let generator = Arc::new(
        HttpContentGenerator::new(HttpGeneratorConfig {
            endpoints: config.generator.endpoints.clone(),
            models: config.generator.models.clone(),
            api_key,
            api_version: config.generator.api_version.clone(),
            request_timeout: Duration::from_millis(config.generator.request_timeout_ms),
            requests_per_minute: config.generator.requests_per_minute,
            burst: config.generator.burst,
        })
        .map_err(|e| anyhow::anyhow!("Generator setup failed: {}", e))?,
    );

    let exporter = Arc::new(FsBookExporter::new(config.output_dir()));
    let catalog = Arc::new(templates::build_catalog(config.templates_path().as_deref())?);

    let scheduler = BatchScheduler::new(
        store.clone(),
        generator,
        tracker,
        time_provider.clone(),
        SchedulerConfig {
            retry_delay: config.retry_delay(),
            attempt_timeout: config.attempt_timeout(),
            cost_per_1k_tokens: config.generator.cost_per_1k_tokens,
        },
    )
    .with_exporter(exporter);

    let service = Arc::new(
        GenerationService::new(
            store.clone(),
            catalog,
            Arc::new(scheduler),
            Arc::new(UuidProvider),
            time_provider.clone(),
        )
        .with_defaults(SubmitDefaults {
            concurrency: config.scheduler.default_concurrency,
            max_retries: config.scheduler.max_retries,
        }),
    );

    // 4. Recover jobs interrupted by the previous run
    info!("Running interrupted job recovery...");
    let recovery_service = RecoveryService::new(
        store,
        service.clone(),
        time_provider,
        config.recovery_mode()?,
    );
    match recovery_service.recover_interrupted_jobs().await {
        Ok(count) => info!(recovered_jobs = count, "Recovery completed"),
        Err(e) => error!(error = ?e, "Recovery failed"),
    }

    // 5. Start JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.rpc.host.clone(),
        port: config.rpc.port,
        cost_per_1k_tokens: config.generator.cost_per_1k_tokens,
    };
    let (addr, rpc_handle) = RpcServer::new(rpc_config, service.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Waiting for books...");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!(
        active_jobs = service.active_jobs(),
        "Shutdown signal received. Exiting gracefully..."
    );

    // 7. Graceful shutdown: running jobs resume on next start
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    service.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), rpc_handle.stopped()).await;
    pool.close().await;

    info!("Shutdown complete.");

    Ok(())
}
