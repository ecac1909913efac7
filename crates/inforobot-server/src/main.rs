//! Inforobot Server - Main entry point

use anyhow::Result;
use inforobot_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use inforobot_server::{
    api::{self, AppState},
    config::Config,
    db,
    features::FeatureState,
    pipeline::{
        queue::QueueSettings, GrokClient, JobQueue, PgJobQueue, PgRequestStore, PipelineRuntime,
        RequestStore,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults for the server binary; LOG_* variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("inforobot-server")
        .filter_directives("inforobot_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Inforobot Server");

    let config = Config::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        workers = config.pipeline.workers,
        "Configuration loaded"
    );

    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    let store: Arc<dyn RequestStore> = Arc::new(PgRequestStore::new(db_pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(
        db_pool.clone(),
        QueueSettings::from(&config.pipeline),
    ));

    let pipeline_handle = if config.pipeline.enabled {
        let enrichment = Arc::new(GrokClient::new(config.enrichment.clone())?);
        let runtime = PipelineRuntime::from_config(
            &config.pipeline,
            store.clone(),
            queue.clone(),
            enrichment,
        );
        info!("Pipeline enabled, starting workers");
        Some(runtime.start())
    } else {
        info!("Pipeline is disabled (PIPELINE_ENABLED=false)");
        None
    };

    let state = AppState {
        db: db_pool.clone(),
        features: FeatureState { store, queue },
    };
    let app = api::create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    if let Some(handle) = pipeline_handle {
        info!(grace_secs = grace.as_secs(), "Stopping pipeline workers");
        handle.shutdown(grace).await;
    }

    db_pool.close().await;
    info!("Server shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
