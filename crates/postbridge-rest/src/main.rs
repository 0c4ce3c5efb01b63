use std::sync::Arc;

use anyhow::Context;
use postbridge_service::{bootstrap, AppConfig, PostService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    if let Err(e) = postbridge_rest::tracing_init::init_tracing(&config.logging) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    tracing::info!(
        phase = %config.migration_phase,
        description = config.migration_phase.description(),
        "starting postbridge REST server"
    );

    let backends = bootstrap::open_backends(&config).await;
    let service = PostService::new(
        config.migration_phase,
        backends,
        &config.mongo.posts_collection,
    )?;
    service.prepare().await?;

    let app = postbridge_rest::build_router(Arc::new(service));

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("REST server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT, then let axum drain in-flight requests.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        },
    }
}
