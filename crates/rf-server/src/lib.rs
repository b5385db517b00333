//! rf-server: HTTP front end for the relayforge gateway.
//!
//! This crate provides:
//!
//! - Axum router with the stream, metadata, tools and health endpoints
//! - Request-id tracing middleware and JSON error responses
//! - OpenAPI document and Swagger UI under `/api-docs`
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;

use std::future::Future;
use std::net::SocketAddr;

use rf_core::config::Config;
use tokio::net::TcpListener;

use crate::context::AppContext;

/// Start the relayforge server.
///
/// Discovers the external tools, builds the [`AppContext`] and serves until
/// SIGINT or SIGTERM arrives.
pub async fn start(config: Config) -> rf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = rf_av::ToolRegistry::discover(&config.tools);
    for info in tools.check_all().await {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| rf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    tracing::info!(
        acceleration = %config.transcode.hw_accel,
        max_concurrent = ?config.transcode.max_concurrent,
        max_duration_secs = ?config.transcode.max_duration_secs,
        "Transcoding settings"
    );

    let ctx = AppContext::new(config, tools);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| rf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Listening on http://{addr}");

    serve(listener, ctx, shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve the router on `listener` until `signal` resolves or
/// `ctx.shutdown` is cancelled.
///
/// Shutdown cancels `ctx.shutdown`, which kills every running engine and
/// ends its response body, so open streams cannot hold the drain open.
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, signal: F) -> rf_core::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel = ctx.shutdown.clone();
    let transcoder = ctx.transcoder.clone();
    let app = router::build_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal => {}
                _ = cancel.cancelled() => {}
            }
            tracing::info!(active = transcoder.active(), "Stopping active transcodes");
            cancel.cancel();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
