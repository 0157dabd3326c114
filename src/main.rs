use anyhow::Context;
use dotenvy::dotenv;
use tiercache::router::init_router;
use tiercache::state::init_app_state;
use tiercache_config::{
    CacheConfig, CorsConfig, LoggingConfig, ResponseCacheConfig, ServerConfig,
};
use tiercache_observability::{init_logging, init_metrics, metrics_app};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let logging_config = LoggingConfig::from_env();
    init_logging(&logging_config)?;

    let server_config = ServerConfig::from_env();

    if let Some(handle) = init_metrics(&logging_config) {
        let addr = server_config.metrics_bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
        info!(%addr, "Metrics available at /metrics");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, metrics_app(handle)).await {
                error!(error = %e, "Metrics server stopped");
            }
        });
    }

    let state = init_app_state(
        &CacheConfig::from_env(),
        ResponseCacheConfig::from_env(),
        CorsConfig::from_env(),
    )
    .await;
    info!(cache.backend = %state.cache.active_backend(), "Cache ready");
    let app = init_router(state);

    let addr = server_config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Server running, Swagger UI at /swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
