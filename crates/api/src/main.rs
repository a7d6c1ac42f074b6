use std::sync::Arc;

use anyhow::Context;

use goods_api::app::{self, services};
use goods_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    goods_observability::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    let services = Arc::new(
        services::build_services(&settings)
            .await
            .context("failed to wire services")?,
    );
    let audit_worker = services
        .spawn_audit_worker()
        .context("failed to subscribe audit worker")?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.http_port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{}", settings.http_port))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app::build_app(services))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    audit_worker.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
