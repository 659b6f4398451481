//! Graceful shutdown on SIGTERM and SIGINT.
//!
//! On either signal the listener stops accepting connections and in-flight
//! probes get `grace` to finish. Probes still running after that are dropped,
//! which cancels them and kills any child `ping` processes.

use std::time::Duration;

use axum_server::Handle;

/// Resolves when SIGINT (Ctrl+C) or, on Unix, SIGTERM arrives.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Spawn a task that triggers graceful shutdown of `handle` on signal.
pub fn setup_shutdown_handler(handle: Handle, grace: Duration) {
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        tracing::info!(
            signal,
            grace_seconds = grace.as_secs(),
            "Shutdown signal received, draining in-flight probes"
        );
        handle.graceful_shutdown(Some(grace));
    });
}
