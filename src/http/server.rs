//! Listener startup.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use hyper_util::rt::TokioTimer;

use crate::config::{AppConfig, GRACEFUL_SHUTDOWN_SECS};

use super::shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}: {1}")]
    Address(String, std::net::AddrParseError),

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Serve `app` on `http.host:http.port`.
///
/// This function blocks until the server shuts down.
pub async fn start_server(app: Router, config: &AppConfig) -> Result<(), ServerError> {
    let raw = format!("{}:{}", config.http.host, config.http.port);
    let addr: SocketAddr = raw.parse().map_err(|e| ServerError::Address(raw.clone(), e))?;

    let handle = Handle::new();
    shutdown::setup_shutdown_handler(handle.clone(), Duration::from_secs(GRACEFUL_SHUTDOWN_SECS));

    let mut server = axum_server::bind(addr).handle(handle);
    server
        .http_builder()
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(Duration::from_secs(config.http.read_timeout_seconds))
        .keep_alive(true);

    tracing::info!(
        %addr,
        read_timeout_seconds = config.http.read_timeout_seconds,
        request_timeout_seconds = config.http.request_timeout_seconds,
        "Server started"
    );

    server
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
