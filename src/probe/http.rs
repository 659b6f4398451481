//! HTTP(S) reachability probe.
//!
//! Issues a single `HEAD` request and reports the raw status code. Redirect
//! handling and certificate validation are the client defaults; a 404 or 500 is
//! a successful probe, only transport failures are errors.

use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::{ProbeError, Scheme};
use crate::config::{ProbeConfig, PROBE_USER_AGENT};

/// Build the probe URL, dropping any scheme the caller already put on `host`.
pub fn target_url(host: &str, scheme: Scheme) -> String {
    let host = host.strip_prefix("http://").unwrap_or(host);
    let host = host.strip_prefix("https://").unwrap_or(host);
    format!("{}://{}", scheme.as_str(), host)
}

/// `HEAD` prober sharing one connection-pooling client across requests
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .user_agent(PROBE_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// `HEAD scheme://host`, returning the status code.
    ///
    /// The in-flight request is dropped (and its connection closed) when
    /// `cancel` fires.
    #[tracing::instrument(name = "http_probe", skip(self, scheme, cancel), fields(scheme = scheme.as_str()))]
    pub async fn run(
        &self,
        host: &str,
        scheme: Scheme,
        cancel: &CancellationToken,
    ) -> Result<u16, ProbeError> {
        let url = target_url(host, scheme);
        let request = self.client.head(&url).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%url, "HTTP probe cancelled");
                return Err(ProbeError::Cancelled);
            }
            response = request => response.map_err(|e| {
                tracing::debug!(%url, error = %e, "HTTP probe transport failure");
                ProbeError::Transport(e)
            })?,
        };

        Ok(response.status().as_u16())
    }
}
