//! Probe executors.
//!
//! Two interchangeable strategies sit behind the [`ProbeExecutor`] trait:
//! - **Ping**: runs the host's ICMP echo utility and reports average round-trip
//!   latency in milliseconds
//! - **HTTP/HTTPS**: issues a `HEAD` request and reports the raw status code
//!
//! Both take the request's `CancellationToken`; cancelling it tears down the
//! child process or the in-flight request rather than just abandoning the wait.

mod http;
mod ping;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;

pub use http::{target_url, HttpProbe};
pub use ping::{parse_average_rtt, PingProbe};

/// Probe strategy selected by the `method` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    Ping,
    Http,
    Https,
}

impl ProbeMethod {
    /// Permissive parse: only exact `http` and `https` select the HTTP probe,
    /// anything else (including absent) means ping.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("http") => ProbeMethod::Http,
            Some("https") => ProbeMethod::Https,
            _ => ProbeMethod::Ping,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Ping => "ping",
            ProbeMethod::Http => "http",
            ProbeMethod::Https => "https",
        }
    }

    /// URL scheme for HTTP probes
    pub fn scheme(&self) -> Option<Scheme> {
        match self {
            ProbeMethod::Ping => None,
            ProbeMethod::Http => Some(Scheme::Http),
            ProbeMethod::Https => Some(Scheme::Https),
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Why a probe produced no value. Always reported to the caller as a 200
/// response with the message in the `error` field.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Non-zero exit, spawn failure or cancellation of the echo utility.
    /// The underlying cause is deliberately not distinguished.
    #[error("ping failed: host unreachable or timeout")]
    PingFailed,

    #[error("could not parse ping output")]
    UnparsableOutput,

    #[error("parse error: {0}")]
    Parse(#[from] std::num::ParseFloatError),

    #[error("invalid ping result: {0}")]
    InvalidLatency(f64),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("probe cancelled")]
    Cancelled,
}

/// Executes probes on behalf of the dispatcher
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// Average round-trip latency to `host` in milliseconds
    async fn ping(&self, host: &str, cancel: &CancellationToken) -> Result<f64, ProbeError>;

    /// Status code of a `HEAD` request to `scheme://host`
    async fn http(
        &self,
        host: &str,
        scheme: Scheme,
        cancel: &CancellationToken,
    ) -> Result<u16, ProbeError>;
}

/// Production executor backed by the system echo utility and a shared HTTP client
#[derive(Debug, Clone)]
pub struct SystemProber {
    ping: PingProbe,
    http: HttpProbe,
}

impl SystemProber {
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        Ok(Self {
            ping: PingProbe::new(config),
            http: HttpProbe::new(config)?,
        })
    }
}

#[async_trait]
impl ProbeExecutor for SystemProber {
    async fn ping(&self, host: &str, cancel: &CancellationToken) -> Result<f64, ProbeError> {
        self.ping.run(host, cancel).await
    }

    async fn http(
        &self,
        host: &str,
        scheme: Scheme,
        cancel: &CancellationToken,
    ) -> Result<u16, ProbeError> {
        self.http.run(host, scheme, cancel).await
    }
}
