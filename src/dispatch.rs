//! Request dispatcher.
//!
//! Drives one probe request end to end: authorization, host validation,
//! admission through the [`AdmissionGate`], strategy selection and shaping the
//! outcome into a [`ResponseEnvelope`]. Authorization and validation failures
//! short-circuit before the gate is consulted; a full gate short-circuits
//! before any probe runs.

use std::sync::Arc;
use std::time::Instant;

use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{DispatchError, Rejection};
use crate::gate::{Admission, AdmissionGate};
use crate::probe::{ProbeError, ProbeExecutor, ProbeMethod};

/// One inbound probe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub host: String,
    pub method: ProbeMethod,
    pub credential: Option<String>,
}

impl ProbeRequest {
    pub fn new(host: impl Into<String>, method: ProbeMethod, credential: Option<String>) -> Self {
        Self {
            host: host.into(),
            method,
            credential,
        }
    }
}

/// Scalar payload of a successful probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeValue {
    /// Average round-trip time in milliseconds
    LatencyMs(f64),
    /// HTTP status code
    Status(u16),
    /// Placeholder reported alongside an error
    Zero,
}

impl ProbeValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ProbeValue::LatencyMs(ms) => *ms,
            ProbeValue::Status(code) => f64::from(*code),
            ProbeValue::Zero => 0.0,
        }
    }
}

impl Serialize for ProbeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProbeValue::LatencyMs(ms) => serializer.serialize_f64(*ms),
            ProbeValue::Status(code) => serializer.serialize_u16(*code),
            ProbeValue::Zero => serializer.serialize_u8(0),
        }
    }
}

/// What a probe executor produced
pub type ProbeOutcome = Result<ProbeValue, ProbeError>;

/// The only externally visible artifact of a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub host: String,
    #[serde(rename = "type")]
    pub method: ProbeMethod,
    pub result: ProbeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn from_outcome(host: impl Into<String>, method: ProbeMethod, outcome: ProbeOutcome) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (value, None),
            Err(e) => (ProbeValue::Zero, Some(e.to_string())),
        };
        Self {
            host: host.into(),
            method,
            result,
            error,
        }
    }

    pub fn failure(host: impl Into<String>, method: ProbeMethod, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            method,
            result: ProbeValue::Zero,
            error: Some(message.into()),
        }
    }
}

/// How a dispatched request ended, short of a rejection
#[derive(Debug)]
pub enum Dispatched {
    /// A probe ran (successfully or not) and produced an envelope
    Completed(ResponseEnvelope),
    /// The caller went away while waiting for admission; nothing is reported
    Abandoned,
}

/// Orchestrates probe requests against a shared admission gate. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    credential: Option<Arc<str>>,
    gate: AdmissionGate,
    executor: Arc<dyn ProbeExecutor>,
}

impl Dispatcher {
    pub fn new(config: &AppConfig, executor: Arc<dyn ProbeExecutor>) -> Self {
        Self {
            credential: config.auth.credential().map(Arc::from),
            gate: AdmissionGate::new(config.concurrency_limit()),
            executor,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Without a configured credential every request is authorized.
    fn is_authorized(&self, supplied: Option<&str>) -> bool {
        match self.credential.as_deref() {
            Some(expected) => supplied == Some(expected),
            None => true,
        }
    }

    /// Run one request. `cancel` represents the caller's lifetime: it is checked
    /// during admission and handed to the probe so it can be torn down.
    pub async fn dispatch(
        &self,
        request: ProbeRequest,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, Rejection> {
        let ProbeRequest {
            host,
            method,
            credential,
        } = request;

        let reject = |reason: DispatchError, host: String| Rejection {
            envelope: ResponseEnvelope::failure(host, method, reason.to_string()),
            reason,
        };

        if !self.is_authorized(credential.as_deref()) {
            tracing::warn!(%host, %method, "Rejected request with invalid credential");
            return Err(reject(DispatchError::Unauthorized, host));
        }

        if host.is_empty() {
            tracing::debug!(%method, "Rejected request without host");
            return Err(reject(DispatchError::MissingHost, host));
        }

        // Held until this function returns or its future is dropped.
        let _slot = match self.gate.try_acquire(cancel) {
            Admission::Admitted(slot) => slot,
            Admission::Busy => {
                tracing::warn!(
                    %host,
                    %method,
                    capacity = self.gate.capacity(),
                    "Admission gate full, shedding request"
                );
                return Err(reject(DispatchError::Overloaded, host));
            }
            Admission::CallerGone => {
                tracing::debug!(%host, %method, "Caller went away before admission");
                return Ok(Dispatched::Abandoned);
            }
        };

        let start = Instant::now();
        let outcome: ProbeOutcome = match method.scheme() {
            Some(scheme) => self
                .executor
                .http(&host, scheme, cancel)
                .await
                .map(ProbeValue::Status),
            None => self
                .executor
                .ping(&host, cancel)
                .await
                .map(ProbeValue::LatencyMs),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(value) => tracing::info!(
                %host,
                %method,
                result = value.as_f64(),
                duration_ms,
                "Probe succeeded"
            ),
            Err(e) => tracing::info!(
                %host,
                %method,
                error = %e,
                duration_ms,
                "Probe failed"
            ),
        }

        Ok(Dispatched::Completed(ResponseEnvelope::from_outcome(
            host, method, outcome,
        )))
    }
}
