//! hostprobe: a host reachability probe service.
//!
//! Answers one probe per request, either ICMP round-trip latency (via the
//! system `ping` utility) or the status code of an HTTP(S) `HEAD` request,
//! behind a fixed-size admission gate that sheds load instead of queueing.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod http;
pub mod middleware;
pub mod probe;
pub mod routes;
pub mod state;

pub use dispatch::{Dispatched, Dispatcher, ProbeRequest, ResponseEnvelope};
pub use error::DispatchError;
