//! HTTP listener module.
//!
//! Binds the probe endpoint with fixed connection timeouts and drains
//! in-flight requests on SIGTERM/SIGINT.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
