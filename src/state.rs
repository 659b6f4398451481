//! Shared application state for request handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// The configuration is frozen at startup; the dispatcher owns the process-wide
/// admission gate.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher }
    }
}
