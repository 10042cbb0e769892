//! Application state for the classifier server
//!
//! Everything here is fixed after startup; handlers only read it.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::inference::InferenceContext;

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Loaded classifier and label table
    pub context: InferenceContext,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, context: InferenceContext) -> Self {
        Self {
            config,
            context,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
