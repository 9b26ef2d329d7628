//! Shared application state.

use std::sync::Arc;

use shaperun_pool::TaskRunner;

/// Shared application state.
pub struct AppState {
    /// Runs tasks and owns the artifacts.
    pub runner: Arc<dyn TaskRunner>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(runner: Arc<dyn TaskRunner>) -> Arc<Self> {
        Arc::new(Self { runner })
    }
}
