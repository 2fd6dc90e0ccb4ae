//! Application state for Axum handlers.

use conveyor_jobs::{JobStore, ReadyQueue};
use std::sync::Arc;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// The job store (source of truth).
    pub store: Arc<dyn JobStore>,
    /// The ready queue (dispatch hint).
    pub queue: Arc<dyn ReadyQueue>,
    /// Queue this API serves.
    pub queue_name: String,
}

impl AppState {
    /// Creates the application state.
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn ReadyQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            queue_name: queue_name.into(),
        }
    }
}
