//! Shared application state.

use threadline_pipeline::worker::WorkerHandle;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Submit handle of the event workers.
    pub events: WorkerHandle,
    /// Submit handle of the command workers.
    pub commands: WorkerHandle,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(events: WorkerHandle, commands: WorkerHandle) -> Self {
        Self { events, commands }
    }
}
