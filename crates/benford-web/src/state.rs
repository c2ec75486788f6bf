use std::sync::Arc;

use benford_core::{Config, JobStore, ObjectStore};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub config: Arc<Config>,
    /// Data keys of freshly stored documents, consumed by the worker pool.
    pub dispatch: async_channel::Sender<String>,
}
