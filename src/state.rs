//! Shared application state for request handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::jobs::JobQueue;
use crate::store::LedgerStore;

/// Cloned into every handler; all fields are cheap handles.
///
/// Handlers only validate and enqueue, so they need the configuration (for
/// the channel secret), the store (for health probes) and the job queue.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn LedgerStore>,
    pub queue: JobQueue,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn LedgerStore>, queue: JobQueue) -> Self {
        Self {
            config: Arc::new(config),
            store,
            queue,
        }
    }
}
