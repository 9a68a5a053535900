use std::sync::Arc;

use lib_common::core::SubscriberRegistry;

/// Shared handles for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    // Live subscribers, shared with the broadcast loop
    pub registry: Arc<SubscriberRegistry>,
    // Reported by /health
    pub polling_interval_secs: u64,
}

impl AppState {
    pub fn new(registry: Arc<SubscriberRegistry>, polling_interval_secs: u64) -> Self {
        Self {
            registry,
            polling_interval_secs,
        }
    }
}
