//! Application state for API handlers

use crate::recorder::BroadcastRecorder;
use crate::store::ResourceStore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Resource store
    pub store: Arc<dyn ResourceStore>,

    /// Approval event recorder
    pub recorder: Arc<BroadcastRecorder>,

    /// Names of the loaded policy modules
    pub policy_modules: Arc<Vec<String>>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        store: Arc<dyn ResourceStore>,
        recorder: Arc<BroadcastRecorder>,
        policy_modules: Vec<String>,
    ) -> Self {
        Self {
            store,
            recorder,
            policy_modules: Arc::new(policy_modules),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        match secs {
            s if s < 60 => format!("{}s", s),
            s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
            s if s < 86400 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
            s => format!("{}d {}h", s / 86400, (s % 86400) / 3600),
        }
    }
}
