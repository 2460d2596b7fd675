//! Configuration for the sync engine.

use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000/api";

/// Configuration for sync operations.
///
/// Passed explicitly into the dispatcher, reconciler and probe; nothing in
/// the engine reads process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the remote API (e.g. `https://tasks.example.com/api`).
    pub server_url: String,
    /// Maximum number of queued mutations shipped per pass.
    pub batch_size: usize,
    /// Timeout for the batch request.
    pub request_timeout: Duration,
    /// Timeout for the health probe.
    pub health_timeout: Duration,
    /// Retry count at which a record is escalated to the error state.
    pub retry_threshold: u32,
}

impl SyncConfig {
    /// Creates a new sync configuration with default limits.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            batch_size: 50,
            request_timeout: Duration::from_secs(15),
            health_timeout: Duration::from_secs(5),
            retry_threshold: 3,
        }
    }

    /// Sets the batch size. Zero is clamped to one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the batch request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the health probe timeout.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Sets the escalation threshold. Zero is clamped to one.
    pub fn with_retry_threshold(mut self, threshold: u32) -> Self {
        self.retry_threshold = threshold.max(1);
        self
    }

    /// Joins the base URL with an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}
