//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum number of items accepted in one batch.
    pub max_batch: usize,
    /// Prefix of server identities assigned to new tasks.
    pub server_id_prefix: String,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_batch: 100,
            server_id_prefix: "srv-".into(),
        }
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }

    /// Sets the server identity prefix.
    pub fn with_server_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.server_id_prefix = prefix.into();
        self
    }

    /// Server identity for a task without one.
    pub fn server_id_for(&self, task_id: &str) -> String {
        format!("{}{}", self.server_id_prefix, task_id)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
