//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during task and sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Input rejected before anything was queued.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No task with the given identity exists.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The remote endpoint was unreachable, timed out, or answered non-2xx.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether the failure was a timeout.
        timed_out: bool,
    },

    /// The remote endpoint answered with something that is not a batch response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a network timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: true,
        }
    }

    /// Returns true if a later pass may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network { .. } | SyncError::Protocol(_))
    }

    /// Returns true if this is a network failure.
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network { .. })
    }
}

impl From<tasksync_protocol::ProtocolError> for SyncError {
    fn from(err: tasksync_protocol::ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

/// Errors raised by the record store and mutation queue.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload could not be (de)serialized.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row holds a value the engine cannot interpret.
    #[error("corrupt {table} row: {message}")]
    Corrupt {
        /// Table name.
        table: &'static str,
        /// What was wrong.
        message: String,
    },

    /// The database was written by a newer schema.
    #[error("unsupported schema version {found}, latest supported is {latest}")]
    UnsupportedSchema {
        /// Version found on disk.
        found: u32,
        /// Latest version this build knows.
        latest: u32,
    },

    /// A store unit returned without running its work.
    #[error("store unit did not run")]
    UnitNotRun,
}

impl StoreError {
    /// Creates a corrupt-row error.
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::network("connection refused").is_retryable());
        assert!(SyncError::timeout("15s elapsed").is_retryable());
        assert!(SyncError::Protocol("bad body".into()).is_retryable());
        assert!(!SyncError::Validation("title".into()).is_retryable());
        assert!(!SyncError::NotFound("t-1".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotFound("abc".into());
        assert_eq!(err.to_string(), "task not found: abc");

        let err = SyncError::timeout("deadline exceeded");
        assert!(err.is_network());
        assert_eq!(err.to_string(), "network error: deadline exceeded");

        let err = StoreError::corrupt("tasks", "bad timestamp");
        assert_eq!(err.to_string(), "corrupt tasks row: bad timestamp");
    }
}
