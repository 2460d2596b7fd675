//! Connectivity probe.

use crate::transport::SyncTransport;
use std::sync::Arc;
use tracing::debug;

/// Best-effort liveness check against the remote authority.
pub struct ConnectivityProbe<T: SyncTransport> {
    transport: Arc<T>,
}

impl<T: SyncTransport> ConnectivityProbe<T> {
    /// Creates a probe over `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Returns true if the remote endpoint answered the health call.
    ///
    /// Never fails; every error reads as unreachable.
    pub fn is_reachable(&self) -> bool {
        match self.transport.health() {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "remote endpoint unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn follows_health() {
        let transport = Arc::new(MockTransport::new());
        let probe = ConnectivityProbe::new(Arc::clone(&transport));
        assert!(probe.is_reachable());
        transport.set_healthy(false);
        assert!(!probe.is_reachable());
        assert_eq!(transport.batch_calls(), 0);
    }
}
