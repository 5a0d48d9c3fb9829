/// Anomaly Guard
///
/// Compares the presented origin address with the bound one and, on a
/// mismatch, dispatches an alert without waiting for it.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::notification::Notifier;

#[derive(Clone)]
pub struct AnomalyGuard {
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl AnomalyGuard {
    pub fn new(notifier: Arc<dyn Notifier>, notify_timeout: Duration) -> Self {
        Self {
            notifier,
            notify_timeout,
        }
    }

    /// Returns `true` when `presented` matches `stored`.
    ///
    /// On mismatch the alert is spawned onto the runtime; its outcome is
    /// only logged. Must be called from within a tokio runtime.
    pub fn check(&self, identity: Uuid, stored: IpAddr, presented: IpAddr) -> bool {
        if stored == presented {
            return true;
        }

        tracing::warn!(
            identity = %identity,
            bound = %stored,
            presented = %presented,
            "Origin address mismatch"
        );

        let notifier = Arc::clone(&self.notifier);
        let notify_timeout = self.notify_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(notify_timeout, notifier.notify(identity, presented)).await {
                Ok(Ok(())) => {
                    tracing::info!(identity = %identity, "Anomaly alert dispatched");
                }
                Ok(Err(e)) => {
                    tracing::error!(identity = %identity, error = %e, "Failed to dispatch anomaly alert");
                }
                Err(_) => {
                    tracing::error!(identity = %identity, "Anomaly alert timed out");
                }
            }
        });

        false
    }
}
