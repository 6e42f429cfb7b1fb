// StopSignal - cooperative cancellation latch
//
// A boolean that starts false and can only ever become true. Every poller
// (worker loop, bridge, pipe pumps) checks it on its own schedule; nothing is
// ever interrupted from the outside.

use std::sync::Arc;
use tokio::sync::watch;

/// Idempotent, monotonic stop latch shared by every component of a session.
///
/// Clones share the same latch. Synchronous pollers use [`is_set`](Self::is_set);
/// async tasks can await [`wait`](Self::wait) instead of polling.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Latch the signal.
    ///
    /// Returns `true` only for the call that actually flipped it; later calls
    /// are no-ops.
    pub fn set(&self) -> bool {
        let flipped = self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });

        if flipped {
            tracing::debug!("Stop signal set");
        }
        flipped
    }

    /// Non-blocking read of the latch
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the latch is set (immediately if it already is).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_starts_clear() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
    }

    #[test]
    fn test_set_is_idempotent() {
        let stop = StopSignal::new();
        assert!(stop.set());
        assert!(!stop.set());
        assert!(!stop.set());
        assert!(stop.is_set());
    }

    #[test]
    fn test_clones_share_latch() {
        let stop = StopSignal::new();
        let other = stop.clone();
        other.set();
        assert!(stop.is_set());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_set() {
        let stop = StopSignal::new();
        let setter = stop.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set();
        });

        tokio::time::timeout(Duration::from_secs(1), stop.wait())
            .await
            .expect("wait() should resolve after set()");
    }

    #[tokio::test]
    async fn test_wait_when_already_set() {
        let stop = StopSignal::new();
        stop.set();
        tokio::time::timeout(Duration::from_millis(50), stop.wait())
            .await
            .expect("wait() should resolve immediately");
    }
}
