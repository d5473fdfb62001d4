use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

/// Count of requests currently in flight, shared by everything that goes
/// through one gateway. Observers subscribe and see every change; the busy
/// indicator is on while the count is above zero.
///
/// Only the gateway moves the count, through [`PendingCounter::begin`]; the
/// returned guard decrements on drop, so completion, failure, timeout and
/// cancellation all release their slot. Decrements saturate at zero.
#[derive(Debug, Clone)]
pub struct PendingCounter {
    tx: Arc<watch::Sender<usize>>,
}

impl PendingCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.count() > 0
    }

    /// Receive the current count now and after every change.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    pub(crate) fn begin(&self) -> PendingGuard {
        self.tx.send_modify(|count| *count += 1);
        trace!("pending requests: {}", self.count());
        PendingGuard {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl Default for PendingCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// One in-flight request.
#[derive(Debug)]
pub(crate) struct PendingGuard {
    tx: Arc<watch::Sender<usize>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|count| *count = count.saturating_sub(1));
        trace!("pending requests: {}", *self.tx.borrow());
    }
}
