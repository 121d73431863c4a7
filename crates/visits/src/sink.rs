//! Visit sink - ordered, append-only record of emitted visits
//!
//! Backed by a watch channel so waiters wake on every append without polling.

use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Result, VisitError};
use crate::visit::Visit;

#[derive(Debug, Clone)]
pub struct VisitLog {
    tx: Arc<watch::Sender<Vec<Visit>>>,
}

impl VisitLog {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    /// Append in emission order
    pub fn push(&self, visit: Visit) {
        self.tx.send_modify(|visits| visits.push(visit));
    }

    /// Snapshot of everything recorded so far
    pub fn visits(&self) -> Vec<Visit> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Receiver notified on every append
    pub fn subscribe(&self) -> watch::Receiver<Vec<Visit>> {
        self.tx.subscribe()
    }

    /// Wait until at least `count` visits exist
    pub async fn wait_for_len(&self, count: usize, timeout: Duration) -> Result<Vec<Visit>> {
        let mut rx = self.tx.subscribe();
        let reached = rx
            .wait_for(|visits| visits.len() >= count)
            .map(|visits| visits.map(|snapshot| Vec::clone(&snapshot)));
        let outcome = tokio::time::timeout(timeout, reached).await;
        match outcome {
            Ok(Ok(visits)) => Ok(visits),
            Ok(Err(_)) => Err(VisitError::ObserverClosed),
            Err(_) => Err(VisitError::Timeout {
                expected: count,
                actual: self.len(),
            }),
        }
    }
}

impl Default for VisitLog {
    fn default() -> Self {
        Self::new()
    }
}
