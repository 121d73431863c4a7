//! Visit listeners - consumers notified of each finished visit
//!
//! Listeners see visits in emission order. A slow listener delays the
//! next event, never reorders it. A panicking listener is logged and skipped.

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::visit::Visit;

#[async_trait]
pub trait VisitListener: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Called once per emitted visit
    async fn on_visit(&self, visit: &Visit);
}

/// Fans a visit out to every registered listener
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<Box<dyn VisitListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn VisitListener>) {
        tracing::debug!("[Listeners] Registered listener: {}", listener.name());
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver to all listeners concurrently, returning once all are done
    pub async fn dispatch(&self, visit: Arc<Visit>) {
        if self.listeners.is_empty() {
            return;
        }
        let deliveries: Vec<_> = self
            .listeners
            .iter()
            .map(|listener| {
                let visit = visit.clone();
                async move {
                    let delivery = AssertUnwindSafe(listener.on_visit(&visit)).catch_unwind();
                    if delivery.await.is_err() {
                        tracing::warn!(
                            "[Listeners] Listener {} panicked on visit to {}",
                            listener.name(),
                            visit.url
                        );
                    }
                }
            })
            .collect();

        join_all(deliveries).await;
    }
}
