//! Page Visit Observer - binds one segmenter to one page's event stream
//!
//! ```text
//!   EventSender ─┐
//!   EventSender ─┼─► mpsc (FIFO) ─► consumer task ─► VisitSegmenter
//!   Handle ──────┘                        │
//!                                         ├─► VisitLog (watch)
//!                                         └─► ListenerSet
//! ```
//!
//! The consumer task owns the segmenter outright. Submitters only ever
//! touch the queue, so event processing needs no locks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, VisitError};
use crate::events::PageEvent;
use crate::listener::{ListenerSet, VisitListener};
use crate::resolver::SourceIdResolver;
use crate::segmenter::{DocumentInfo, VisitSegmenter};
use crate::sink::VisitLog;
use crate::visit::Visit;

/// Listener fan-out slower than this gets a warning
const SLOW_DISPATCH: Duration = Duration::from_millis(500);

/// The page being observed, as seen at attach time
pub trait ObservedPage: Send + Sync {
    /// False once the page has been torn down
    fn is_alive(&self) -> bool;

    /// The document already committed in the top-level frame, if any
    fn committed_document(&self) -> Option<DocumentInfo>;
}

/// Observer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub id: String,
    /// Events that may wait in the queue before `send` applies backpressure
    pub queue_capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            queue_capacity: 1024,
        }
    }
}

impl ObserverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(VisitError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.id.is_empty() {
            return Err(VisitError::InvalidConfig("id must not be empty".to_string()));
        }
        Ok(())
    }
}

enum Command {
    Event(PageEvent),
    Register(Box<dyn VisitListener>),
    Flush(oneshot::Sender<()>),
}

/// Cloneable submission side of an observer's queue
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Command>,
}

impl EventSender {
    /// Enqueue, waiting for room if the queue is full
    pub async fn send(&self, event: PageEvent) -> Result<()> {
        self.tx
            .send(Command::Event(event))
            .await
            .map_err(|_| VisitError::ObserverClosed)
    }

    /// Enqueue without waiting
    pub fn try_send(&self, event: PageEvent) -> Result<()> {
        self.tx
            .try_send(Command::Event(event))
            .map_err(|err| match err {
                TrySendError::Full(_) => VisitError::QueueFull,
                TrySendError::Closed(_) => VisitError::ObserverClosed,
            })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side: owns the segmenter and everything fed by it
pub struct PageVisitObserver {
    id: String,
    segmenter: VisitSegmenter,
    log: VisitLog,
    listeners: ListenerSet,
}

impl PageVisitObserver {
    /// Attach to `page` using the wall clock.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(
        page: &dyn ObservedPage,
        resolver: Arc<dyn SourceIdResolver>,
        config: ObserverConfig,
    ) -> Result<ObserverHandle> {
        Self::attach_with_clock(page, resolver, config, Arc::new(SystemClock))
    }

    /// Attach with an injected clock
    pub fn attach_with_clock(
        page: &dyn ObservedPage,
        resolver: Arc<dyn SourceIdResolver>,
        config: ObserverConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<ObserverHandle> {
        config.validate()?;
        if !page.is_alive() {
            tracing::debug!("[VisitObserver] Refusing to attach {} to a torn-down page", config.id);
            return Err(VisitError::PageTornDown);
        }

        let existing = page.committed_document();
        match &existing {
            Some(doc) => tracing::info!("[VisitObserver] Attached {} on {}", config.id, doc.url),
            None => tracing::info!("[VisitObserver] Attached {} before first navigation", config.id),
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let log = VisitLog::new();
        let observer = Self {
            id: config.id.clone(),
            segmenter: VisitSegmenter::new(clock, resolver, existing),
            log: log.clone(),
            listeners: ListenerSet::new(),
        };
        let task = tokio::spawn(observer.run(rx, shutdown_rx));

        Ok(ObserverHandle {
            id: config.id,
            events: EventSender { tx },
            log,
            shutdown: shutdown_tx,
            task,
        })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.apply(command).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    // Stop accepting, then finish what was already queued
                    rx.close();
                    while let Some(command) = rx.recv().await {
                        self.apply(command).await;
                    }
                    break;
                }
            }
        }
        tracing::info!(
            "[VisitObserver] {} closed after {} visits ({} events dropped)",
            self.id,
            self.log.len(),
            self.segmenter.dropped_events()
        );
    }

    async fn apply(&mut self, command: Command) {
        match command {
            Command::Event(event) => {
                tracing::trace!("[VisitObserver] {} <- {}", self.id, event.kind());
                if let Some(visit) = self.segmenter.handle(event) {
                    self.emit(visit).await;
                }
            }
            Command::Register(listener) => self.listeners.register(listener),
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    async fn emit(&self, visit: Visit) {
        let visit = Arc::new(visit);
        self.log.push(Visit::clone(&visit));

        let started = tokio::time::Instant::now();
        self.listeners.dispatch(visit).await;
        let took = started.elapsed();
        if took > SLOW_DISPATCH {
            tracing::warn!(
                "[VisitObserver] {} listeners took {:?} for one visit",
                self.id,
                took
            );
        }
    }
}

/// Caller's side of an attached observer.
///
/// Dropping it closes the queue; events already queued are still processed.
pub struct ObserverHandle {
    id: String,
    events: EventSender,
    log: VisitLog,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Another submitter for the same queue
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    pub async fn send(&self, event: PageEvent) -> Result<()> {
        self.events.send(event).await
    }

    pub fn try_send(&self, event: PageEvent) -> Result<()> {
        self.events.try_send(event)
    }

    /// Register a listener. It sees visits emitted after everything queued
    /// before this call.
    pub async fn register(&self, listener: Box<dyn VisitListener>) -> Result<()> {
        self.events
            .tx
            .send(Command::Register(listener))
            .await
            .map_err(|_| VisitError::ObserverClosed)
    }

    /// Wait until every event enqueued before this call has been processed
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.events
            .tx
            .send(Command::Flush(ack_tx))
            .await
            .map_err(|_| VisitError::ObserverClosed)?;
        ack_rx.await.map_err(|_| VisitError::ObserverClosed)
    }

    pub fn visits(&self) -> Vec<Visit> {
        self.log.visits()
    }

    pub async fn wait_for_visits(&self, count: usize, timeout: Duration) -> Result<Vec<Visit>> {
        self.log.wait_for_len(count, timeout).await
    }

    pub fn log(&self) -> &VisitLog {
        &self.log
    }

    /// Close the queue, let the consumer drain it and return every visit
    pub async fn detach(self) -> Result<Vec<Visit>> {
        let Self {
            id,
            shutdown,
            task,
            log,
            ..
        } = self;
        drop(shutdown);
        task.await.map_err(|err| {
            tracing::warn!("[VisitObserver] {} consumer ended abnormally: {}", id, err);
            VisitError::ObserverClosed
        })?;
        tracing::info!("[VisitObserver] Detached {}", id);
        Ok(log.visits())
    }
}
