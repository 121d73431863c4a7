//! Telemetry source-id resolution
//!
//! The engine treats source ids as opaque tokens handed out by an external
//! recorder. Resolution may be asynchronous; the engine never waits for it.
//! A resolver future gets polled once in place, and only spawned when that
//! first poll is not enough. Whatever has not arrived by the time the page is
//! finalized becomes [`SourceId::UNKNOWN`].

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

use crate::types::{NavigationId, PageId, SourceId};

/// What a source id is being asked for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolveTarget {
    /// A committed top-level document
    Document { page: PageId, url: Url },
    /// The `index`-th redirect hop of a top-level navigation
    RedirectHop {
        navigation: NavigationId,
        index: usize,
        url: Url,
    },
}

/// External telemetry-id lookup
#[async_trait]
pub trait SourceIdResolver: Send + Sync {
    /// `None` means the recorder has no id for this target
    async fn resolve(&self, target: &ResolveTarget) -> Option<SourceId>;
}

/// Reference resolver: mints ids from a counter and remembers them.
///
/// Asking twice for the same target returns the same id, so consumers can
/// match visit records against [`SequentialSourceIds::lookup`].
#[derive(Debug)]
pub struct SequentialSourceIds {
    next: AtomicI64,
    assigned: DashMap<ResolveTarget, SourceId>,
}

impl SequentialSourceIds {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
            assigned: DashMap::new(),
        }
    }

    /// Id previously handed out for `target`, if any
    pub fn lookup(&self, target: &ResolveTarget) -> Option<SourceId> {
        self.assigned.get(target).map(|entry| *entry.value())
    }

    pub fn document_id(&self, page: PageId, url: &Url) -> Option<SourceId> {
        self.lookup(&ResolveTarget::Document {
            page,
            url: url.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

impl Default for SequentialSourceIds {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceIdResolver for SequentialSourceIds {
    async fn resolve(&self, target: &ResolveTarget) -> Option<SourceId> {
        let id = *self
            .assigned
            .entry(target.clone())
            .or_insert_with(|| SourceId::new(self.next.fetch_add(1, Ordering::Relaxed)));
        Some(id)
    }
}

type Resolution = Pin<Box<dyn Future<Output = Option<SourceId>> + Send>>;

/// A source id that may still be on its way
#[derive(Debug)]
pub enum PendingSourceId {
    Ready(SourceId),
    Resolving(JoinHandle<Option<SourceId>>),
}

impl PendingSourceId {
    /// Kick off resolution without blocking the caller
    pub fn start(resolver: &Arc<dyn SourceIdResolver>, target: ResolveTarget) -> Self {
        let resolver = Arc::clone(resolver);
        let mut resolution: Resolution = Box::pin(async move { resolver.resolve(&target).await });

        if let Some(resolved) = resolution.as_mut().now_or_never() {
            return Self::Ready(resolved.unwrap_or(SourceId::UNKNOWN));
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Self::Resolving(runtime.spawn(resolution)),
            Err(_) => {
                tracing::debug!("[SourceIds] No runtime to finish resolution, using unknown id");
                Self::Ready(SourceId::UNKNOWN)
            }
        }
    }

    /// True once `settle` would return without discarding work
    pub fn is_settled(&self) -> bool {
        match self {
            Self::Ready(_) => true,
            Self::Resolving(handle) => handle.is_finished(),
        }
    }

    /// Take whatever is available now; unfinished work becomes `UNKNOWN`
    pub fn settle(self) -> SourceId {
        match self {
            Self::Ready(id) => id,
            Self::Resolving(handle) => {
                if !handle.is_finished() {
                    tracing::debug!("[SourceIds] Resolution still pending at finalization");
                    handle.abort();
                    return SourceId::UNKNOWN;
                }
                match handle.now_or_never() {
                    Some(Ok(Some(id))) => id,
                    _ => SourceId::UNKNOWN,
                }
            }
        }
    }
}
