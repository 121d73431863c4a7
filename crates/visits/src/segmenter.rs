//! Visit Segmenter - turns a page's event stream into visits
//!
//! ```text
//!   NoCurrentPage ──top-level commit──► HasCurrentPage(A)
//!                                          │  storage / cookie / activation /
//!                                          │  webauthn events mutate A
//!                                          ▼
//!                        top-level commit: emit Visit{prev: A, url: B},
//!                                          HasCurrentPage(B)
//! ```
//!
//! The segmenter is plain synchronous state. It is owned by exactly one
//! consumer (see [`crate::observer`]), so nothing here needs a lock, and a
//! visit is finalized and its successor started inside one `handle` call.

use std::mem;
use std::sync::Arc;
use std::time::SystemTime;
use url::Url;

use crate::clock::{self, Clock};
use crate::events::{CookieTarget, NavigationCommit, PageEvent};
use crate::frame::{Attribution, FrameContext};
use crate::redirect::{PendingRedirect, RedirectChainBuilder};
use crate::resolver::{PendingSourceId, ResolveTarget, SourceIdResolver};
use crate::types::{CookieOperation, NavigationId, PageId};
use crate::visit::{NavigationInfo, PageVisitInfo, Visit};

/// A document that was already loaded when observation started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub page: PageId,
    pub url: Url,
    /// Navigation that committed it, if the browser still knows
    pub navigation: Option<NavigationId>,
}

/// Per-page flags that side-channel events can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    StorageAccess,
    UserActivation,
    WebAuthnAssertion,
}

/// Accumulating state of the page that is current right now
#[derive(Debug)]
struct CurrentPage {
    page: PageId,
    committed_by: Option<NavigationId>,
    url: Url,
    source_id: PendingSourceId,
    started_at: SystemTime,
    had_qualifying_storage_access: bool,
    received_user_activation: bool,
    had_successful_webauthn_assertion: bool,
}

impl CurrentPage {
    fn start(
        resolver: &Arc<dyn SourceIdResolver>,
        page: PageId,
        url: Url,
        committed_by: Option<NavigationId>,
        started_at: SystemTime,
    ) -> Self {
        let source_id = PendingSourceId::start(
            resolver,
            ResolveTarget::Document {
                page,
                url: url.clone(),
            },
        );
        Self {
            page,
            committed_by,
            url,
            source_id,
            started_at,
            had_qualifying_storage_access: false,
            received_user_activation: false,
            had_successful_webauthn_assertion: false,
        }
    }

    fn mark(&mut self, signal: Signal) {
        match signal {
            Signal::StorageAccess => self.had_qualifying_storage_access = true,
            Signal::UserActivation => self.received_user_activation = true,
            Signal::WebAuthnAssertion => self.had_successful_webauthn_assertion = true,
        }
    }

    fn finalize(self, now: SystemTime) -> PageVisitInfo {
        PageVisitInfo {
            url: Some(self.url),
            source_id: self.source_id.settle(),
            had_qualifying_storage_access: self.had_qualifying_storage_access,
            received_user_activation: self.received_user_activation,
            had_successful_webauthn_assertion: self.had_successful_webauthn_assertion,
            visit_duration: clock::elapsed(self.started_at, now),
        }
    }
}

#[derive(Debug)]
enum SegmenterState {
    /// Attached before any document; the blank page has been current `since`
    NoCurrentPage { since: SystemTime },
    HasCurrentPage(CurrentPage),
}

pub struct VisitSegmenter {
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn SourceIdResolver>,
    redirects: RedirectChainBuilder,
    state: SegmenterState,
    dropped: u64,
}

impl VisitSegmenter {
    /// Start segmenting. `existing` is the document already loaded, if any.
    pub fn new(
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn SourceIdResolver>,
        existing: Option<DocumentInfo>,
    ) -> Self {
        let now = clock.now();
        // Anything up to the navigation that loaded the current document is done
        let redirects =
            RedirectChainBuilder::after(existing.as_ref().and_then(|doc| doc.navigation));
        let state = match existing {
            Some(doc) => SegmenterState::HasCurrentPage(CurrentPage::start(
                &resolver,
                doc.page,
                doc.url,
                doc.navigation,
                now,
            )),
            None => SegmenterState::NoCurrentPage { since: now },
        };
        Self {
            clock,
            resolver,
            redirects,
            state,
            dropped: 0,
        }
    }

    /// Apply one event. Returns the visit it completed, if any.
    pub fn handle(&mut self, event: PageEvent) -> Option<Visit> {
        match event {
            PageEvent::NavigationCommit(commit) => return self.on_navigation_commit(commit),
            PageEvent::ServerRedirect {
                navigation,
                frame,
                url,
                set_cookie_present,
            } => self.on_server_redirect(navigation, &frame, url, set_cookie_present),
            PageEvent::NavigationCancelled { navigation, frame } => {
                if frame.is_primary_main_frame() {
                    self.redirects.cancel(navigation);
                }
            }
            PageEvent::StorageAccess { frame, kind } => {
                tracing::trace!("[VisitSegmenter] {:?} access from {:?}", kind, frame.frame);
                self.mark_frame(&frame, Signal::StorageAccess);
            }
            PageEvent::CookieAccess { target, op } => self.on_cookie_access(target, op),
            PageEvent::UserActivation { frame } => {
                self.mark_frame(&frame, Signal::UserActivation);
            }
            PageEvent::WebAuthnResult { frame, success } => {
                if success {
                    self.mark_frame(&frame, Signal::WebAuthnAssertion);
                } else {
                    tracing::debug!(
                        "[VisitSegmenter] Ignoring failed WebAuthn assertion in {:?}",
                        frame.frame
                    );
                }
            }
        }
        None
    }

    fn on_navigation_commit(&mut self, commit: NavigationCommit) -> Option<Visit> {
        if !commit.is_top_level() {
            tracing::debug!(
                "[VisitSegmenter] Ignoring commit in non-top-level frame {:?}: {}",
                commit.frame.frame,
                commit.url
            );
            return None;
        }
        if commit.is_same_document {
            tracing::debug!("[VisitSegmenter] Same-document navigation to {}", commit.url);
            return None;
        }

        let now = self.clock.now();
        let chain = self.redirects.take_for_commit(commit.navigation);

        let mut next = CurrentPage::start(
            &self.resolver,
            commit.frame.page,
            commit.url.clone(),
            Some(commit.navigation),
            now,
        );
        // Cookies set by the response that created the document belong to it
        next.had_qualifying_storage_access = chain.response_wrote_cookies;

        let prev_page = match mem::replace(&mut self.state, SegmenterState::HasCurrentPage(next)) {
            SegmenterState::NoCurrentPage { since } => {
                PageVisitInfo::blank(clock::elapsed(since, now))
            }
            SegmenterState::HasCurrentPage(current) => current.finalize(now),
        };

        let visit = Visit {
            prev_page,
            navigation: NavigationInfo {
                page_transition: commit.transition,
                was_renderer_initiated: commit.renderer_initiated,
                was_user_initiated: commit.was_user_initiated(),
                server_redirects: chain.into_server_redirects(),
            },
            url: commit.url,
        };
        tracing::debug!(
            "[VisitSegmenter] Visit complete: {} -> {} ({} redirects, {:?})",
            visit
                .prev_page
                .url
                .as_ref()
                .map_or("<blank>", |url| url.as_str()),
            visit.url,
            visit.navigation.server_redirects.len(),
            visit.prev_page.visit_duration
        );
        Some(visit)
    }

    fn on_server_redirect(
        &mut self,
        navigation: NavigationId,
        frame: &FrameContext,
        url: Url,
        set_cookie_present: bool,
    ) {
        if !frame.is_primary_main_frame() {
            tracing::debug!(
                "[VisitSegmenter] Ignoring redirect in non-top-level frame {:?}: {}",
                frame.frame,
                url
            );
            return;
        }
        if self.redirects.is_stale(navigation) {
            tracing::debug!(
                "[VisitSegmenter] Ignoring redirect reported after commit of {:?}: {}",
                navigation,
                url
            );
            self.dropped += 1;
            return;
        }

        let index = self.redirects.next_hop_index(navigation);
        let source_id = PendingSourceId::start(
            &self.resolver,
            ResolveTarget::RedirectHop {
                navigation,
                index,
                url: url.clone(),
            },
        );
        self.redirects.record_hop(
            navigation,
            PendingRedirect {
                url,
                source_id,
                did_write_cookies: set_cookie_present,
            },
        );
    }

    fn on_cookie_access(&mut self, target: CookieTarget, op: CookieOperation) {
        // Reads are passive and never qualify
        if !op.is_write() {
            return;
        }
        match target {
            CookieTarget::Navigation { navigation, frame } if frame.is_primary_main_frame() => {
                self.on_navigation_cookie_write(navigation)
            }
            CookieTarget::Navigation { frame, .. } | CookieTarget::Frame(frame) => {
                self.mark_frame(&frame, Signal::StorageAccess);
            }
        }
    }

    fn on_navigation_cookie_write(&mut self, navigation: NavigationId) {
        if let SegmenterState::HasCurrentPage(current) = &mut self.state {
            if current.committed_by == Some(navigation) {
                current.mark(Signal::StorageAccess);
                return;
            }
        }
        if !self.redirects.record_cookie_write(navigation) {
            tracing::debug!(
                "[VisitSegmenter] Dropping cookie write for finished navigation {:?}",
                navigation
            );
            self.dropped += 1;
        }
    }

    /// Route a frame event through the attribution filter to the current page
    fn mark_frame(&mut self, frame: &FrameContext, signal: Signal) -> bool {
        let page = match frame.attribute() {
            Attribution::Attributable(page) => page,
            Attribution::NotAttributable(reason) => {
                tracing::debug!(
                    "[VisitSegmenter] Dropping {:?} from frame {:?} at depth {}: {:?}",
                    signal,
                    frame.frame,
                    frame.depth(),
                    reason
                );
                self.dropped += 1;
                return false;
            }
        };

        match &mut self.state {
            SegmenterState::HasCurrentPage(current) if current.page == page => {
                current.mark(signal);
                true
            }
            _ => {
                tracing::debug!(
                    "[VisitSegmenter] Dropping orphaned {:?} for page {:?}",
                    signal,
                    page
                );
                self.dropped += 1;
                false
            }
        }
    }

    /// Page that events are currently attributed to
    pub fn current_page(&self) -> Option<PageId> {
        match &self.state {
            SegmenterState::HasCurrentPage(current) => Some(current.page),
            SegmenterState::NoCurrentPage { .. } => None,
        }
    }

    pub fn current_url(&self) -> Option<&Url> {
        match &self.state {
            SegmenterState::HasCurrentPage(current) => Some(&current.url),
            SegmenterState::NoCurrentPage { .. } => None,
        }
    }

    /// Events filtered out or orphaned so far
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    /// Hops buffered for the in-flight navigation
    pub fn pending_redirects(&self) -> usize {
        self.redirects.len()
    }
}
