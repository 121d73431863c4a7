//! Redirect Chain Builder - server redirect hops of the in-flight navigation
//!
//! Only one top-level navigation can be in flight at a time. A hop for a
//! newer navigation means the old one was superseded, so the buffer restarts.
//! Navigation ids increase monotonically. Once a navigation commits, is
//! cancelled or is superseded, it and every older id are retired; events for
//! retired ids, or for ids older than the one in flight, are stale and dropped.

use url::Url;

use crate::resolver::PendingSourceId;
use crate::types::NavigationId;
use crate::visit::ServerRedirectInfo;

/// A recorded hop whose source id may still be resolving
#[derive(Debug)]
pub struct PendingRedirect {
    pub url: Url,
    pub source_id: PendingSourceId,
    pub did_write_cookies: bool,
}

impl PendingRedirect {
    pub fn settle(self) -> ServerRedirectInfo {
        ServerRedirectInfo {
            url: self.url,
            source_id: self.source_id.settle(),
            did_write_cookies: self.did_write_cookies,
        }
    }
}

/// Tracks the single in-flight top-level navigation
#[derive(Debug)]
struct InFlightNavigation {
    navigation: NavigationId,
    hops: Vec<PendingRedirect>,
    /// The final response (not a hop) set a cookie
    response_wrote_cookies: bool,
}

impl InFlightNavigation {
    fn new(navigation: NavigationId) -> Self {
        Self {
            navigation,
            hops: Vec::new(),
            response_wrote_cookies: false,
        }
    }
}

/// Everything gathered for a navigation up to its commit
#[derive(Debug, Default)]
pub struct CommittedChain {
    pub hops: Vec<PendingRedirect>,
    pub response_wrote_cookies: bool,
}

impl CommittedChain {
    pub fn into_server_redirects(self) -> Vec<ServerRedirectInfo> {
        self.hops.into_iter().map(PendingRedirect::settle).collect()
    }
}

#[derive(Debug, Default)]
pub struct RedirectChainBuilder {
    in_flight: Option<InFlightNavigation>,
    /// Highest navigation id that can no longer collect hops
    retired_through: Option<NavigationId>,
}

impl RedirectChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a tab whose current document was committed by `committed`
    pub fn after(committed: Option<NavigationId>) -> Self {
        Self {
            in_flight: None,
            retired_through: committed,
        }
    }

    /// True for navigations that are retired or older than the one in flight
    pub fn is_stale(&self, navigation: NavigationId) -> bool {
        self.retired_through
            .is_some_and(|retired| navigation <= retired)
            || self
                .in_flight
                .as_ref()
                .is_some_and(|tracked| navigation < tracked.navigation)
    }

    fn retire(&mut self, navigation: NavigationId) {
        self.retired_through = Some(
            self.retired_through
                .map_or(navigation, |retired| retired.max(navigation)),
        );
    }

    /// Index the next hop of `navigation` would get
    pub fn next_hop_index(&self, navigation: NavigationId) -> usize {
        match &self.in_flight {
            Some(tracked) if tracked.navigation == navigation => tracked.hops.len(),
            _ => 0,
        }
    }

    /// Entry for `navigation`, replacing an older one it supersedes.
    ///
    /// Callers check `is_stale` first, so `navigation` is never older than
    /// the tracked one.
    fn track(&mut self, navigation: NavigationId) -> &mut InFlightNavigation {
        let superseded = self
            .in_flight
            .as_ref()
            .is_some_and(|tracked| tracked.navigation < navigation);
        if superseded {
            if let Some(old) = self.in_flight.take() {
                tracing::debug!(
                    "[RedirectChain] Navigation {:?} superseded by {:?}, dropping {} hops",
                    old.navigation,
                    navigation,
                    old.hops.len()
                );
                self.retire(old.navigation);
            }
        }
        self.in_flight
            .get_or_insert_with(|| InFlightNavigation::new(navigation))
    }

    /// Append a hop. Returns false if the navigation is stale.
    pub fn record_hop(&mut self, navigation: NavigationId, hop: PendingRedirect) -> bool {
        if self.is_stale(navigation) {
            tracing::debug!(
                "[RedirectChain] Ignoring hop for stale navigation {:?}: {}",
                navigation,
                hop.url
            );
            return false;
        }
        self.track(navigation).hops.push(hop);
        true
    }

    /// Remember that the navigation's final response wrote cookies
    pub fn record_cookie_write(&mut self, navigation: NavigationId) -> bool {
        if self.is_stale(navigation) {
            tracing::debug!(
                "[RedirectChain] Ignoring cookie write for stale navigation {:?}",
                navigation
            );
            return false;
        }
        self.track(navigation).response_wrote_cookies = true;
        true
    }

    /// Drop the chain if `navigation` is the one in flight
    pub fn cancel(&mut self, navigation: NavigationId) -> bool {
        if self.in_flight() != Some(navigation) {
            return false;
        }
        let dropped = self.in_flight.take().map_or(0, |tracked| tracked.hops.len());
        self.retire(navigation);
        tracing::debug!(
            "[RedirectChain] Navigation {:?} cancelled, dropping {} hops",
            navigation,
            dropped
        );
        true
    }

    /// Hand over the chain for `navigation` and clear the buffer.
    ///
    /// A chain that belongs to a different navigation is discarded.
    pub fn take_for_commit(&mut self, navigation: NavigationId) -> CommittedChain {
        self.retire(navigation);
        match self.in_flight.take() {
            Some(tracked) if tracked.navigation == navigation => CommittedChain {
                hops: tracked.hops,
                response_wrote_cookies: tracked.response_wrote_cookies,
            },
            Some(other) => {
                tracing::debug!(
                    "[RedirectChain] Commit of {:?} discards chain of {:?}",
                    navigation,
                    other.navigation
                );
                CommittedChain::default()
            }
            None => CommittedChain::default(),
        }
    }

    /// Navigation currently being tracked
    pub fn in_flight(&self) -> Option<NavigationId> {
        self.in_flight.as_ref().map(|tracked| tracked.navigation)
    }

    /// Hops buffered so far (for testing)
    pub fn len(&self) -> usize {
        self.in_flight.as_ref().map_or(0, |tracked| tracked.hops.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
