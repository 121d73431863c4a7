//! Page events - the single ingestion surface of the engine
//!
//! Design: one tagged enum, every variant carries the frame it came from.
//! No per-event-kind callback traits - use enums, not trait objects.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::frame::FrameContext;
use crate::types::{CookieOperation, NavigationId, PageTransition, StorageKind};

/// Browsing events reported for one observed page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PageEvent {
    NavigationCommit(NavigationCommit),
    ServerRedirect {
        navigation: NavigationId,
        frame: FrameContext,
        /// URL that answered with the redirect
        url: Url,
        set_cookie_present: bool,
    },
    NavigationCancelled {
        navigation: NavigationId,
        frame: FrameContext,
    },
    StorageAccess {
        frame: FrameContext,
        kind: StorageKind,
    },
    CookieAccess {
        target: CookieTarget,
        op: CookieOperation,
    },
    UserActivation {
        frame: FrameContext,
    },
    WebAuthnResult {
        frame: FrameContext,
        success: bool,
    },
}

impl PageEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NavigationCommit(_) => "navigation_commit",
            Self::ServerRedirect { .. } => "server_redirect",
            Self::NavigationCancelled { .. } => "navigation_cancelled",
            Self::StorageAccess { .. } => "storage_access",
            Self::CookieAccess { .. } => "cookie_access",
            Self::UserActivation { .. } => "user_activation",
            Self::WebAuthnResult { .. } => "webauthn_result",
        }
    }
}

/// Who touched the cookie jar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CookieTarget {
    /// Script or subresource access from a live document
    Frame(FrameContext),
    /// Cookie headers on a navigation request or response
    Navigation {
        navigation: NavigationId,
        frame: FrameContext,
    },
}

/// A navigation that committed in some frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationCommit {
    pub navigation: NavigationId,
    /// Frame that navigated; for a cross-document top-level commit its `page`
    /// is the new document.
    pub frame: FrameContext,
    pub url: Url,
    pub is_same_document: bool,
    pub transition: PageTransition,
    pub renderer_initiated: bool,
    pub has_user_gesture: bool,
}

impl NavigationCommit {
    /// A browser-initiated, cross-document commit (address bar style)
    pub fn new(navigation: NavigationId, frame: FrameContext, url: Url) -> Self {
        Self {
            navigation,
            frame,
            url,
            is_same_document: false,
            transition: PageTransition::default(),
            renderer_initiated: false,
            has_user_gesture: false,
        }
    }

    pub fn same_document(mut self) -> Self {
        self.is_same_document = true;
        self
    }

    /// Mark as started by the page itself (link click, script, meta refresh)
    pub fn from_renderer(mut self, has_user_gesture: bool) -> Self {
        self.renderer_initiated = true;
        self.has_user_gesture = has_user_gesture;
        self
    }

    pub fn with_transition(mut self, transition: PageTransition) -> Self {
        self.transition = transition;
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.frame.is_primary_main_frame()
    }

    /// Browser-initiated navigations always count as user initiated
    pub fn was_user_initiated(&self) -> bool {
        !self.renderer_initiated || self.has_user_gesture
    }
}

impl From<NavigationCommit> for PageEvent {
    fn from(commit: NavigationCommit) -> Self {
        PageEvent::NavigationCommit(commit)
    }
}
