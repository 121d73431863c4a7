//! Visit records emitted by the segmenter
//!
//! A `Visit` is built once, when the page it describes is navigated away
//! from, and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::types::{PageTransition, SourceId};

/// One completed page visit, ended by the navigation to `url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub prev_page: PageVisitInfo,
    pub navigation: NavigationInfo,
    pub url: Url,
}

/// What happened on a page while it was current
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVisitInfo {
    /// `None` for the blank page that existed before observation started
    pub url: Option<Url>,
    pub source_id: SourceId,
    pub had_qualifying_storage_access: bool,
    pub received_user_activation: bool,
    pub had_successful_webauthn_assertion: bool,
    pub visit_duration: Duration,
}

impl PageVisitInfo {
    /// The blank page seen when observation starts before any navigation
    pub fn blank(visit_duration: Duration) -> Self {
        Self {
            url: None,
            source_id: SourceId::BLANK,
            had_qualifying_storage_access: false,
            received_user_activation: false,
            had_successful_webauthn_assertion: false,
            visit_duration,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.url.is_none() && self.source_id == SourceId::BLANK
    }
}

/// The navigation that ended a visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationInfo {
    pub server_redirects: Vec<ServerRedirectInfo>,
    pub page_transition: PageTransition,
    pub was_renderer_initiated: bool,
    pub was_user_initiated: bool,
}

/// One network-level redirect hop before the commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRedirectInfo {
    pub url: Url,
    pub source_id: SourceId,
    pub did_write_cookies: bool,
}
