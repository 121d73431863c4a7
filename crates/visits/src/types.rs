//! Identifier and tag types shared by events and visit records
//!
//! These are the fundamental types for talking to the browser side.
//! The engine never looks inside an id - it only compares them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame ID from the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

/// One committed top-level document.
///
/// Every cross-document commit in the top-level frame yields a fresh `PageId`;
/// frames embedded in that document report the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Navigation ID - monotonically increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NavigationId(pub u64);

/// Opaque per-page telemetry token.
///
/// Two values are reserved: [`SourceId::BLANK`] for the page that existed
/// before the first observed navigation, and [`SourceId::UNKNOWN`] when
/// resolution did not finish before the page was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(i64);

impl SourceId {
    pub const BLANK: SourceId = SourceId(0);
    pub const UNKNOWN: SourceId = SourceId(-1);

    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    /// True for `BLANK` and `UNKNOWN`
    pub fn is_sentinel(self) -> bool {
        self == Self::BLANK || self == Self::UNKNOWN
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BLANK => f.write_str("blank"),
            Self::UNKNOWN => f.write_str("unknown"),
            SourceId(raw) => write!(f, "{}", raw),
        }
    }
}

/// Core transition type of a committed navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageTransition {
    Link,
    Typed,
    AutoBookmark,
    AutoSubframe,
    ManualSubframe,
    Generated,
    AutoToplevel,
    FormSubmit,
    Reload,
    Keyword,
    KeywordGenerated,
}

impl Default for PageTransition {
    /// Browser-initiated loads (address bar, test harness) are typed.
    fn default() -> Self {
        Self::Typed
    }
}

/// Site storage APIs whose use counts as active storage access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    LocalStorage,
    SessionStorage,
    CacheStorage,
    FileSystem,
    IndexedDb,
}

/// Cookie access direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieOperation {
    Read,
    Change,
}

impl CookieOperation {
    pub fn is_write(self) -> bool {
        matches!(self, Self::Change)
    }
}
