//! Frame contexts and the attribution filter
//!
//! Every side-channel event names the frame it came from. The filter decides
//! whether that frame speaks for the observed page:
//!
//! ```text
//! self ──► parent ──► ... ──► root
//!  │                           │
//!  └── any FencedFrame?  ──────┴── root is TopLevel / activated Prerendering?
//! ```
//!
//! Iframes at any depth count as the page they are embedded in. Fenced frames
//! and prerendered pages that have not been activated never do.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::iter;

use crate::types::{FrameId, PageId};

/// Kind of browsing context a frame lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// The outermost frame of the primary page
    TopLevel,
    /// A nested frame
    Iframe,
    /// Root of an isolated fenced frame tree
    FencedFrame,
    /// Root of a prerendered page
    Prerendering { activated: bool },
}

impl ContextKind {
    /// Contexts that can only appear at the root of an ancestry chain
    fn is_root(self) -> bool {
        matches!(self, Self::TopLevel | Self::Prerendering { .. })
    }
}

/// Frame descriptor attached to every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameContext {
    pub frame: FrameId,
    /// Top-level document this frame's tree belongs to
    pub page: PageId,
    pub kind: ContextKind,
    /// Ancestor kinds, parent first, root last
    pub ancestors: SmallVec<[ContextKind; 4]>,
}

/// Where a frame sits relative to the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    TopLevel,
    DescendantIframe { of: PageId },
    FencedFrameTree,
    PrerenderingTree { activated: bool },
}

/// Why an event was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    FencedFrame,
    InactivePrerender,
    MalformedAncestry,
}

/// Attribution filter verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Attributable(PageId),
    NotAttributable(Exclusion),
}

impl FrameContext {
    /// The top-level frame of `page`
    pub fn top_level(frame: FrameId, page: PageId) -> Self {
        Self {
            frame,
            page,
            kind: ContextKind::TopLevel,
            ancestors: SmallVec::new(),
        }
    }

    /// The root frame of a prerendered page
    pub fn prerendering(frame: FrameId, page: PageId, activated: bool) -> Self {
        Self {
            frame,
            page,
            kind: ContextKind::Prerendering { activated },
            ancestors: SmallVec::new(),
        }
    }

    /// A frame embedded directly inside this one
    pub fn child(&self, frame: FrameId, kind: ContextKind) -> Self {
        let mut ancestors = SmallVec::with_capacity(self.ancestors.len() + 1);
        ancestors.push(self.kind);
        ancestors.extend(self.ancestors.iter().copied());
        Self {
            frame,
            page: self.page,
            kind,
            ancestors,
        }
    }

    /// True only for the outermost frame of the primary page.
    ///
    /// Navigations anywhere else never end a visit.
    pub fn is_primary_main_frame(&self) -> bool {
        self.kind == ContextKind::TopLevel && self.ancestors.is_empty()
    }

    /// Nesting depth, 0 for a root frame
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Own kind followed by each ancestor's kind
    fn lineage(&self) -> impl Iterator<Item = ContextKind> + '_ {
        iter::once(self.kind).chain(self.ancestors.iter().copied())
    }

    /// Walk the ancestry and classify the frame.
    ///
    /// Returns `None` when the chain does not end in exactly one root context.
    pub fn classify(&self) -> Option<FrameClass> {
        let last = self.ancestors.len();
        for (depth, kind) in self.lineage().enumerate() {
            let is_last = depth == last;
            match kind {
                ContextKind::FencedFrame => return Some(FrameClass::FencedFrameTree),
                ContextKind::Iframe if is_last => return None,
                ContextKind::Iframe => continue,
                root if !is_last => {
                    debug_assert!(root.is_root());
                    return None;
                }
                ContextKind::TopLevel if depth == 0 => return Some(FrameClass::TopLevel),
                ContextKind::TopLevel => {
                    return Some(FrameClass::DescendantIframe { of: self.page })
                }
                ContextKind::Prerendering { activated } => {
                    return Some(FrameClass::PrerenderingTree { activated })
                }
            }
        }
        None
    }

    /// Decide which page, if any, this frame's events count toward
    pub fn attribute(&self) -> Attribution {
        match self.classify() {
            Some(FrameClass::TopLevel) => Attribution::Attributable(self.page),
            Some(FrameClass::DescendantIframe { of }) => Attribution::Attributable(of),
            Some(FrameClass::PrerenderingTree { activated: true }) => {
                Attribution::Attributable(self.page)
            }
            Some(FrameClass::PrerenderingTree { activated: false }) => {
                Attribution::NotAttributable(Exclusion::InactivePrerender)
            }
            Some(FrameClass::FencedFrameTree) => {
                Attribution::NotAttributable(Exclusion::FencedFrame)
            }
            None => Attribution::NotAttributable(Exclusion::MalformedAncestry),
        }
    }
}
