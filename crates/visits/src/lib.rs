//! Page Visit Segmentation
//!
//! Turns the raw event stream of one browser tab into a sequence of visits.
//! A visit starts when a document commits in the top-level frame and ends
//! when the next cross-document top-level navigation commits. Each visit
//! records the previous page's engagement signals together with metadata about
//! the navigation that ended it.
//!
//! # Architecture
//!
//! ```text
//!   PageEvent ──► ObserverHandle ──► mpsc ──► PageVisitObserver (one task)
//!                                                  │
//!                                           VisitSegmenter
//!                                           ├── FrameContext::attribute
//!                                           └── RedirectChainBuilder
//!                                                  │
//!                                        Visit ──► VisitLog + listeners
//! ```
//!
//! 1. **One owner per page**: the segmenter is plain state, owned by a single
//!    consumer task. No locks on the hot path.
//! 2. **Closed enums**: events and frame kinds are matched exhaustively.
//! 3. **Never block on telemetry**: source ids that are not ready when a page
//!    ends become [`SourceId::UNKNOWN`].

pub mod clock;
pub mod error;
pub mod events;
pub mod frame;
pub mod listener;
pub mod observer;
pub mod redirect;
pub mod resolver;
pub mod segmenter;
pub mod sink;
pub mod types;
pub mod visit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, VisitError};
pub use events::{CookieTarget, NavigationCommit, PageEvent};
pub use frame::{Attribution, ContextKind, FrameContext};
pub use listener::VisitListener;
pub use observer::{EventSender, ObservedPage, ObserverConfig, ObserverHandle, PageVisitObserver};
pub use resolver::{ResolveTarget, SequentialSourceIds, SourceIdResolver};
pub use segmenter::{DocumentInfo, VisitSegmenter};
pub use sink::VisitLog;
pub use types::{
    CookieOperation, FrameId, NavigationId, PageId, PageTransition, SourceId, StorageKind,
};
pub use visit::{NavigationInfo, PageVisitInfo, ServerRedirectInfo, Visit};
