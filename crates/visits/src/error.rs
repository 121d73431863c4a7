//! Error types for the observer surface
//!
//! Simple, flat error hierarchy. Event processing itself never fails -
//! these only reach callers that attach, submit or wait.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VisitError>;

#[derive(Debug, Error)]
pub enum VisitError {
    #[error("Page was torn down before the observer attached")]
    PageTornDown,

    #[error("Observer queue is closed")]
    ObserverClosed,

    #[error("Observer queue is full")]
    QueueFull,

    #[error("Timed out waiting for {expected} visits (have {actual})")]
    Timeout { expected: usize, actual: usize },

    #[error("Invalid observer config: {0}")]
    InvalidConfig(String),
}
