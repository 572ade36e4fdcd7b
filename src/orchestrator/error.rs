//! Error types for request orchestration.

use thiserror::Error;

/// Outcome of a superseded or failed orchestrated request.
#[derive(Error, Debug)]
pub enum OrchestratorError<E: std::fmt::Display + std::fmt::Debug> {
    /// A newer request of the same kind was issued; this one's result was
    /// discarded. Never user-visible.
    #[error("Request superseded by a newer request of the same kind")]
    Superseded,

    /// The executor itself failed. Surfaced to subscribers.
    #[error("Request failed: {0}")]
    Failed(E),
}

impl<E: std::fmt::Display + std::fmt::Debug> OrchestratorError<E> {
    /// True for the silently-discarded case.
    pub fn is_superseded(&self) -> bool {
        matches!(self, OrchestratorError::Superseded)
    }
}
