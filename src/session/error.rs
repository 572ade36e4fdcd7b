//! Error types for session operations.

use thiserror::Error;

use crate::api::ApiError;

/// User-visible failures from a session action.
///
/// Superseded requests are not errors and never appear here; they settle
/// as `Ok(None)` at the session boundary. Any single failure leaves the
/// session usable.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The detection RPC failed for this action.
    #[error("Inference request failed: {0}")]
    Inference(#[from] ApiError),
}
