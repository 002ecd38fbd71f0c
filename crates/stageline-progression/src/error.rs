//! Progression engine error types.

use thiserror::Error;

/// Errors that can occur while reconciling a single (application, stage)
/// pair. A failure aborts only the affected pair, never the whole pass.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The record is malformed for the operation in progress (missing
    /// stage slot, zero-length ramp window, and so on).
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    #[error("state store error: {0}")]
    State(#[from] stageline_state::StateError),
}

pub type EngineResult<T> = Result<T, EngineError>;
