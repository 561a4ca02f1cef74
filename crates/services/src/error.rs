//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::Section;
use storage::repository::StorageError;

/// Errors emitted by the session engine and its collaborators.
///
/// Store-transaction failures surface as the transparent `Storage` variant;
/// the backends guarantee that a failed compound operation left nothing
/// half-written.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("session or question not found")]
    NotFound,

    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    #[error("not enough active questions in section '{section}': need {need}, got {got}")]
    InsufficientPool {
        section: Section,
        need: u32,
        got: u32,
    },

    #[error("user already has an active session")]
    ActiveSessionExists,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Conversion for lookups where a missing row means the caller asked for
    /// something that does not exist, as opposed to a store failure.
    pub(crate) fn from_lookup(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => EngineError::NotFound,
            other => EngineError::Storage(other),
        }
    }
}
