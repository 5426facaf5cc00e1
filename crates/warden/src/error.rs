//! Error kinds surfaced by dispatch, per the error handling design: each
//! variant maps to a disposition (HTTP status, log-only, or fatal boot error).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("not ready")]
    LockConflict,

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl WardenError {
    /// HTTP status code an external collaborator should return for this
    /// error. `Store` has no single correct status; callers that persist
    /// best-effort and continue should not construct this variant for a
    /// response path at all.
    pub fn status_code(&self) -> u16 {
        match self {
            WardenError::Validation(_) => 400,
            WardenError::NotFound(_) => 404,
            WardenError::LockConflict => 429,
            WardenError::Execution(_) => 500,
            WardenError::Store(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
