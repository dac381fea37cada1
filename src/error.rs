use thiserror::Error;

use crate::backend::BackendError;
use crate::checkpoint::CheckpointError;
use crate::results::ResultLogError;
use crate::state::StateError;

/// Invocation-level failure taxonomy.
///
/// Only configuration and checkpoint-availability problems abort an
/// invocation before scanning. Quota, rate-limit, and timeout conditions are
/// absorbed lower in the stack and surface as partial account outcomes.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("checkpoint marker unavailable: {0}")]
    CheckpointUnavailable(String),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("result log error: {0}")]
    ResultLog(#[from] ResultLogError),
}
