//! Warmup error types.

use flowgate_core::TopologyError;
use thiserror::Error;

/// Errors that stop warmup from starting at all.
#[derive(Debug, Error)]
pub enum WarmupError {
    #[error("invalid topology: {0}")]
    Configuration(#[from] TopologyError),

    #[error("warmup already activated for this epoch")]
    AlreadyActivated,
}

pub type WarmupResult<T> = Result<T, WarmupError>;
