//! Error types for the resource pool

use thiserror::Error;

/// Errors returned while constructing a [`Pool`](crate::Pool).
///
/// The first four variants are configuration errors: they are detected before
/// any resource is created. `Create` carries the creator's own error when the
/// warm-up phase fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError<E> {
    #[error("you must provide a creator")]
    CreatorMissing,

    #[error("you must provide a destroyer")]
    DestroyerMissing,

    #[error("invalid max idle size")]
    InvalidIdleSize,

    #[error("invalid max idle time")]
    InvalidIdleTime,

    #[error("failed to create resource during warm-up: {0}")]
    Create(E),
}

impl<E> PoolError<E> {
    /// Whether this is one of the configuration errors
    pub fn is_config_error(&self) -> bool {
        !matches!(self, PoolError::Create(_))
    }

    /// The creator's error, if warm-up failed
    pub fn into_create_error(self) -> Option<E> {
        match self {
            PoolError::Create(e) => Some(e),
            _ => None,
        }
    }
}

pub type PoolResult<T, E> = Result<T, PoolError<E>>;
