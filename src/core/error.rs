use thiserror::Error;

use crate::core::engine::Engine;
use crate::lock::LockKey;

#[derive(Error, Debug)]
pub enum Error {
    /// The active engine offers no cross-process advisory-lock primitive.
    /// Raised before any SQL is issued.
    #[error("unsupported db type: {0}")]
    UnsupportedBackend(Engine),

    /// Another session currently holds the advisory lock. Expected under
    /// contention; retriable by the caller.
    #[error("{0} has been locked")]
    AlreadyLocked(LockKey),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A record definition that cannot be persisted safely.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Any error surfaced by the database driver, propagated unchanged.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
