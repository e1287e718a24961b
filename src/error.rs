use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The value is already stored where keys must be unique.
    #[error("duplicate entry")]
    Duplicate,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("structure is empty")]
    Empty,

    /// Internal linkage is broken. This is a bug, not a user error.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),

    #[error("corrupted {what}: {reason}")]
    Corruption { what: &'static str, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn corruption(what: &'static str, reason: impl Into<String>) -> Self {
        Error::Corruption {
            what,
            reason: reason.into(),
        }
    }
}
