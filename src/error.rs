use std::fmt::{Display, Formatter};
use std::num::TryFromIntError;

use config::ConfigError;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

// PoolExhausted is the only error callers are expected to recover from;
// the rest abort the operation that raised them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    Internal(String),
    Value(String),
    /// No frame is obtainable: the free list is empty and every tracked
    /// frame is pinned.
    PoolExhausted,
    /// A hash table bucket can no longer split because the local depth
    /// reached the width of the hash.
    KeyspaceExhausted,
    /// A component was driven into a state its invariants forbid, e.g.
    /// removing a non-evictable frame from the replacer.
    InvariantViolation(String),
}

impl Error {
    pub fn internal<E: ToString>(msg: E) -> Error {
        Error::Internal(msg.to_string())
    }

    pub fn value<E: ToString>(msg: E) -> Error {
        Error::Value(msg.to_string())
    }

    pub fn invariant<E: ToString>(msg: E) -> Error {
        Error::InvariantViolation(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(s) | Error::Value(s) => write!(f, "{}", s),
            Error::PoolExhausted => write!(f, "buffer pool has no available frame"),
            Error::KeyspaceExhausted => write!(f, "hash table keyspace exhausted"),
            Error::InvariantViolation(s) => write!(f, "invariant violation: {}", s),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::internal(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::internal(err)
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::internal(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::internal(err)
    }
}

impl From<TryFromIntError> for Error {
    fn from(err: TryFromIntError) -> Self {
        Error::internal(err)
    }
}
