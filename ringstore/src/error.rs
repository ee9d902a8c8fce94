//! Error types shared by every layer of the engine.
//!
//! Kept hand-rolled rather than built on a derive crate: the error surface is
//! small, fixed, and every variant needs to carry different payloads.

use std::fmt::{Display, Formatter};

/// The result type returned by (almost) every public function in this crate.
pub type CResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Object or key missing.
    NotFound(String),

    /// create-where-exists (versionstore create is the one idempotent exception).
    AlreadyExists(String),

    /// The container's transaction retry budget was exhausted.
    Busy,

    /// A magic number, version, or descriptor failed to parse.
    Corrupt(String),

    /// A password/token did not match the one on the ring descriptor.
    AccessDenied,

    /// A cursor or sequence fell outside `[oldest..youngest]`.
    Bounds(String),

    /// Malformed input: empty table, too-long name, non-ascii key, etc.
    Invalid(String),

    /// Wraps an underlying `std::io::Error`.
    Io(std::io::Error),

    /// Internal invariant violation (poisoned lock, unreachable state).
    Internal(String),

    /// Catch-all for a value that failed to encode/decode.
    Value(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(s) => write!(f, "not found: {s}"),
            Error::AlreadyExists(s) => write!(f, "already exists: {s}"),
            Error::Busy => write!(f, "busy: transaction retry budget exhausted"),
            Error::Corrupt(s) => write!(f, "corrupt: {s}"),
            Error::AccessDenied => write!(f, "access denied"),
            Error::Bounds(s) => write!(f, "out of bounds: {s}"),
            Error::Invalid(s) => write!(f, "invalid: {s}"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Internal(s) => write!(f, "internal error: {s}"),
            Error::Value(s) => write!(f, "value error: {s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Error::Value(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::Internal(format!("lock poisoned: {e}"))
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_is_stable() {
        assert_eq!(Error::Busy.to_string(), "busy: transaction retry budget exhausted");
        assert_eq!(Error::AccessDenied.to_string(), "access denied");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
