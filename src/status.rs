//! Error/status layer shared by every fallible operation in this crate.
//!
//! Mirrors the manual enum + hand-written `Display`/`From<io::Error>` style
//! used elsewhere in this codebase rather than pulling in a derive-macro
//! error crate: `ErrorKind` names the failure family, `Status` carries it
//! plus a message, and `StatusOr<T>` is the tagged union of a `Status` and a
//! value.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Coarse failure family for a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FailedPrecondition,
    InvalidArgument,
    Timeout,
    OutOfMemory,
    OutOfBounds,
    LogicError,
    ResourceUnobtainable,
    Unimplemented,
    FormatMismatch,
    IoError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Timeout => "timeout",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::OutOfBounds => "out_of_bounds",
            ErrorKind::LogicError => "logic_error",
            ErrorKind::ResourceUnobtainable => "resource_unobtainable",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::FormatMismatch => "format_mismatch",
            ErrorKind::IoError => "io_error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
struct StatusInner {
    kind: ErrorKind,
    message: Arc<str>,
}

/// Either "ok" or a reference-counted `(kind, message)` pair.
///
/// Cloning a `Status` is cheap regardless of message length since the
/// message is stored behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Status {
    inner: Option<StatusInner>,
}

impl Status {
    pub fn ok() -> Self {
        Status { inner: None }
    }

    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Status {
            inner: Some(StatusInner {
                kind,
                message: Arc::from(message.into()),
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.inner.is_none()
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.inner.as_ref().map(|i| i.kind)
    }

    pub fn message(&self) -> &str {
        self.inner.as_ref().map(|i| i.message.as_ref()).unwrap_or("")
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfBounds, message)
    }

    /// Structural/format errors are surfaced to the caller, but are logged
    /// at debug level first — the library doesn't know whether the caller
    /// treats a malformed container as exceptional or routine.
    pub fn format_mismatch(message: impl Into<String>) -> Self {
        let message = message.into();
        log::debug!("format error: {message}");
        Self::new(ErrorKind::FormatMismatch, message)
    }

    pub fn logic_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LogicError, message)
    }

    pub fn resource_unobtainable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceUnobtainable, message)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::ok()
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some(a), Some(b)) => a.kind == b.kind && a.message == b.message,
            _ => false,
        }
    }
}

impl Eq for Status {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => write!(f, "ok"),
            Some(i) => write!(f, "{}: {}", i.kind, i.message),
        }
    }
}

impl std::error::Error for Status {}

impl From<io::Error> for Status {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof => ErrorKind::FormatMismatch,
            _ => ErrorKind::IoError,
        };
        Status::new(kind, err.to_string())
    }
}

/// Either a `Status` error, or a value.
///
/// Building a `StatusOr` from an ok `Status` is a contract violation, not a
/// recoverable case: an "ok status with no payload" is meaningless here, so
/// [`StatusOr::from_status`] panics rather than returning something callers
/// could accidentally unwrap into garbage.
pub struct StatusOr<T> {
    result: Result<T, Status>,
}

impl<T> StatusOr<T> {
    pub fn ok(value: T) -> Self {
        StatusOr { result: Ok(value) }
    }

    pub fn from_status(status: Status) -> Self {
        assert!(status.is_err(), "StatusOr::from_status requires an error status");
        StatusOr {
            result: Err(status),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn status(&self) -> Status {
        match &self.result {
            Ok(_) => Status::ok(),
            Err(s) => s.clone(),
        }
    }

    pub fn into_result(self) -> Result<T, Status> {
        self.result
    }

    pub fn unwrap(self) -> T {
        self.result.unwrap_or_else(|s| panic!("StatusOr::unwrap on error: {s}"))
    }
}

impl<T> From<Result<T, Status>> for StatusOr<T> {
    fn from(result: Result<T, Status>) -> Self {
        StatusOr { result }
    }
}

impl<T> From<StatusOr<T>> for Result<T, Status> {
    fn from(value: StatusOr<T>) -> Self {
        value.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_has_no_kind() {
        let s = Status::ok();
        assert!(s.is_ok());
        assert_eq!(s.kind(), None);
    }

    #[test]
    fn equality_compares_kind_and_message() {
        let a = Status::invalid_argument("bad pan");
        let b = Status::invalid_argument("bad pan");
        let c = Status::invalid_argument("bad volume");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn status_or_roundtrips_value() {
        let s: StatusOr<i32> = StatusOr::ok(42);
        assert!(s.is_ok());
        assert_eq!(s.unwrap(), 42);
    }

    #[test]
    #[should_panic]
    fn status_or_from_ok_status_panics() {
        let _ = StatusOr::<i32>::from_status(Status::ok());
    }

    #[test]
    fn io_error_unexpected_eof_becomes_format_mismatch() {
        let io_err = io::Error::from(io::ErrorKind::UnexpectedEof);
        let status: Status = io_err.into();
        assert_eq!(status.kind(), Some(ErrorKind::FormatMismatch));
    }
}
