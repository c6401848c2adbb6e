//! Error types for engine operations.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Numeric error codes reported by an engine.
///
/// The numbering is part of the primitive contract: callers match on these
/// codes to decide whether a failure is a genuine error or an expected
/// outcome such as a missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Success.
    Success = 0,
    /// Threading error.
    Thread = 1,
    /// Invalid operation.
    Invalid = 2,
    /// File not found.
    NoFile = 3,
    /// No permission.
    NoPermission = 4,
    /// Invalid meta data.
    Meta = 5,
    /// Invalid record header.
    Header = 6,
    /// Open error.
    Open = 7,
    /// Close error.
    Close = 8,
    /// Truncate error.
    Truncate = 9,
    /// Sync error.
    Sync = 10,
    /// Stat error.
    Stat = 11,
    /// Seek error.
    Seek = 12,
    /// Read error.
    Read = 13,
    /// Write error.
    Write = 14,
    /// Memory map error.
    Mmap = 15,
    /// Lock error.
    Lock = 16,
    /// Unlink error.
    Unlink = 17,
    /// Rename error.
    Rename = 18,
    /// Directory creation error.
    Mkdir = 19,
    /// Directory removal error.
    Rmdir = 20,
    /// Existing record.
    Keep = 21,
    /// No record found.
    NoRecord = 22,
    /// Miscellaneous error.
    Misc = 9999,
}

impl ErrorCode {
    /// Returns the numeric value of the code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns the human readable message for the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Thread => "threading error",
            Self::Invalid => "invalid operation",
            Self::NoFile => "file not found",
            Self::NoPermission => "no permission",
            Self::Meta => "invalid meta data",
            Self::Header => "invalid record header",
            Self::Open => "open error",
            Self::Close => "close error",
            Self::Truncate => "trunc error",
            Self::Sync => "sync error",
            Self::Stat => "stat error",
            Self::Seek => "seek error",
            Self::Read => "read error",
            Self::Write => "write error",
            Self::Mmap => "mmap error",
            Self::Lock => "lock error",
            Self::Unlink => "unlink error",
            Self::Rename => "rename error",
            Self::Mkdir => "mkdir error",
            Self::Rmdir => "rmdir error",
            Self::Keep => "existing record",
            Self::NoRecord => "no record found",
            Self::Misc => "miscellaneous error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_i32())
    }
}

/// An engine failure: an error code plus optional detail.
#[derive(Debug, Error)]
#[error("{code}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct EngineError {
    /// The error code.
    pub code: ErrorCode,
    /// Additional context, if any.
    pub detail: Option<String>,
}

impl EngineError {
    /// Creates an error carrying only a code.
    #[must_use]
    pub const fn new(code: ErrorCode) -> Self {
        Self { code, detail: None }
    }

    /// Creates an error with a code and detail message.
    pub fn with_detail(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
        }
    }

    /// Creates a "no record found" error.
    #[must_use]
    pub const fn no_record() -> Self {
        Self::new(ErrorCode::NoRecord)
    }

    /// Creates an "existing record" error.
    #[must_use]
    pub const fn keep() -> Self {
        Self::new(ErrorCode::Keep)
    }

    /// Creates an "invalid operation" error.
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::with_detail(ErrorCode::Invalid, detail)
    }

    /// Wraps an I/O error under the given code.
    pub fn io(code: ErrorCode, err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NoFile,
            io::ErrorKind::PermissionDenied => ErrorCode::NoPermission,
            _ => code,
        };
        Self::with_detail(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_keep_their_numbers() {
        assert_eq!(ErrorCode::Keep.as_i32(), 21);
        assert_eq!(ErrorCode::NoRecord.as_i32(), 22);
        assert_eq!(ErrorCode::Misc.as_i32(), 9999);
    }

    #[test]
    fn display_includes_code_and_detail() {
        let err = EngineError::with_detail(ErrorCode::Invalid, "read-only database");
        assert_eq!(err.to_string(), "invalid operation (2): read-only database");
        assert_eq!(EngineError::no_record().to_string(), "no record found (22)");
    }

    #[test]
    fn io_errors_map_not_found() {
        let err = EngineError::io(
            ErrorCode::Open,
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.code, ErrorCode::NoFile);
    }
}
