//! Error types for the quickinline AOT inlining backend
//!
//! Language-level errors (`TypeError`, `RangeError`, ...) raised by generic
//! builtins and by fast paths share one representation so that both tiers
//! produce identical failures. Speculation misses are never errors.

use std::fmt;
use thiserror::Error;

/// Main error type for quickinline
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Runtime error - TypeError, RangeError, etc.
    #[error("{kind}: {message}")]
    RuntimeError { kind: ErrorKind, message: String },

    /// Internal compiler error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Recorded profile could not be read or written
    #[error("ProfileError: {0}")]
    ProfileError(String),

    /// Invalid engine configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),
}

/// JavaScript error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ErrorKind {
    /// TypeError - wrong type for operation
    TypeError,
    /// ReferenceError - unknown binding
    ReferenceError,
    /// RangeError - value out of range
    RangeError,
    /// SyntaxError - unparsable input (e.g. `BigInt("1x")`)
    SyntaxError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ReferenceError => write!(f, "ReferenceError"),
            ErrorKind::RangeError => write!(f, "RangeError"),
            ErrorKind::SyntaxError => write!(f, "SyntaxError"),
        }
    }
}

impl Error {
    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::TypeError,
            message: message.into(),
        }
    }

    /// Create a ReferenceError
    pub fn reference_error(message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::ReferenceError,
            message: message.into(),
        }
    }

    /// Create a RangeError
    pub fn range_error(message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::RangeError,
            message: message.into(),
        }
    }

    /// Create a SyntaxError
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::SyntaxError,
            message: message.into(),
        }
    }

    /// Create an internal compiler error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::InternalError(message.into())
    }

    /// The language error kind, if this is a language-level error
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::RuntimeError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error would be observable by a `catch` in user code
    pub fn is_catchable(&self) -> bool {
        matches!(self, Error::RuntimeError { .. })
    }
}

/// Result type alias for quickinline
pub type Result<T> = std::result::Result<T, Error>;

/// Standardized error message templates
///
/// Generic builtins and fast paths must raise byte-identical messages, so
/// every message used by either tier lives here.
pub mod messages {
    pub const CANNOT_CONVERT_TO_PRIMITIVE: &str = "Cannot convert object to primitive value";
    pub const BIGINT_TO_NUMBER: &str = "Cannot convert a BigInt value to a number";
    pub const INVALID_ARRAY_LENGTH: &str = "Invalid array length";
    pub const INVALID_INDEX: &str = "Invalid typed array index";
    pub const DATAVIEW_OUT_OF_BOUNDS: &str = "Offset is outside the bounds of the DataView";
    pub const NOT_A_TYPED_ARRAY: &str = "this is not a typed array.";
    pub const BIGINT_TOO_BIG: &str = "Maximum BigInt size exceeded";
    pub const PUSH_LENGTH_OVERFLOW: &str =
        "Pushing elements past 2**53-1 length causes a TypeError";

    /// Format a "called on null or undefined" error
    pub fn called_on_nullish(method: &str) -> String {
        format!("{} called on null or undefined", method)
    }

    /// Format a "not a function" error
    pub fn not_a_function(what: &str) -> String {
        format!("{} is not a function", what)
    }

    /// Format an "object is not extensible" error
    pub fn not_extensible(key: &str) -> String {
        format!("Cannot add property {}, object is not extensible", key)
    }

    /// Format a "read only property" error
    pub fn read_only(key: &str) -> String {
        format!("Cannot assign to read only property '{}' of object", key)
    }

    /// Format a "cannot delete" error
    pub fn cannot_delete(key: &str) -> String {
        format!("Cannot delete property '{}' of [object Array]", key)
    }

    /// Format an incompatible receiver error
    pub fn incompatible_receiver(method: &str) -> String {
        format!("Method {} called on incompatible receiver", method)
    }

    /// Format a detached buffer error
    pub fn detached_buffer(method: &str) -> String {
        format!("Cannot perform {} on a detached ArrayBuffer", method)
    }

    /// Format a BigInt conversion error
    pub fn cannot_convert_to_bigint(what: &str) -> String {
        format!("Cannot convert {} to a BigInt", what)
    }

    /// Format a non-integer number to BigInt error
    pub fn not_an_integer(number: &str) -> String {
        format!(
            "The number {} cannot be converted to a BigInt because it is not an integer",
            number
        )
    }

    /// Format an unknown global error
    pub fn not_defined(name: &str) -> String {
        format!("{} is not defined", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = Error::type_error(messages::not_extensible("0"));
        assert_eq!(
            err.to_string(),
            "TypeError: Cannot add property 0, object is not extensible"
        );
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        assert!(err.is_catchable());
    }

    #[test]
    fn test_internal_error_not_catchable() {
        let err = Error::internal("plan without call target guard");
        assert_eq!(err.kind(), None);
        assert!(!err.is_catchable());
        assert!(err.to_string().starts_with("InternalError:"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::RangeError.to_string(), "RangeError");
        assert_eq!(ErrorKind::SyntaxError.to_string(), "SyntaxError");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::IoError { .. }));
    }
}
