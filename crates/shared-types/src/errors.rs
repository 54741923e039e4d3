//! # Error Types
//!
//! Errors raised while parsing the shared primitive types.

use thiserror::Error;

/// Failure to parse an `Address` or `Hash` from its text form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    /// Input was not valid hex.
    #[error("Invalid {kind} hex: {reason}")]
    InvalidHex { kind: &'static str, reason: String },

    /// Input decoded to the wrong number of bytes.
    #[error("Invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}
