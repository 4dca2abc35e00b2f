//! Error taxonomy for the interpreter.
//!
//! Two channels, per the design: [`FatalError`] unwinds the host call stack
//! and terminates the run; structured errors (produced only by the `test`
//! opcode) are ordinary `serde_json::Value`s built by [`structured_error`]
//! and never unwind.

use serde_json::{json, Value};
use std::fmt;

/// Unrecoverable error. Raised by invariant violations, opcode argument
/// mismatches, unresolvable paths, pointer-stack underflow, and I/O errors.
/// Not catchable inside the language.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    /// A stack-consuming opcode ran with fewer operands than it needs.
    #[error("stack underflow in `{op}`: {detail}")]
    StackUnderflow {
        /// Name of the opcode that underflowed.
        op: &'static str,
        /// Human-readable detail (e.g. which operand was missing).
        detail: String,
    },

    /// An opcode argument had the wrong JSON type.
    #[error("type mismatch in `{op}`: {detail}")]
    TypeMismatch {
        /// Name of the opcode.
        op: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// A JSON Pointer was syntactically malformed.
    #[error("invalid path `{path}`: {detail}")]
    InvalidPath {
        /// The offending pointer string.
        path: String,
        /// Classification detail (escape, non-decimal index, etc).
        detail: String,
    },

    /// A JSON Pointer was well-formed but did not resolve.
    #[error("path not found: `{path}`")]
    NotFound {
        /// The pointer that failed to resolve.
        path: String,
    },

    /// `load`/`store` hit an I/O or parse error.
    #[error("I/O error at `{path}`: {source}")]
    Io {
        /// File path involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A directive's `.` value had a shape the walker cannot classify.
    #[error("invalid directive: {detail}")]
    InvalidDirective {
        /// Human-readable detail.
        detail: String,
    },

    /// A structural invariant was violated (e.g. `stack` is not an array,
    /// root is not an object, residual group nesting).
    #[error("assertion failure: {detail}")]
    AssertionFailure {
        /// Human-readable detail.
        detail: String,
    },
}

impl FatalError {
    /// Name of the opcode that raised this error, if any. Used by the CLI
    /// to decide whether a diagnostic header should name an opcode.
    pub fn opcode(&self) -> Option<&'static str> {
        match self {
            FatalError::StackUnderflow { op, .. } | FatalError::TypeMismatch { op, .. } => {
                Some(op)
            }
            _ => None,
        }
    }

    /// The error taxonomy kind string from spec §7, used in diagnostics and
    /// in structured-error `kind` fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FatalError::StackUnderflow { .. } => "stack_underflow",
            FatalError::TypeMismatch { .. } => "type_mismatch",
            FatalError::InvalidPath { .. } => "invalid_path",
            FatalError::NotFound { .. } => "not_found",
            FatalError::Io { .. } => "io_error",
            FatalError::InvalidDirective { .. } => "invalid_directive",
            FatalError::AssertionFailure { .. } => "assertion_failure",
        }
    }
}

/// Build a structured error object per spec §6:
/// `{ error: true, kind, message, details }`. Pushed onto the operand
/// stack by the `test` opcode; never raised as a Rust error.
pub fn structured_error(kind: &str, message: impl fmt::Display, details: Value) -> Value {
    json!({
        "error": true,
        "kind": kind,
        "message": message.to_string(),
        "details": details,
    })
}

/// Convenience: build the `test_failure` structured error from spec §8 S6.
pub fn test_failure(expected: &Value, actual: &Value) -> Value {
    structured_error(
        "test_failure",
        "subset match failed",
        json!({ "expected": expected, "actual": actual }),
    )
}
