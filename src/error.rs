//! Error types for the hotpath toolkit.
//!
//! Driver-facing failures (parse errors, unknown passes, malformed IR) live
//! in [`HotpathError`]; [`RewriteAbort`] names the per-loop reasons the
//! FP-LICM rewriter backs out without touching the IR.

use thiserror::Error;

/// Errors surfaced by the driver and the IR parser.
#[derive(Error, Debug)]
pub enum HotpathError {
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("unknown pass: {name}")]
    UnknownPass { name: String },

    #[error("malformed IR: {reason}")]
    MalformedIr { reason: String },
}

/// Reasons a loop transformation is abandoned.
///
/// These never escape the pass: the affected loop is left unchanged and the
/// reason is logged. They exist so the rewriter can validate a full plan
/// before touching the IR.
#[derive(Error, Debug)]
pub enum RewriteAbort {
    #[error("loop has no pre-header")]
    MissingPreheader,

    #[error("loop has no frequent path")]
    NoFrequentPath,

    #[error("defeater store value type {found} does not match hoisted load type {expected}")]
    OperandTypeMismatch { expected: String, found: String },
}

/// Result type alias for driver-level operations.
pub type HotpathResult<T> = Result<T, HotpathError>;
