//! Error taxonomy for the interpreter boundary.
//!
//! Structural precondition violations (null operand, mismatched types handed
//! to a smart constructor) are not represented here: they are bugs in the
//! caller and are reported via `debug_assert!`/`panic!` at the construction
//! site, matching the reference implementation's assertion macros. Everything
//! that can legitimately happen at runtime while interpreting untrusted IR is
//! an `Error` variant instead.

use std::fmt;

use crate::ir::Operation;

/// Failure classes a worker can encounter while draining a context.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An e-graph extraction or solver encoding hit a term it cannot
    /// translate.
    #[error("unevaluatable expression: {0}")]
    Unevaluatable(String),

    /// The interpreter hit an IR construct it does not model.
    #[error("internal error: unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The solver found a model violating a user assertion.
    #[error("assertion failed: {predicate}")]
    AssertionFailure {
        /// The failing predicate, in its printed S-expression form.
        predicate: String,
        /// Constant bindings from the solver's model, if one was produced.
        model: Vec<(String, Vec<u8>)>,
    },
}

impl Error {
    /// Build an [`Error::Unevaluatable`] describing the operation that could
    /// not be translated.
    pub fn unevaluatable(op: &Operation) -> Self {
        Error::Unevaluatable(op.to_string())
    }

    /// Build an [`Error::UnsupportedOperation`] with a free-form description.
    pub fn unsupported(what: impl fmt::Display) -> Self {
        Error::UnsupportedOperation(what.to_string())
    }
}

/// Result alias used throughout the interpreter boundary.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of draining a worker's backing list, distinguishing normal
/// completion from cooperative cancellation. Cancellation is a control-flow
/// outcome, not an [`Error`]: it is never logged as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The worker drained its backing list and the store had no more work.
    Drained,
    /// `Executor::interrupt` was called while this worker was running.
    Cancelled,
}
