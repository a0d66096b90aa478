//! Embedder-supplied extension points: constraint solving, builtin
//! resolution, and failure reporting. The engine core never depends on a
//! concrete SMT backend or logging sink directly — it calls through these
//! traits, the way the reference implementation calls through
//! `SolverBuilder`, its builtin-resolution hook, and `FailureLogger`.

use std::sync::Arc;

use crate::ir::OpRef;

/// The result of asking a [`Solver`] whether its accumulated assertions are
/// satisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

/// A stateful constraint solver backing one [`crate::exec::Context`]. Each
/// worker owns exactly one for its lifetime; see §5 of the design spec.
pub trait Solver: Send {
    /// Add `predicate` (an `i1`-typed expression) to the solver's assumed
    /// constraints.
    fn assert(&mut self, predicate: &OpRef);

    /// Check satisfiability of everything asserted so far.
    fn check_sat(&mut self) -> SatResult;

    /// A concrete variable assignment witnessing the last `Sat` result, as
    /// `(variable name, little-endian bytes)` pairs. Returns an empty model
    /// if the last check was not `Sat`.
    fn model(&mut self) -> Vec<(String, Vec<u8>)>;

    /// Save the current assertion set so it can be restored with `pop`.
    fn push(&mut self);

    /// Restore the assertion set saved by the matching `push`.
    fn pop(&mut self);

    /// Ask an in-progress `check_sat` to abandon and return `Unknown` as
    /// soon as possible. Called from a thread other than the one driving
    /// this solver, so implementations must make this safe to call
    /// concurrently (most SMT backends expose exactly this kind of
    /// thread-safe cancellation flag). The default does nothing, which is
    /// correct for solvers cheap enough that cancellation isn't worth
    /// plumbing through.
    fn interrupt(&mut self) {}
}

/// Constructs a fresh [`Solver`] per worker. Kept as a plain `Fn` rather
/// than a trait so embedders can hand over a closure straight from however
/// they construct their SMT backend's context.
pub type SolverFactory = Arc<dyn Fn() -> Box<dyn Solver> + Send + Sync>;

/// Resolves named builtin function calls that the expression IR itself does
/// not model (intrinsics, ABI-specific helpers). Returning `None` tells the
/// caller the builtin is unknown, which surfaces as
/// [`crate::error::Error::UnsupportedOperation`].
pub trait Module: Send + Sync {
    /// A name for this module, used in diagnostics.
    fn name(&self) -> &str;

    /// Resolve a call to `name` with the given already-evaluated arguments.
    fn resolve_builtin(&self, name: &str, args: &[OpRef]) -> Option<OpRef>;
}

/// Reports an assertion violation discovered while draining a context.
/// Mirrors the reference implementation's `PrintingFailureLogger`, which
/// the engine core only ever references through this trait so tests can
/// substitute a logger that records calls instead of printing them.
pub trait FailureLogger: Send + Sync {
    /// `predicate` is the failing assertion's printed form; `model` is the
    /// solver's witnessing assignment.
    fn log_assertion_failure(&self, predicate: &str, model: &[(String, Vec<u8>)]);
}

/// A [`FailureLogger`] that logs through the `log` crate at `warn` level,
/// matching the library's general rule that it never does its own I/O.
#[derive(Debug, Default)]
pub struct LogFailureLogger;

impl FailureLogger for LogFailureLogger {
    fn log_assertion_failure(&self, predicate: &str, model: &[(String, Vec<u8>)]) {
        log::warn!("assertion failed: {predicate} (model: {model:?})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingLogger {
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl FailureLogger for RecordingLogger {
        fn log_assertion_failure(&self, predicate: &str, _model: &[(String, Vec<u8>)]) {
            self.calls.lock().unwrap().push(predicate.to_string());
        }
    }

    #[test]
    fn failure_logger_is_object_safe_and_callable() {
        let logger = RecordingLogger {
            calls: std::sync::Mutex::new(Vec::new()),
        };
        let dyn_logger: &dyn FailureLogger = &logger;
        dyn_logger.log_assertion_failure("(icmp.eq x y)", &[]);
        assert_eq!(logger.calls.lock().unwrap().as_slice(), ["(icmp.eq x y)"]);
    }
}
