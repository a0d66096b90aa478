//! Engine-wide configuration, following the reference implementation's
//! `EngineOptions`/`SolverBuilder` split: knobs that shape how expressions
//! get simplified live here; how to actually solve or log is left to the
//! [`crate::externals`] trait objects the embedder supplies.

#[cfg(feature = "serde")]
use serde::Deserialize;

/// How [`crate::ir::EGraph::extract`] scores candidate rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum ExtractionCost {
    /// Prefer the smallest syntax tree (one point per node).
    TreeSize,
    /// Prefer the fewest distinct e-classes touched.
    ClassCount,
}

impl Default for ExtractionCost {
    fn default() -> Self {
        ExtractionCost::TreeSize
    }
}

/// A named built-in rewrite family to enable during equality saturation.
/// Kept as a plain enum (rather than accepting arbitrary closures) so a
/// configuration can be deserialized from a config file, matching how the
/// reference implementation's plugin list is named rather than loaded as
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum RewriteFamily {
    /// `op(a, b) == op(b, a)` for every commutative opcode.
    Commutativity,
    /// `op(op(a, b), c) == op(a, op(b, c))` for every associative opcode.
    Associativity,
}

/// Top-level configuration for the e-graph simplification engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct EngineConfig {
    /// Worker thread count for the executor. `None` runs single-threaded
    /// on the caller's thread, matching `Executor::run`'s fast path when
    /// `options.num_threads == 1`.
    pub num_workers: Option<usize>,
    /// Advisory cap on contexts buffered in the shared store; exceeding it
    /// is logged but not enforced with backpressure. See `ContextStore::push`.
    pub max_queued_contexts: usize,
    /// Cost function used by `EGraph::extract`.
    pub extraction_cost: ExtractionCost,
    /// Which built-in rewrite families `EMatcher::simplify` runs.
    pub rewrite_rules: Vec<RewriteFamily>,
    /// Hard cap on `EMatcher::simplify` passes, guarding against a rewrite
    /// family that never reaches a fixed point.
    pub max_saturation_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_workers: None,
            max_queued_contexts: 1024,
            extraction_cost: ExtractionCost::TreeSize,
            rewrite_rules: Vec::new(),
            max_saturation_passes: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_single_threaded_with_no_extra_rewrites() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.num_workers, None);
        assert_eq!(cfg.extraction_cost, ExtractionCost::TreeSize);
        assert!(cfg.rewrite_rules.is_empty());
    }
}
