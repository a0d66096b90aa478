//! End-to-end scenarios spanning the IR, e-graph, and executor together.

use std::sync::Arc;
use std::sync::Once;

use symex_core::error::Result;
use symex_core::exec::{Context, Executor, ExecutorOptions, StepOutcome};
use symex_core::externals::{FailureLogger, LogFailureLogger, SatResult, Solver};
use symex_core::ir::{commutativity, EMatcher, FCmpPredicate, ICmpPredicate, OpRef, Operation};
use symex_core::ir::EGraph;
use symex_core::ty::Type;
use symex_core::config::EngineConfig;

static INIT_LOGGER: Once = Once::new();

fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn i32() -> Type {
    Type::int(32)
}

#[test]
fn scenario_constant_folding_collapses_arithmetic_chain() {
    init_logging();
    let a = Operation::constant_int(i32(), 2);
    let b = Operation::constant_int(i32(), 3);
    let c = Operation::constant_int(i32(), 4);
    let sum = Operation::create_add(a, b);
    let result = Operation::create_mul(sum, c);
    assert_eq!(result.as_constant_int(), Some(20));
}

#[test]
fn scenario_identity_and_undef_rules_apply_at_construction() {
    init_logging();
    let x = Operation::constant_named(i32(), "x");
    let undef = Operation::undef(i32());

    let x_plus_zero = Operation::create_add(x.clone(), Operation::constant_int(i32(), 0));
    assert!(Arc::ptr_eq(&x, &x_plus_zero));

    let x_xor_undef = Operation::create_xor(x, undef);
    assert!(x_xor_undef.is_undef());
}

#[test]
fn scenario_equality_saturation_unifies_commutative_forms() {
    init_logging();
    let x = Operation::constant_named(i32(), "x");
    let y = Operation::constant_named(i32(), "y");
    let forward = Operation::create_add(x.clone(), y.clone());
    let backward = Operation::create_add(y, x);

    let mut egraph = EGraph::new();
    let root = egraph.add(&forward);
    let other = egraph.add(&backward);
    assert_ne!(egraph.find(root), egraph.find(other));

    let mut builder = EMatcher::builder();
    commutativity(&mut builder, symex_core::ir::Opcode::Add);
    let matcher = builder.build();
    matcher.simplify(&mut egraph, 8);

    assert_eq!(egraph.find(root), egraph.find(other));
}

#[test]
fn scenario_extraction_prefers_the_cheaper_equivalent_form() {
    init_logging();
    let x = Operation::constant_named(i32(), "x");
    let expr = Operation::create_add(x.clone(), Operation::constant_int(i32(), 0));
    // The smart constructor already folded `x + 0` down to `x`; assert the
    // e-graph agrees when asked to extract the cheapest equivalent form.
    assert!(Arc::ptr_eq(&x, &expr));

    let mut egraph = EGraph::new();
    let root = egraph.add(&expr);
    let extracted = egraph
        .extract(root, |_opcode, children| 1 + children.iter().sum::<u32>())
        .unwrap();
    assert_eq!(extracted, x);
}

#[test]
fn scenario_comparisons_fold_with_correct_signedness() {
    init_logging();
    let neg_one = Operation::constant_int(i32(), u32::MAX as u128);
    let one = Operation::constant_int(i32(), 1);

    let unsigned_gt = Operation::create_icmp(ICmpPredicate::Ugt, neg_one.clone(), one.clone());
    let signed_gt = Operation::create_icmp(ICmpPredicate::Sgt, neg_one, one);

    // 0xFFFFFFFF is huge unsigned but -1 signed.
    assert_eq!(unsigned_gt.as_constant_int(), Some(1));
    assert_eq!(signed_gt.as_constant_int(), Some(0));
}

#[test]
fn scenario_float_comparison_handles_nan_ordering() {
    init_logging();
    let nan = Operation::constant_f64(f64::NAN);
    let one = Operation::constant_f64(1.0);

    let ordered_eq = Operation::create_fcmp(FCmpPredicate::Oeq, nan.clone(), one.clone());
    let unordered = Operation::create_fcmp(FCmpPredicate::Uno, nan, one);

    assert_eq!(ordered_eq.as_constant_int(), Some(0));
    assert_eq!(unordered.as_constant_int(), Some(1));
}

struct AlwaysSatSolver {
    asserted: Vec<OpRef>,
}

impl Solver for AlwaysSatSolver {
    fn assert(&mut self, predicate: &OpRef) {
        self.asserted.push(predicate.clone());
    }
    fn check_sat(&mut self) -> SatResult {
        SatResult::Sat
    }
    fn model(&mut self) -> Vec<(String, Vec<u8>)> {
        Vec::new()
    }
    fn push(&mut self) {}
    fn pop(&mut self) {}
}

#[test]
fn scenario_executor_drains_a_forking_workload() {
    init_logging();
    let _cfg = EngineConfig::default();

    let step: symex_core::exec::StepFn = Arc::new(|ctx: Context, solver: &mut dyn Solver| -> Result<StepOutcome> {
        solver.assert(&Operation::constant_bool(true));
        if ctx.path_condition().len() < 2 {
            let mut left = ctx.fork(ctx.id() * 2 + 1);
            left.assume(Operation::constant_bool(true));
            let mut right = ctx.fork(ctx.id() * 2 + 2);
            right.assume(Operation::constant_bool(false));
            Ok(StepOutcome::Fork(vec![left, right]))
        } else {
            Ok(StepOutcome::Done)
        }
    });

    let options = ExecutorOptions {
        solver_factory: Arc::new(|| Box::new(AlwaysSatSolver { asserted: Vec::new() }) as Box<dyn Solver>),
        num_threads: num_cpus::get().min(4),
        max_queued_contexts: 64,
        step,
        failure_logger: Arc::new(LogFailureLogger) as Arc<dyn FailureLogger>,
    };

    let executor = Executor::new(options);
    executor.run(vec![Context::new(0)]);
    assert!(executor.store().is_empty());
}
