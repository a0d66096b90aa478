//! Cooperative cancellation: `Executor::interrupt` must unblock workers
//! that are parked waiting on the context store, without requiring them to
//! finish whatever work is still queued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use symex_core::error::Result;
use symex_core::exec::{Context, Executor, ExecutorOptions, StepOutcome};
use symex_core::externals::{FailureLogger, LogFailureLogger, SatResult, Solver};
use symex_core::ir::OpRef;

struct NullSolver;
impl Solver for NullSolver {
    fn assert(&mut self, _predicate: &OpRef) {}
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
fn interrupt_unblocks_a_worker_parked_on_an_empty_store() {
    let processed = Arc::new(AtomicUsize::new(0));
    let worker_started = Arc::new(Barrier::new(2));

    let processed_clone = processed.clone();
    let worker_started_clone = worker_started.clone();
    let step: symex_core::exec::StepFn = Arc::new(move |ctx: Context, _solver: &mut dyn Solver| -> Result<StepOutcome> {
        processed_clone.fetch_add(1, Ordering::SeqCst);
        worker_started_clone.wait();
        let _ = ctx;
        // Returning `Done` with nothing left queued parks the worker in
        // `ContextStore::pop` until either new work arrives or the store
        // shuts down.
        Ok(StepOutcome::Done)
    });

    let options = ExecutorOptions {
        solver_factory: Arc::new(|| Box::new(NullSolver) as Box<dyn Solver>),
        num_threads: 2,
        max_queued_contexts: 8,
        step,
        failure_logger: Arc::new(LogFailureLogger) as Arc<dyn FailureLogger>,
    };

    let executor = Executor::new(options);
    let executor_for_interrupt = executor.clone();

    let handle = std::thread::spawn(move || {
        executor.run(vec![Context::new(0)]);
    });

    // Wait for the worker to have processed the single seeded context and
    // parked on the now-empty store before interrupting.
    worker_started.wait();
    std::thread::sleep(Duration::from_millis(20));
    executor_for_interrupt.interrupt();

    handle
        .join()
        .expect("executor.run should return promptly after interrupt");
    assert_eq!(processed.load(Ordering::SeqCst), 1);
}

#[test]
fn interrupt_before_run_makes_run_return_immediately() {
    let step: symex_core::exec::StepFn =
        Arc::new(|_ctx: Context, _solver: &mut dyn Solver| -> Result<StepOutcome> {
            panic!("step should never run once interrupted before start");
        });

    let options = ExecutorOptions {
        solver_factory: Arc::new(|| Box::new(NullSolver) as Box<dyn Solver>),
        num_threads: 1,
        max_queued_contexts: 8,
        step,
        failure_logger: Arc::new(LogFailureLogger) as Arc<dyn FailureLogger>,
    };

    let executor = Executor::new(options);
    executor.interrupt();
    executor.run(vec![Context::new(0)]);
}
