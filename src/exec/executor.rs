//! The worker pool that drains a [`ContextStore`], grounded in the
//! reference implementation's `Executor::run_worker`: build a solver, pop
//! contexts in a loop, spill forks back onto the store, and cooperate with
//! `interrupt()` via a shared stop flag plus a mutex-guarded solver list so
//! an interrupting thread can reach every in-flight solver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::error::{Result, WorkerOutcome};
use crate::externals::{FailureLogger, Solver, SolverFactory};

use super::context::Context;
use super::store::ContextStore;

/// What a single step of evaluating one context produced.
pub enum StepOutcome {
    /// Nothing further to do with this path.
    Done,
    /// The path forked; these children should be pushed back onto the
    /// store for some worker (possibly this one) to continue.
    Fork(Vec<Context>),
    /// A user assertion failed on this path.
    Failed {
        predicate: String,
        model: Vec<(String, Vec<u8>)>,
    },
}

/// One step of the driving loop: evaluate `ctx` against `solver`, returning
/// what happened. Supplied by the embedder; the executor itself has no
/// opinion on what "evaluating a context" means beyond this contract.
pub type StepFn = Arc<dyn Fn(Context, &mut dyn Solver) -> Result<StepOutcome> + Send + Sync>;

/// Configuration for an [`Executor`], mirroring the reference
/// implementation's `Executor` constructor arguments.
#[derive(Clone)]
pub struct ExecutorOptions {
    /// Builds a fresh solver for each worker thread.
    pub solver_factory: SolverFactory,
    /// Number of worker threads. `1` runs on the calling thread instead of
    /// spawning, matching `Executor::run`'s single-thread fast path.
    pub num_threads: usize,
    /// Advisory cap on how many contexts the store holds before a trace
    /// log fires; see [`ContextStore::push`].
    pub max_queued_contexts: usize,
    /// Evaluates one popped context.
    pub step: StepFn,
    /// Where assertion failures are reported.
    pub failure_logger: Arc<dyn FailureLogger>,
}

type SharedSolver = Arc<Mutex<Box<dyn Solver>>>;

/// Drives a pool of worker threads (or the calling thread, for
/// `num_threads == 1`) over a shared [`ContextStore`] until it drains, or
/// until [`Executor::interrupt`] is called from another thread.
#[derive(Clone)]
pub struct Executor {
    options: ExecutorOptions,
    store: Arc<ContextStore>,
    should_stop: Arc<AtomicBool>,
    solvers: Arc<Mutex<Vec<SharedSolver>>>,
}

impl Executor {
    pub fn new(options: ExecutorOptions) -> Self {
        let store = Arc::new(ContextStore::new(options.max_queued_contexts));
        Executor {
            options,
            store,
            should_stop: Arc::new(AtomicBool::new(false)),
            solvers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The shared store, for an embedder that wants to seed or inspect it
    /// directly (e.g. pushing the root context before calling `run`).
    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Seed `initial` onto the store and run workers until it drains. With
    /// more than one worker thread this spawns `num_threads - 1` additional
    /// threads and also runs a worker on the calling thread, joining all of
    /// them before returning.
    pub fn run(&self, initial: Vec<Context>) {
        for ctx in initial {
            self.store.push(ctx);
        }

        if self.options.num_threads <= 1 {
            debug!("executor: running single-threaded");
            self.run_worker(0);
            return;
        }

        debug!("executor: spawning {} workers", self.options.num_threads);
        let handles: Vec<_> = (1..self.options.num_threads)
            .map(|worker_id| {
                let executor = self.clone();
                std::thread::spawn(move || executor.run_worker(worker_id))
            })
            .collect();

        self.run_worker(0);

        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Cooperatively stop all workers: flips the shared stop flag, shuts
    /// down the store so blocked `pop` calls wake with `None`, and calls
    /// `Solver::interrupt` on every currently registered solver.
    pub fn interrupt(&self) {
        debug!("executor: interrupt requested");
        self.should_stop.store(true, Ordering::Release);
        self.store.shutdown();
        let mut solvers = self.solvers.lock().unwrap();
        for solver in solvers.iter() {
            solver.lock().unwrap().interrupt();
        }
        solvers.clear();
    }

    fn run_worker(&self, worker_id: usize) -> WorkerOutcome {
        debug!("executor: worker {worker_id} starting");
        let solver: SharedSolver = Arc::new(Mutex::new((self.options.solver_factory)()));
        self.solvers.lock().unwrap().push(solver.clone());

        let outcome = loop {
            if self.should_stop.load(Ordering::Acquire) {
                break WorkerOutcome::Cancelled;
            }
            let Some(ctx) = self.store.pop() else {
                break WorkerOutcome::Drained;
            };
            trace!("executor: worker {worker_id} popped context {}", ctx.id());

            let step_result = {
                let mut guard = solver.lock().unwrap();
                (self.options.step)(ctx, guard.as_mut())
            };

            match step_result {
                Ok(StepOutcome::Done) => {}
                Ok(StepOutcome::Fork(children)) => {
                    for child in children {
                        self.store.push(child);
                    }
                }
                Ok(StepOutcome::Failed { predicate, model }) => {
                    self.options
                        .failure_logger
                        .log_assertion_failure(&predicate, &model);
                }
                Err(err) => {
                    debug!("executor: worker {worker_id} dropped a context: {err}");
                }
            }
        };

        self.solvers
            .lock()
            .unwrap()
            .retain(|registered| !Arc::ptr_eq(registered, &solver));
        debug!("executor: worker {worker_id} exiting ({outcome:?})");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::externals::{LogFailureLogger, SatResult};

    struct NullSolver;
    impl Solver for NullSolver {
        fn assert(&mut self, _predicate: &crate::ir::OpRef) {}
        fn check_sat(&mut self) -> SatResult {
            SatResult::Sat
        }
        fn model(&mut self) -> Vec<(String, Vec<u8>)> {
            Vec::new()
        }
        fn push(&mut self) {}
        fn pop(&mut self) {}
    }

    fn options_with_step(step: StepFn) -> ExecutorOptions {
        ExecutorOptions {
            solver_factory: Arc::new(|| Box::new(NullSolver) as Box<dyn Solver>),
            num_threads: 1,
            max_queued_contexts: 64,
            step,
            failure_logger: Arc::new(LogFailureLogger),
        }
    }

    #[test]
    fn single_threaded_run_drains_forked_contexts() {
        let executor = Executor::new(options_with_step(Arc::new(|ctx, _solver| {
            if ctx.id() == 0 {
                Ok(StepOutcome::Fork(vec![Context::new(1), Context::new(2)]))
            } else {
                Ok(StepOutcome::Done)
            }
        })));
        executor.run(vec![Context::new(0)]);
        assert!(executor.store().is_empty());
    }

    #[test]
    fn interrupt_stops_a_worker_before_it_drains() {
        let executor = Executor::new(options_with_step(Arc::new(|_ctx, _solver| {
            Ok(StepOutcome::Done)
        })));
        executor.interrupt();
        // After interrupt, running should return promptly without hanging,
        // since the store is already shut down.
        executor.run(vec![Context::new(0)]);
    }
}
