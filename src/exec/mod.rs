//! The parallel executor and its shared context store (§4.4, §5).

mod context;
mod executor;
mod store;

pub use context::Context;
pub use executor::{Executor, ExecutorOptions, StepFn, StepOutcome};
pub use store::ContextStore;
