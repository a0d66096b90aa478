//! A single path of symbolic execution: the accumulated path condition plus
//! whatever identity lets diagnostics refer back to it. Move-only by
//! convention (no `Clone` derive) — forking a context is a deliberate act
//! ([`Context::fork`]) that produces a new id, not an implicit copy.

use crate::ir::OpRef;

/// One in-flight symbolic execution path.
#[derive(Debug)]
pub struct Context {
    id: u64,
    path_condition: Vec<OpRef>,
}

impl Context {
    /// A fresh context with an empty path condition.
    pub fn new(id: u64) -> Self {
        Context {
            id,
            path_condition: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The conjuncts accumulated on this path so far.
    pub fn path_condition(&self) -> &[OpRef] {
        &self.path_condition
    }

    /// Add a constraint to this path's condition.
    pub fn assume(&mut self, predicate: OpRef) {
        self.path_condition.push(predicate);
    }

    /// Produce a child context sharing this context's path condition to the
    /// point of the fork, identified by `child_id`. The caller is
    /// responsible for minting a fresh, non-colliding id.
    pub fn fork(&self, child_id: u64) -> Context {
        Context {
            id: child_id,
            path_condition: self.path_condition.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operation::Operation;

    #[test]
    fn fork_copies_path_condition_independently() {
        let mut parent = Context::new(0);
        parent.assume(Operation::constant_bool(true));

        let mut child = parent.fork(1);
        assert_eq!(child.path_condition().len(), 1);

        child.assume(Operation::constant_bool(false));
        assert_eq!(child.path_condition().len(), 2);
        assert_eq!(parent.path_condition().len(), 1);
        assert_ne!(child.id(), parent.id());
    }
}
