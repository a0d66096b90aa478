//! The typed, hash-consed expression IR and the e-graph/e-matching engine
//! built on top of it.

pub mod egraph;
pub mod ematch;
pub mod opcode;
pub mod operation;

pub use egraph::{EClassId, EGraph};
pub use ematch::{associativity, commutativity, Clause, EMatcher, EMatcherBuilder, MatchData, Updater, VarId};
pub use opcode::{FCmpPredicate, ICmpPredicate, Opcode};
pub use operation::{FloatBits, OpRef, Operation};
