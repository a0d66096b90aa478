//! Core of a symbolic execution engine: a typed, hash-consed expression IR,
//! an e-graph/e-matching equality saturation engine built on top of it, and
//! a parallel executor that drains symbolic-execution contexts against an
//! embedder-supplied solver.
//!
//! This crate has no opinion on how expressions get turned into solver
//! queries or how builtins resolve — see [`externals`] for the traits an
//! embedder implements to plug those in.

pub mod config;
pub mod error;
pub mod exec;
pub mod externals;
pub mod ir;
pub mod ty;

pub use error::{Error, Result};
pub use ty::Type;
