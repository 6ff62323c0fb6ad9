//! A first-party term-construction context implementing the SMT backend
//! contract described in §6: bitvector/boolean/integer terms, extend/
//! extract/ite/simplify, and fresh named constants.
//!
//! No third-party SMT solver binding appears anywhere in this workspace's
//! reachable dependency graph, so this crate stands in for it as an
//! explicit term algebra behind the same narrow interface `p4z3-core`
//! would use against a real solver.

pub mod context;
pub mod error;
pub mod term;

pub use context::TermContext;
pub use error::TermError;
pub use term::{BinOp, Sort, Term, TermNode};
