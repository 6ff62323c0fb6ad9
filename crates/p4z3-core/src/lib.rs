//! The symbolic execution core: value domain, state, and evaluator for a
//! P4-family data-plane language (§4).
//!
//! This crate takes an already-parsed, already-typechecked [`p4z3_ast::Program`]
//! and a [`p4z3_smt::TermContext`] and produces, for each entry point, the
//! [`interpreter::Value::ControlState`] describing that entry point's
//! observable output in terms of symbolic program inputs.

pub mod interpreter;

pub use interpreter::{evaluate_entry_point, EvalError, EvaluatorConfig, HeaderInvalidRead, SignedIntegerPolicy, State, Value};
