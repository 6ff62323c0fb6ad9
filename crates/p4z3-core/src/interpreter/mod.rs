//! The symbolic execution engine: value domain, layered state, and the
//! AST-walking evaluator that drives them (§4).
//!
//! # Architecture
//!
//! - [`Value`] is the tagged-sum runtime representation (§3, §4.1).
//! - [`State`] holds the variable/static-declaration scope stack, the
//!   accumulated path condition, and the return/exit accumulators branch
//!   merging folds into (§4.1, §9).
//! - [`eval`] walks [`p4z3_ast::Expr`]/[`p4z3_ast::Stmt`] trees against a
//!   [`State`], producing [`Value`]s and mutating state in place.
//! - [`flatten`] turns the final aggregate result into a
//!   [`Value::ControlState`] (§6 ControlState output contract).
//!
//! # Usage
//!
//! ```ignore
//! let ctx = Rc::new(TermContext::new());
//! let mut state = State::new(Rc::clone(&ctx), EvaluatorConfig::default());
//! let result = evaluate_entry_point(&program, &entry, &mut state)?;
//! ```

pub mod error;
pub mod eval;
pub mod flatten;
pub mod state;
pub mod value;

pub use error::EvalError;
pub use state::{EvaluatorConfig, HeaderInvalidRead, SignedIntegerPolicy, State};
pub use value::Value;

use p4z3_ast::{Decl, EntryPoint, Program};

/// Runs one entry point's body to completion and returns the
/// [`Value::ControlState`] describing everything it wrote to its `out`/
/// `inout` parameters (§6). Callers are expected to have already bound
/// fresh symbolic input values for the entry point's `in` parameters via
/// [`State::declare_var`] before calling this.
pub fn evaluate_entry_point(program: &Program, entry: &EntryPoint, state: &mut State) -> Result<Value, EvalError> {
    let decl = program.get(entry.callable).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc: p4z3_ast::SourceLocation::synthetic() })?;
    let callable = match decl {
        Decl::Function(callable) => callable,
        other => {
            return Err(EvalError::TypeMismatch {
                reason: format!("entry point '{}' resolves to a {}, not a callable", entry.name, other.name()),
                loc: p4z3_ast::SourceLocation::synthetic(),
            })
        }
    };

    eval::exec_block(state, program, &callable.body)?;

    let loc = p4z3_ast::SourceLocation::synthetic();
    if let Some(returned) = state.finish_return(loc)? {
        return Ok(flatten::to_control_state(&entry.name, &returned, state.ctx()));
    }
    if let Some(exited) = state.finish_exit(loc)? {
        return Ok(flatten::to_control_state(&entry.name, &exited, state.ctx()));
    }

    let mut entries = Vec::new();
    for param in &callable.params {
        if param.direction.writes_back() {
            let value = state.get_var(&param.name, loc)?.clone();
            let resolved = program.resolve_type(&param.ty).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
            let cast = value.cast(&resolved, state.ctx(), loc)?;
            flatten::flatten(&param.name, &cast, state.ctx(), &mut entries);
        }
    }
    Ok(Value::ControlState(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4z3_ast::{CallableDecl, Param, ParamDirection, Stmt, StmtKind, Type};
    use std::rc::Rc;

    #[test]
    fn entry_point_without_return_flattens_out_params() {
        let mut program = Program::new();
        let param = Param { name: "x".to_string(), ty: Type::Bits { width: 8, signed: false }, direction: ParamDirection::Out };
        let callable = CallableDecl {
            id: p4z3_ast::DeclId(0),
            name: "main".to_string(),
            params: vec![param],
            ret: Type::Void,
            body: vec![Stmt::new(
                StmtKind::Assign {
                    target: p4z3_ast::Expr::new(p4z3_ast::ExprKind::Var("x".to_string()), p4z3_ast::SourceLocation::synthetic()),
                    value: p4z3_ast::Expr::new(p4z3_ast::ExprKind::IntLit("7".to_string()), p4z3_ast::SourceLocation::synthetic()),
                },
                p4z3_ast::SourceLocation::synthetic(),
            )],
        };
        let id = program.declare(Decl::Function(callable)).unwrap();
        program.add_entry_point("main".to_string(), id);

        let ctx = Rc::new(p4z3_smt::TermContext::new());
        let mut state = State::new(Rc::clone(&ctx), EvaluatorConfig::default());
        state.declare_var(
            "x",
            Value::Bitvector(value::Bitvector { term: ctx.fresh("x", p4z3_smt::Sort::Bv(8)), signed: false }),
            Type::Bits { width: 8, signed: false },
        );

        let entry = program.entry_points()[0].clone();
        let result = evaluate_entry_point(&program, &entry, &mut state).unwrap();
        match result {
            Value::ControlState(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].0, "x");
            }
            other => panic!("expected ControlState, got {other:?}"),
        }
    }
}
