//! Evaluator configuration, the layered variable/type scope stack, and the
//! return/exit bookkeeping that backs branch merging (§3, §4.1, §9).
//!
//! Execution is single-threaded and synchronous (§5): there is exactly one
//! [`State`] per evaluation of an entry point, mutated in place as the
//! interpreter walks statements. Branching snapshots the state, evaluates
//! both arms against independent clones, then merges them back with `ite`.

use std::rc::Rc;

use indexmap::IndexMap;
use p4z3_ast::{DeclId, Type};
use p4z3_smt::{Term, TermContext};

use super::error::EvalError;
use super::value::Value;

/// What happens to a signed bitvector arithmetic op whose result cannot be
/// represented at the source width (§6 configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedIntegerPolicy {
    /// Two's-complement wraparound (the bitvector op's native behavior).
    Wrap,
    /// Reject with [`EvalError::BackendError`] when overflow is a tautology.
    ErrOnOverflow,
}

impl Default for SignedIntegerPolicy {
    fn default() -> Self {
        SignedIntegerPolicy::Wrap
    }
}

/// What a read of an invalid header field produces (§6 configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderInvalidRead {
    /// A fresh, unconstrained symbolic value every time (default).
    FreshUndef,
    /// The type's zero value.
    Zero,
}

impl Default for HeaderInvalidRead {
    fn default() -> Self {
        HeaderInvalidRead::FreshUndef
    }
}

/// The three evaluator-wide options named in §6.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorConfig {
    pub signed_integer_policy: SignedIntegerPolicy,
    pub header_invalid_read: HeaderInvalidRead,
    /// When `false`, `cast`-ing a list into a struct/tuple whose arity
    /// doesn't match is lenient-filled rather than rejected (§4.1).
    pub list_arity_strict: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            signed_integer_policy: SignedIntegerPolicy::default(),
            header_invalid_read: HeaderInvalidRead::default(),
            list_arity_strict: false,
        }
    }
}

/// A single lexical scope: local variable bindings introduced by a block
/// or a call frame's parameter bindings.
#[derive(Debug, Clone, Default)]
struct Scope {
    vars: IndexMap<String, Value>,
    /// Each variable's declared type (§3 "Struct/header construction"),
    /// recorded alongside its value so later writes can be cast against it.
    types: IndexMap<String, Type>,
}

/// The interpreter's mutable state for one entry-point evaluation.
///
/// Holds the variable scope stack, the table of static declarations
/// (tables, externs, top-level declaration instances), the accumulated
/// path condition, and the return/exit accumulators that get folded into
/// a result once the entry point's body has been fully walked.
pub struct State {
    ctx: Rc<TermContext>,
    scopes: Vec<Scope>,
    static_decls: IndexMap<DeclId, Value>,
    /// Conjunction of branch conditions taken to reach the current point.
    path_condition: Vec<Term>,
    /// `(path_condition, return_value)` pairs recorded by `Return`
    /// statements, one per path. Folded right-to-left into a single value
    /// once the callable's body finishes (§9 design notes).
    returns: Vec<(Term, Value)>,
    /// Whether a `Return` has already fired on the *current* path
    /// (detects `ReturnAfterReturn`, §7).
    returned_on_path: bool,
    /// `(path_condition, ControlState)` pairs recorded by `Exit`
    /// statements or by falling off the end of an entry point's body.
    exits: Vec<(Term, Value)>,
    config: EvaluatorConfig,
    /// Running counter `gen_instance` consumes to name fresh symbolic
    /// constants, advancing by one per scalar leaf generated so that two
    /// structurally distinct fields never collide on a generated name
    /// (§3 "Struct/header construction").
    flat_id: std::cell::Cell<u64>,
}

impl State {
    pub fn new(ctx: Rc<TermContext>, config: EvaluatorConfig) -> Self {
        State {
            ctx,
            scopes: vec![Scope::default()],
            static_decls: IndexMap::new(),
            path_condition: Vec::new(),
            returns: Vec::new(),
            returned_on_path: false,
            exits: Vec::new(),
            config,
            flat_id: std::cell::Cell::new(0),
        }
    }

    pub fn ctx(&self) -> &TermContext {
        &self.ctx
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// The flat id about to be assigned, without consuming it. Used to
    /// capture an aggregate's own id before any of its scalar descendants
    /// consume ids of their own.
    pub fn peek_flat_id(&self) -> u64 {
        self.flat_id.get()
    }

    /// Consumes and returns the next flat id, advancing the counter.
    pub fn next_flat_id(&self) -> u64 {
        let id = self.flat_id.get();
        self.flat_id.set(id + 1);
        id
    }

    // -- scope stack ------------------------------------------------------

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "popped the outermost scope");
    }

    pub fn declare_var(&mut self, name: &str, value: Value, declared_type: Type) {
        let scope = self.scopes.last_mut().expect("at least one scope is always present");
        scope.vars.insert(name.to_string(), value);
        scope.types.insert(name.to_string(), declared_type);
    }

    /// Casts `value` to the variable's declared type before storing it, so
    /// a plain assignment to a `bit<W>`-typed variable always leaves it
    /// holding a `Bitvector` of that width rather than whatever sort the
    /// right-hand side happened to evaluate to.
    pub fn update_var(&mut self, name: &str, value: Value, loc: p4z3_ast::SourceLocation) -> Result<(), EvalError> {
        let declared_type = self.scopes.iter().rev().find_map(|scope| scope.types.get(name).cloned());
        let cast = match &declared_type {
            Some(ty) => value.cast(ty, &self.ctx, loc)?,
            None => value,
        };
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.vars.get_mut(name) {
                *slot = cast;
                return Ok(());
            }
        }
        Err(EvalError::VarNotFound { name: name.to_string(), loc })
    }

    pub fn get_var(&self, name: &str, loc: p4z3_ast::SourceLocation) -> Result<&Value, EvalError> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.vars.get(name) {
                return Ok(value);
            }
        }
        Err(EvalError::VarNotFound { name: name.to_string(), loc })
    }

    // -- static declarations (tables, externs, top-level instances) ------

    pub fn declare_static(&mut self, id: DeclId, value: Value) {
        self.static_decls.insert(id, value);
    }

    pub fn get_static(&self, id: DeclId, loc: p4z3_ast::SourceLocation) -> Result<&Value, EvalError> {
        self.static_decls
            .get(&id)
            .ok_or_else(|| EvalError::TypeNotFound { name: format!("declaration {id}"), loc })
    }

    // -- path condition ----------------------------------------------------

    /// The conjunction of every branch condition taken to reach this point,
    /// or `true` at the entry point.
    pub fn path_condition(&self) -> Term {
        self.path_condition
            .iter()
            .cloned()
            .reduce(|a, b| self.ctx.bin(p4z3_smt::BinOp::And, a, b))
            .unwrap_or_else(|| self.ctx.bool_val(true))
    }

    fn push_condition(&mut self, cond: Term) {
        self.path_condition.push(cond);
    }

    fn pop_condition(&mut self) {
        self.path_condition.pop();
    }

    /// Clones everything needed to evaluate one branch arm independently:
    /// scopes, static decls, and the return/exit accumulator lengths (so
    /// the caller can tell what each arm newly appended). Deliberately
    /// does not snapshot `flat_id`: it must keep advancing across both
    /// arms of a fork so a fresh instance generated in the then-branch
    /// never collides with one generated in the else-branch.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            scopes: self.scopes.clone(),
            static_decls: self.static_decls.clone(),
            returned_on_path: self.returned_on_path,
        }
    }

    pub fn restore(&mut self, snapshot: StateSnapshot) {
        self.scopes = snapshot.scopes;
        self.static_decls = snapshot.static_decls;
        self.returned_on_path = snapshot.returned_on_path;
    }

    /// Runs `then_branch` and `else_branch` under the given condition,
    /// merging their resulting scopes/static-decls back with `ite`
    /// (invariant I4, §9 "acyclic ownership / deep clone"). Returns after
    /// restoring `self` to the merged state.
    pub fn fork_merge<F1, F2>(&mut self, cond: &Term, then_branch: F1, else_branch: F2) -> Result<(), EvalError>
    where
        F1: FnOnce(&mut State) -> Result<(), EvalError>,
        F2: FnOnce(&mut State) -> Result<(), EvalError>,
    {
        let before = self.snapshot();

        self.push_condition(cond.clone());
        then_branch(self)?;
        self.pop_condition();
        let after_then = self.snapshot();

        self.restore(before.clone());
        let not_cond = self.ctx.not(cond.clone()).map_err(|e| EvalError::backend(e.to_string(), p4z3_ast::SourceLocation::synthetic()))?;
        self.push_condition(not_cond);
        else_branch(self)?;
        self.pop_condition();
        let after_else = self.snapshot();

        self.restore(before);
        self.merge_snapshots(cond, &after_then, &after_else)?;
        self.returned_on_path = after_then.returned_on_path || after_else.returned_on_path;
        Ok(())
    }

    fn merge_snapshots(&mut self, cond: &Term, then_snap: &StateSnapshot, else_snap: &StateSnapshot) -> Result<(), EvalError> {
        let mut scopes = Vec::with_capacity(then_snap.scopes.len());
        for (then_scope, else_scope) in then_snap.scopes.iter().zip(&else_snap.scopes) {
            let mut vars = IndexMap::new();
            for (name, then_val) in &then_scope.vars {
                let merged = match else_scope.vars.get(name) {
                    Some(else_val) => then_val.merge(cond, else_val, &self.ctx, &self.config, p4z3_ast::SourceLocation::synthetic())?,
                    None => then_val.clone(),
                };
                vars.insert(name.clone(), merged);
            }
            scopes.push(Scope { vars, types: then_scope.types.clone() });
        }
        self.scopes = scopes;

        let mut static_decls = IndexMap::new();
        for (id, then_val) in &then_snap.static_decls {
            let merged = match else_snap.static_decls.get(id) {
                Some(else_val) => then_val.merge(cond, else_val, &self.ctx, &self.config, p4z3_ast::SourceLocation::synthetic())?,
                None => then_val.clone(),
            };
            static_decls.insert(*id, merged);
        }
        self.static_decls = static_decls;
        Ok(())
    }

    // -- return / exit bookkeeping ------------------------------------------

    pub fn record_return(&mut self, value: Value, loc: p4z3_ast::SourceLocation) -> Result<(), EvalError> {
        if self.returned_on_path {
            return Err(EvalError::ReturnAfterReturn { loc });
        }
        self.returned_on_path = true;
        self.returns.push((self.path_condition(), value));
        Ok(())
    }

    pub fn record_exit(&mut self, snapshot: Value) {
        self.exits.push((self.path_condition(), snapshot));
    }

    pub fn has_returned_on_current_path(&self) -> bool {
        self.returned_on_path
    }

    /// Folds every recorded return into a single value, right to left, so
    /// the earliest-recorded path wins ties at the fold's base case
    /// (matching `fork_merge`'s then/else convention).
    pub fn finish_return(&self, loc: p4z3_ast::SourceLocation) -> Result<Option<Value>, EvalError> {
        fold_paths(&self.returns, &self.ctx, &self.config, loc)
    }

    pub fn finish_exit(&self, loc: p4z3_ast::SourceLocation) -> Result<Option<Value>, EvalError> {
        fold_paths(&self.exits, &self.ctx, &self.config, loc)
    }
}

fn fold_paths(paths: &[(Term, Value)], ctx: &TermContext, cfg: &EvaluatorConfig, loc: p4z3_ast::SourceLocation) -> Result<Option<Value>, EvalError> {
    let mut iter = paths.iter().rev();
    let mut acc = match iter.next() {
        Some((_, value)) => value.clone(),
        None => return Ok(None),
    };
    for (cond, value) in iter {
        acc = value.merge(cond, &acc, ctx, cfg, loc)?;
    }
    Ok(Some(acc))
}

#[derive(Clone)]
pub struct StateSnapshot {
    scopes: Vec<Scope>,
    static_decls: IndexMap<DeclId, Value>,
    returned_on_path: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4z3_ast::SourceLocation;
    use p4z3_smt::Sort;

    fn fresh_state() -> State {
        State::new(Rc::new(TermContext::new()), EvaluatorConfig::default())
    }

    #[test]
    fn declare_and_get_var_round_trips() {
        let mut state = fresh_state();
        let val = crate::interpreter::value::Value::Bitvector(crate::interpreter::value::Bitvector {
            term: state.ctx().bv_val(8u32, 3u32),
            signed: false,
        });
        state.declare_var("x", val.clone(), Type::Bits { width: 8, signed: false });
        assert_eq!(*state.get_var("x", SourceLocation::synthetic()).unwrap(), val);
    }

    #[test]
    fn missing_var_is_an_error() {
        let state = fresh_state();
        assert!(state.get_var("missing", SourceLocation::synthetic()).is_err());
    }

    #[test]
    fn fork_merge_produces_ite_over_branch_values() {
        let mut state = fresh_state();
        let ctx = Rc::clone(&state.ctx);
        state.declare_var("x", crate::interpreter::value::Value::Bitvector(crate::interpreter::value::Bitvector {
            term: ctx.bv_val(8u32, 0u32),
            signed: false,
        }), Type::Bits { width: 8, signed: false });
        let cond = ctx.named("cond", Sort::Bool);
        state
            .fork_merge(
                &cond,
                |s| {
                    s.update_var("x", crate::interpreter::value::Value::Bitvector(crate::interpreter::value::Bitvector {
                        term: s.ctx().bv_val(8u32, 1u32),
                        signed: false,
                    }), SourceLocation::synthetic())
                },
                |s| {
                    s.update_var("x", crate::interpreter::value::Value::Bitvector(crate::interpreter::value::Bitvector {
                        term: s.ctx().bv_val(8u32, 2u32),
                        signed: false,
                    }), SourceLocation::synthetic())
                },
            )
            .unwrap();
        match state.get_var("x", SourceLocation::synthetic()).unwrap() {
            crate::interpreter::value::Value::Bitvector(bv) => {
                assert!(matches!(bv.term.as_ref(), p4z3_smt::TermNode::Ite { .. }));
            }
            other => panic!("expected Bitvector, got {other:?}"),
        }
    }

    #[test]
    fn return_after_return_is_rejected() {
        let mut state = fresh_state();
        let value = crate::interpreter::value::Value::Void;
        state.record_return(value.clone(), SourceLocation::synthetic()).unwrap();
        assert!(state.record_return(value, SourceLocation::synthetic()).is_err());
    }
}
