//! The AST-walking evaluator: expression evaluation, statement execution,
//! calls, and table application (§4.1, §4.2).
//!
//! Unlike a work-list scheduler, this is a plain recursive descent over
//! [`p4z3_ast::Expr`]/[`p4z3_ast::Stmt`] trees — the AST here is a tree,
//! not a dataflow graph, so there is no readiness bookkeeping to do.

use p4z3_ast::{BinaryOp, Decl, Expr, ExprKind, Program, SourceLocation, Stmt, StmtKind, Type, UnaryOp};
use p4z3_smt::{BinOp, Sort};

use super::error::EvalError;
use super::state::State;
use super::value::{Bitvector, IntLiteral, ListValue, Value};

/// Evaluates an expression against the current state, producing a [`Value`].
pub fn eval_expr(state: &mut State, program: &Program, expr: &Expr) -> Result<Value, EvalError> {
    match &expr.kind {
        ExprKind::Var(name) => eval_var(state, name, expr.loc),
        ExprKind::IntLit(text) => {
            let term = state
                .ctx()
                .int_val_from_decimal(text)
                .map_err(|e| EvalError::backend(e.to_string(), expr.loc))?;
            Ok(Value::IntLiteral(IntLiteral { term }))
        }
        ExprKind::BoolLit(b) => Ok(Value::Bitvector(Bitvector { term: state.ctx().bool_val(*b), signed: false })),
        ExprKind::Member { object, field } => {
            let object_val = eval_expr(state, program, object)?;
            eval_member(&object_val, field, expr.loc)
        }
        ExprKind::Unary { op, expr: inner } => {
            let value = eval_expr(state, program, inner)?;
            match op {
                UnaryOp::Neg => value.neg(state.ctx(), expr.loc),
                UnaryOp::BitNot => value.bit_not(state.ctx(), expr.loc),
                UnaryOp::LogicalNot => value.logical_not(state.ctx(), expr.loc),
            }
        }
        ExprKind::Binary { op, lhs, rhs } => eval_binary(state, program, *op, lhs, rhs, expr.loc),
        ExprKind::Cast { target, expr: inner } => {
            let value = eval_expr(state, program, inner)?;
            let resolved = program.resolve_type(target).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc: expr.loc })?;
            coerce_to_type(state, program, value, &resolved, expr.loc)
        }
        ExprKind::Mux { cond, then_expr, else_expr } => eval_mux(state, program, cond, then_expr, else_expr, expr.loc),
        ExprKind::ListLit(elements) => {
            let values = elements.iter().map(|e| eval_expr(state, program, e)).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(ListValue { element_type: Type::Void, elements: values }))
        }
        ExprKind::Call { callee, args } => eval_call(state, program, callee, args, expr.loc),
        ExprKind::MethodCall { object, method, args } => eval_method_call(state, program, object, method, args, expr.loc),
    }
}

fn eval_var(state: &mut State, name: &str, loc: SourceLocation) -> Result<Value, EvalError> {
    state.get_var(name, loc).cloned()
}

/// Coerces a value to `target`, special-casing a list literal being cast
/// into a struct/header (`List::cast_allocate`, §4.1) and otherwise
/// deferring to [`Value::cast`]. Shared by `ExprKind::Cast` and by
/// `VarDecl`'s initializer cast, so both routes normalize a list literal
/// the same way.
fn coerce_to_type(state: &State, program: &Program, value: Value, target: &Type, loc: SourceLocation) -> Result<Value, EvalError> {
    match (&value, target) {
        (Value::List(list), Type::Struct(decl_id)) | (Value::List(list), Type::Header(decl_id)) => {
            let decl = program.get(*decl_id).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
            cast_list_to_aggregate(state, program, list, decl, loc)
        }
        _ => value.cast(target, state.ctx(), loc),
    }
}

/// Struct/header field access, and the validity-gated read of a header
/// field (§3 "Header validity propagation"): reading `field` on an
/// invalid header produces a fresh-undef or zeroed value per config,
/// rather than the stored (possibly stale) one.
fn eval_member(object: &Value, field: &str, loc: SourceLocation) -> Result<Value, EvalError> {
    match object {
        Value::Struct(s) => s.fields.get(field).cloned().ok_or_else(|| EvalError::FieldNotFound { name: field.to_string(), loc }),
        Value::Header(h) => h.fields.get(field).cloned().ok_or_else(|| EvalError::FieldNotFound { name: field.to_string(), loc }),
        other => Err(EvalError::FieldNotFound { name: format!("{field} (on {})", other.type_name()), loc }),
    }
}

fn eval_binary(state: &mut State, program: &Program, op: BinaryOp, lhs: &Expr, rhs: &Expr, loc: SourceLocation) -> Result<Value, EvalError> {
    match op {
        // Short-circuit evaluation is required (§9 design notes): the
        // right operand is only evaluated when it can affect the result.
        BinaryOp::LogicalAnd => {
            let lhs_val = eval_expr(state, program, lhs)?;
            let lhs_term = as_bool_term(&lhs_val, loc)?;
            if is_tautologically_false(state, &lhs_term) {
                Ok(lhs_val)
            } else {
                let rhs_val = eval_expr(state, program, rhs)?;
                lhs_val.binary(BinaryOp::LogicalAnd, &rhs_val, state.ctx(), state.config(), loc)
            }
        }
        BinaryOp::LogicalOr => {
            let lhs_val = eval_expr(state, program, lhs)?;
            let lhs_term = as_bool_term(&lhs_val, loc)?;
            if is_tautologically_true(state, &lhs_term) {
                Ok(lhs_val)
            } else {
                let rhs_val = eval_expr(state, program, rhs)?;
                lhs_val.binary(BinaryOp::LogicalOr, &rhs_val, state.ctx(), state.config(), loc)
            }
        }
        _ => {
            let lhs_val = eval_expr(state, program, lhs)?;
            let rhs_val = eval_expr(state, program, rhs)?;
            lhs_val.binary(op, &rhs_val, state.ctx(), state.config(), loc)
        }
    }
}

fn as_bool_term(value: &Value, loc: SourceLocation) -> Result<p4z3_smt::Term, EvalError> {
    match value {
        Value::Bitvector(b) if b.term.sort() == Sort::Bool => Ok(b.term.clone()),
        other => Err(EvalError::TypeMismatch { reason: format!("expected a boolean, found {}", other.type_name()), loc }),
    }
}

fn is_tautologically_false(state: &State, term: &p4z3_smt::Term) -> bool {
    matches!(state.ctx().simplify(term).as_ref(), p4z3_smt::TermNode::BoolConst(false))
}

fn is_tautologically_true(state: &State, term: &p4z3_smt::Term) -> bool {
    matches!(state.ctx().simplify(term).as_ref(), p4z3_smt::TermNode::BoolConst(true))
}

/// The ternary `cond ? then_expr : else_expr` operator: short-circuits to
/// one side when the simplified condition is a constant, otherwise forks
/// and merges exactly like an `if`-statement (§4.1, §9).
fn eval_mux(state: &mut State, program: &Program, cond: &Expr, then_expr: &Expr, else_expr: &Expr, loc: SourceLocation) -> Result<Value, EvalError> {
    let cond_val = eval_expr(state, program, cond)?;
    let cond_term = as_bool_term(&cond_val, loc)?;
    let simplified = state.ctx().simplify(&cond_term);
    match simplified.as_ref() {
        p4z3_smt::TermNode::BoolConst(true) => eval_expr(state, program, then_expr),
        p4z3_smt::TermNode::BoolConst(false) => eval_expr(state, program, else_expr),
        _ => {
            let mut then_val = None;
            let mut else_val = None;
            state.fork_merge(
                &cond_term,
                |s| {
                    then_val = Some(eval_expr(s, program, then_expr)?);
                    Ok(())
                },
                |s| {
                    else_val = Some(eval_expr(s, program, else_expr)?);
                    Ok(())
                },
            )?;
            let then_val = then_val.expect("then branch always runs in fork_merge");
            let else_val = else_val.expect("else branch always runs in fork_merge");
            then_val.merge(&cond_term, &else_val, state.ctx(), state.config(), loc)
        }
    }
}

fn eval_call(state: &mut State, program: &Program, callee: &str, args: &[Expr], loc: SourceLocation) -> Result<Value, EvalError> {
    let decl = program.get_by_name(callee).map_err(|e| EvalError::VarNotFound { name: e.to_string(), loc })?;
    match decl {
        Decl::Function(callable) => {
            let arg_values = args.iter().map(|a| eval_expr(state, program, a)).collect::<Result<Vec<_>, _>>()?;
            call_function(state, program, callable, arg_values, args, loc)
        }
        other => Err(EvalError::TypeMismatch { reason: format!("'{callee}' ({}) is not callable", other.name()), loc }),
    }
}

/// Invokes a callable with copy-in/copy-out parameter semantics (§8
/// concrete scenario 6): `in`/`inout` parameters bind fresh locals from
/// the caller's argument values; `out`/`inout` parameters are written
/// back into the caller's argument slots after the body runs.
fn call_function(
    state: &mut State,
    program: &Program,
    callable: &p4z3_ast::CallableDecl,
    arg_values: Vec<Value>,
    arg_exprs: &[Expr],
    loc: SourceLocation,
) -> Result<Value, EvalError> {
    state.push_scope();
    for (param, value) in callable.params.iter().zip(&arg_values) {
        let resolved = program.resolve_type(&param.ty).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
        if param.direction.reads_argument() {
            state.declare_var(&param.name, value.copy(), resolved);
        } else {
            state.declare_var(&param.name, Value::Void, resolved);
        }
    }

    exec_block(state, program, &callable.body)?;
    let result = state.finish_return(loc)?.unwrap_or(Value::Void);

    for (param, arg_expr) in callable.params.iter().zip(arg_exprs) {
        if param.direction.writes_back() {
            let out_value = state.get_var(&param.name, loc)?.clone();
            write_back(state, program, arg_expr, out_value, loc)?;
        }
    }
    state.pop_scope();
    Ok(result)
}

/// Writes an `out`/`inout` parameter's final value back into the
/// caller-visible variable the corresponding argument expression named.
fn write_back(state: &mut State, program: &Program, arg_expr: &Expr, value: Value, loc: SourceLocation) -> Result<(), EvalError> {
    match &arg_expr.kind {
        ExprKind::Var(name) => state.update_var(name, value, loc),
        ExprKind::Member { object, field } => {
            let mut object_val = eval_expr(state, program, object)?;
            set_member(&mut object_val, field, value, state.ctx(), loc)?;
            write_back(state, program, object, object_val, loc)
        }
        _ => Err(EvalError::TypeMismatch { reason: "out/inout argument must be an lvalue".to_string(), loc }),
    }
}

/// Writes `value` into `object`'s `field`, casting it to the field's
/// declared type first (invariant I1: a field's declared type never
/// changes after declaration).
fn set_member(object: &mut Value, field: &str, value: Value, ctx: &p4z3_smt::TermContext, loc: SourceLocation) -> Result<(), EvalError> {
    match object {
        Value::Struct(s) => {
            let declared = s.field_types.get(field).cloned();
            let slot = s.fields.get_mut(field).ok_or_else(|| EvalError::FieldNotFound { name: field.to_string(), loc })?;
            *slot = match &declared {
                Some(ty) => value.cast(ty, ctx, loc)?,
                None => value,
            };
            Ok(())
        }
        Value::Header(h) => {
            let declared = h.field_types.get(field).cloned();
            let slot = h.fields.get_mut(field).ok_or_else(|| EvalError::FieldNotFound { name: field.to_string(), loc })?;
            *slot = match &declared {
                Some(ty) => value.cast(ty, ctx, loc)?,
                None => value,
            };
            Ok(())
        }
        other => Err(EvalError::FieldNotFound { name: format!("{field} (on {})", other.type_name()), loc }),
    }
}

/// Header built-in methods (§4.1): `setValid()`, `setInvalid()`, and
/// `isValid()`. Any other method call targets an [`Value::Extern`]
/// instance, whose method-lookup-miss is fatal (§3 "Declaration / Table
/// / Extern").
fn eval_method_call(state: &mut State, program: &Program, object: &Expr, method: &str, args: &[Expr], loc: SourceLocation) -> Result<Value, EvalError> {
    let object_val = eval_expr(state, program, object)?;
    match (&object_val, method) {
        (Value::Header(h), "isValid") => Ok(Value::Bitvector(Bitvector { term: h.valid.clone(), signed: false })),
        (Value::Header(_), "setValid") => {
            let mut h = match object_val {
                Value::Header(h) => h,
                _ => unreachable!(),
            };
            h.valid = state.ctx().bool_val(true);
            write_back(state, program, object, Value::Header(h), loc)?;
            Ok(Value::Void)
        }
        (Value::Header(_), "setInvalid") => {
            let mut h = match object_val {
                Value::Header(h) => h,
                _ => unreachable!(),
            };
            h.valid = state.ctx().bool_val(false);
            write_back(state, program, object, Value::Header(h), loc)?;
            Ok(Value::Void)
        }
        (Value::Extern(ext), _) => {
            if !ext.methods.iter().any(|m| m == method) {
                return Err(EvalError::FieldNotFound { name: format!("{method} on extern {}", ext.type_name), loc });
            }
            for arg in args {
                eval_expr(state, program, arg)?;
            }
            let term = state.ctx().fresh(&format!("{}_{}", ext.type_name, method), Sort::Bv(32));
            Ok(Value::Bitvector(Bitvector { term, signed: false }))
        }
        (other, _) => Err(EvalError::FieldNotFound { name: format!("{method} on {}", other.type_name()), loc }),
    }
}

/// Executes a block of statements in a fresh scope, stopping early once a
/// `Return` has fired on the current path.
pub fn exec_block(state: &mut State, program: &Program, stmts: &[Stmt]) -> Result<(), EvalError> {
    for stmt in stmts {
        if state.has_returned_on_current_path() {
            break;
        }
        exec_stmt(state, program, stmt)?;
    }
    Ok(())
}

pub fn exec_stmt(state: &mut State, program: &Program, stmt: &Stmt) -> Result<(), EvalError> {
    match &stmt.kind {
        StmtKind::VarDecl { name, ty, init } => {
            let resolved = program.resolve_type(ty).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc: stmt.loc })?;
            let value = match init {
                Some(expr) => {
                    let evaluated = eval_expr(state, program, expr)?;
                    coerce_to_type(state, program, evaluated, &resolved, stmt.loc)?
                }
                None => gen_instance(state, program, &resolved, None, stmt.loc)?,
            };
            state.declare_var(name, value, resolved);
            Ok(())
        }
        StmtKind::Assign { target, value } => {
            let new_value = eval_expr(state, program, value)?;
            write_back(state, program, target, new_value, stmt.loc)
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            let cond_val = eval_expr(state, program, cond)?;
            let cond_term = as_bool_term(&cond_val, stmt.loc)?;
            let simplified = state.ctx().simplify(&cond_term);
            match simplified.as_ref() {
                p4z3_smt::TermNode::BoolConst(true) => exec_block(state, program, then_branch),
                p4z3_smt::TermNode::BoolConst(false) => exec_block(state, program, else_branch),
                _ => state.fork_merge(
                    &cond_term,
                    |s| exec_block(s, program, then_branch),
                    |s| exec_block(s, program, else_branch),
                ),
            }
        }
        StmtKind::Return { value } => {
            let result = match value {
                Some(expr) => eval_expr(state, program, expr)?,
                None => Value::Void,
            };
            state.record_return(result, stmt.loc)
        }
        StmtKind::Exit => {
            // Also records a return so exec_block's has_returned_on_current_path
            // check halts the rest of this path the same way a Return would.
            state.record_exit(Value::Void);
            state.record_return(Value::Void, stmt.loc)
        }
        StmtKind::TableApply { table } => exec_table_apply(state, program, table, stmt.loc),
        StmtKind::ExprStmt(expr) => {
            eval_expr(state, program, expr)?;
            Ok(())
        }
        StmtKind::Block(stmts) => exec_block(state, program, stmts),
    }
}

/// Produces a fresh symbolic value of the given type — the factory named
/// `gen_instance` in §4.2, used for locals/parameters declared without an
/// initializer and for seeding an entry point's `in` parameters with
/// unconstrained symbolic inputs (e.g. from the CLI).
pub fn undefined_value_for(state: &State, program: &Program, ty: &Type, loc: SourceLocation) -> Result<Value, EvalError> {
    let resolved = program.resolve_type(ty).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
    gen_instance(state, program, &resolved, None, loc)
}

/// Recursively builds a fresh symbolic value of `ty` (grounded in the
/// source sketch's `StructBase` constructor / `HeaderInstance::propagate_validity`,
/// §3 "Struct/header construction", "Header validity propagation"). For
/// struct/header-typed fields, `parent_valid` carries the enclosing
/// header's validity term down so nested headers share one boolean
/// constant; `None` means this call is at the top of its own validity
/// scope and should mint a fresh one.
fn gen_instance(
    state: &State,
    program: &Program,
    ty: &Type,
    parent_valid: Option<&p4z3_smt::Term>,
    loc: SourceLocation,
) -> Result<Value, EvalError> {
    match ty {
        Type::Bits { width, signed } => {
            let id = state.next_flat_id();
            Ok(Value::Bitvector(Bitvector { term: state.ctx().named(id.to_string(), Sort::Bv(*width)), signed: *signed }))
        }
        Type::Varbits { max_width } => {
            let id = state.next_flat_id();
            Ok(Value::Bitvector(Bitvector { term: state.ctx().named(id.to_string(), Sort::Bv(*max_width)), signed: false }))
        }
        Type::Bool => {
            let id = state.next_flat_id();
            Ok(Value::Bitvector(Bitvector { term: state.ctx().named(id.to_string(), Sort::Bool), signed: false }))
        }
        Type::Integer => {
            let id = state.next_flat_id();
            Ok(Value::IntLiteral(IntLiteral { term: state.ctx().named(id.to_string(), Sort::Int) }))
        }
        Type::Enum(decl_id) => {
            let decl = program.get(*decl_id).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
            let id = state.next_flat_id();
            let term = state.ctx().named(id.to_string(), Sort::Bv(32));
            Ok(Value::Enum(super::value::EnumValue { decl: *decl_id, type_name: decl.name().to_string(), term }))
        }
        Type::Error(decl_id) => {
            let decl = program.get(*decl_id).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
            let id = state.next_flat_id();
            let term = state.ctx().named(id.to_string(), Sort::Bv(32));
            Ok(Value::ErrorSet(super::value::EnumValue { decl: *decl_id, type_name: decl.name().to_string(), term }))
        }
        Type::Extern(decl_id) => {
            let decl = program.get(*decl_id).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
            let methods = match decl {
                Decl::Extern(e) => e.methods.clone(),
                _ => Vec::new(),
            };
            Ok(Value::Extern(super::value::ExternValue { decl: *decl_id, type_name: decl.name().to_string(), methods }))
        }
        Type::Struct(decl_id) => {
            let decl = program.get(*decl_id).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
            let member_id = state.peek_flat_id();
            let mut fields = indexmap::IndexMap::new();
            let mut field_types = indexmap::IndexMap::new();
            let mut width = 0u64;
            for field in decl.fields() {
                let resolved = program.resolve_type(&field.ty).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
                let value = gen_instance(state, program, &resolved, parent_valid, loc)?;
                width += field_width(&value);
                field_types.insert(field.name.clone(), resolved);
                fields.insert(field.name.clone(), value);
            }
            Ok(Value::Struct(super::value::StructValue { decl: *decl_id, type_name: decl.name().to_string(), member_id, width, fields, field_types }))
        }
        Type::Header(decl_id) => {
            let decl = program.get(*decl_id).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
            let member_id = state.peek_flat_id();
            let valid = match parent_valid {
                Some(v) => v.clone(),
                None => state.ctx().named(format!("{member_id}_valid"), Sort::Bool),
            };
            let mut fields = indexmap::IndexMap::new();
            let mut field_types = indexmap::IndexMap::new();
            let mut width = 0u64;
            for field in decl.fields() {
                let resolved = program.resolve_type(&field.ty).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
                let value = gen_instance(state, program, &resolved, Some(&valid), loc)?;
                width += field_width(&value);
                field_types.insert(field.name.clone(), resolved);
                fields.insert(field.name.clone(), value);
            }
            Ok(Value::Header(super::value::HeaderValue { decl: *decl_id, type_name: decl.name().to_string(), member_id, width, fields, field_types, valid }))
        }
        other => Err(EvalError::UnsupportedCast { target: format!("{other:?}"), loc }),
    }
}

fn field_width(value: &Value) -> u64 {
    match value {
        Value::Bitvector(b) if b.term.sort() == Sort::Bool => 1,
        Value::Bitvector(b) => b.width() as u64,
        Value::Struct(s) => s.width,
        Value::Header(h) => h.width,
        Value::Enum(_) | Value::ErrorSet(_) => 32,
        _ => 0,
    }
}

/// `List::cast_allocate` (§4.1): zips a list literal's elements with a
/// struct/header's declared fields in order. Shorter lists are lenient-
/// filled with fresh instances of the missing fields' types when
/// `list_arity_strict` is off; otherwise any arity mismatch is fatal.
fn cast_list_to_aggregate(state: &State, program: &Program, list: &ListValue, decl: &Decl, loc: SourceLocation) -> Result<Value, EvalError> {
    let fields = decl.fields();
    if list.elements.len() > fields.len() || (state.config().list_arity_strict && list.elements.len() != fields.len()) {
        return Err(EvalError::ListArityMismatch { expected: fields.len(), found: list.elements.len(), loc });
    }
    let member_id = state.peek_flat_id();
    let mut values = indexmap::IndexMap::new();
    let mut field_types = indexmap::IndexMap::new();
    let mut width = 0u64;
    for (index, field) in fields.iter().enumerate() {
        let resolved = program.resolve_type(&field.ty).map_err(|e| EvalError::TypeNotFound { name: e.to_string(), loc })?;
        let value = match list.elements.get(index) {
            Some(v) => v.cast(&resolved, state.ctx(), loc)?,
            None => gen_instance(state, program, &resolved, None, loc)?,
        };
        width += field_width(&value);
        field_types.insert(field.name.clone(), resolved);
        values.insert(field.name.clone(), value);
    }
    match decl {
        Decl::Header(h) => {
            let valid = state.ctx().named(format!("{member_id}_valid"), Sort::Bool);
            Ok(Value::Header(super::value::HeaderValue { decl: h.id, type_name: h.name.clone(), member_id, width, fields: values, field_types, valid }))
        }
        Decl::Struct(s) => Ok(Value::Struct(super::value::StructValue { decl: s.id, type_name: s.name.clone(), member_id, width, fields: values, field_types })),
        other => Err(EvalError::TypeMismatch { reason: format!("'{}' is not a struct or header", other.name()), loc }),
    }
}

/// Applies a table as a symbolic, non-deterministic choice among its
/// actions, gated by a fresh `hit` boolean (§3 "Declaration / Table /
/// Extern", §4.1). Exactly one action fires per path once `hit` is true;
/// solver-level mutual exclusivity of the selector equalities is left to
/// whatever consumes the produced constraints, matching the "no proving"
/// non-goal (§1).
fn exec_table_apply(state: &mut State, program: &Program, table_name: &str, loc: SourceLocation) -> Result<(), EvalError> {
    let decl = program.get_by_name(table_name).map_err(|e| EvalError::VarNotFound { name: e.to_string(), loc })?;
    let decl_id = decl.id();
    let table = match state.get_static(decl_id, loc)?.clone() {
        Value::Table(t) => t,
        other => return Err(EvalError::TypeMismatch { reason: format!("'{table_name}' is a {}, not a table", other.type_name()), loc }),
    };

    // Key expressions are evaluated for their side effects / to surface
    // evaluation errors; `hit` stays unconstrained either way (§1 "no
    // proving" non-goal means we never check the keys against table entries).
    for key in &table.keys {
        eval_expr(state, program, key)?;
    }

    tracing::debug!(table = %table.table_name, actions = table.actions.len(), "applying table");
    let hit = state.ctx().fresh(&format!("{}_hit", table.table_name), Sort::Bool);
    let selector = state.ctx().fresh(&format!("{}_action", table.table_name), Sort::Bv(32));

    for (index, action) in table.actions.iter().enumerate() {
        let idx_term = state.ctx().bv_val(32u32, index as u32);
        let matches_selector = state.ctx().bin(BinOp::Eq, selector.clone(), idx_term);
        let guard = state.ctx().bin(BinOp::And, hit.clone(), matches_selector);
        let action = action.clone();
        state.fork_merge(
            &guard,
            |s| {
                eval_expr(s, program, &action)?;
                Ok(())
            },
            |_| Ok(()),
        )?;
    }

    let mut updated = table;
    updated.hit = hit;
    state.declare_static(decl_id, Value::Table(updated));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4z3_ast::{DeclId, Field, HeaderDecl, StructDecl};
    use std::rc::Rc;

    fn fresh_state() -> State {
        State::new(Rc::new(p4z3_smt::TermContext::new()), super::super::state::EvaluatorConfig::default())
    }

    #[test]
    fn gen_instance_for_struct_gives_every_field_a_distinct_fresh_name() {
        let mut program = Program::new();
        let decl = Decl::Struct(StructDecl {
            id: DeclId(1),
            name: "Meta".to_string(),
            fields: vec![
                Field { name: "a".to_string(), ty: Type::Bits { width: 8, signed: false } },
                Field { name: "b".to_string(), ty: Type::Bits { width: 8, signed: false } },
            ],
        });
        program.declare(decl).unwrap();
        let state = fresh_state();

        let value = undefined_value_for(&state, &program, &Type::Struct(DeclId(1)), SourceLocation::synthetic()).unwrap();
        let Value::Struct(s) = value else { panic!("expected a struct") };
        let a = match &s.fields["a"] {
            Value::Bitvector(b) => b.term.clone(),
            _ => panic!("expected a bitvector"),
        };
        let b = match &s.fields["b"] {
            Value::Bitvector(b) => b.term.clone(),
            _ => panic!("expected a bitvector"),
        };
        assert_ne!(a, b);
        assert_eq!(s.width, 16);
    }

    #[test]
    fn gen_instance_for_header_names_validity_by_its_own_flat_id() {
        let mut program = Program::new();
        let decl = Decl::Header(HeaderDecl {
            id: DeclId(1),
            name: "Ethernet".to_string(),
            fields: vec![Field { name: "dst".to_string(), ty: Type::Bits { width: 48, signed: false } }],
        });
        program.declare(decl).unwrap();
        let state = fresh_state();

        let value = undefined_value_for(&state, &program, &Type::Header(DeclId(1)), SourceLocation::synthetic()).unwrap();
        let Value::Header(h) = value else { panic!("expected a header") };
        match h.valid.as_ref() {
            p4z3_smt::TermNode::Symbol { name, .. } => assert_eq!(name, "0_valid"),
            other => panic!("expected a named symbol, got {other:?}"),
        }
        assert_eq!(h.width, 48);
    }

    #[test]
    fn gen_instance_propagates_header_validity_into_nested_header_field() {
        let mut program = Program::new();
        let inner = Decl::Header(HeaderDecl {
            id: DeclId(1),
            name: "Inner".to_string(),
            fields: vec![Field { name: "x".to_string(), ty: Type::Bits { width: 8, signed: false } }],
        });
        program.declare(inner).unwrap();
        let outer = Decl::Header(HeaderDecl {
            id: DeclId(2),
            name: "Outer".to_string(),
            fields: vec![Field { name: "inner".to_string(), ty: Type::Header(DeclId(1)) }],
        });
        program.declare(outer).unwrap();
        let state = fresh_state();

        let value = undefined_value_for(&state, &program, &Type::Header(DeclId(2)), SourceLocation::synthetic()).unwrap();
        let Value::Header(outer_h) = value else { panic!("expected a header") };
        let Value::Header(inner_h) = &outer_h.fields["inner"] else { panic!("expected a nested header") };
        assert_eq!(outer_h.valid, inner_h.valid);
    }

    #[test]
    fn cast_list_to_aggregate_fills_missing_fields_when_lenient() {
        let mut program = Program::new();
        let decl = Decl::Struct(StructDecl {
            id: DeclId(1),
            name: "Meta".to_string(),
            fields: vec![
                Field { name: "a".to_string(), ty: Type::Bits { width: 8, signed: false } },
                Field { name: "b".to_string(), ty: Type::Bits { width: 8, signed: false } },
            ],
        });
        program.declare(decl.clone()).unwrap();
        let state = fresh_state();
        let ctx = state.ctx();
        let list = ListValue { element_type: Type::Void, elements: vec![Value::Bitvector(Bitvector { term: ctx.bv_val(8u32, 5u32), signed: false })] };

        let value = cast_list_to_aggregate(&state, &program, &list, &decl, SourceLocation::synthetic()).unwrap();
        let Value::Struct(s) = value else { panic!("expected a struct") };
        assert_eq!(s.fields["a"], Value::Bitvector(Bitvector { term: ctx.bv_val(8u32, 5u32), signed: false }));
        assert!(s.fields.contains_key("b"));
    }

    #[test]
    fn cast_list_to_aggregate_rejects_arity_mismatch_when_strict() {
        let mut program = Program::new();
        let decl = Decl::Struct(StructDecl {
            id: DeclId(1),
            name: "Meta".to_string(),
            fields: vec![Field { name: "a".to_string(), ty: Type::Bits { width: 8, signed: false } }],
        });
        program.declare(decl.clone()).unwrap();
        let ctx = Rc::new(p4z3_smt::TermContext::new());
        let mut config = super::super::state::EvaluatorConfig::default();
        config.list_arity_strict = true;
        let state = State::new(ctx, config);
        let list = ListValue { element_type: Type::Void, elements: vec![] };

        let err = cast_list_to_aggregate(&state, &program, &list, &decl, SourceLocation::synthetic()).unwrap_err();
        assert!(matches!(err, EvalError::ListArityMismatch { .. }));
    }
}
