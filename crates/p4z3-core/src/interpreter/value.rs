//! The symbolic value domain (§3, §4.1).
//!
//! [`Value`] is a tagged sum replacing the source sketch's virtual-dispatch
//! value hierarchy: every operation dispatches by pattern match instead of
//! a downcast. Aggregates own their member values directly; there is no
//! separate heap or pointer indirection beyond the `Rc`-shared SMT terms
//! each scalar value carries.

use indexmap::IndexMap;
use num_bigint::BigUint;
use p4z3_ast::{DeclId, SourceLocation, Type};
use p4z3_smt::{BinOp, Sort, Term, TermContext};

use super::error::EvalError;
use super::state::EvaluatorConfig;

/// Width-1 "booleans count as 1" per invariant I3: a `Sort::Bool` term is
/// treated as a one-bit quantity wherever a width is needed.
fn term_width(term: &Term) -> u32 {
    match term.sort() {
        Sort::Bv(w) => w,
        Sort::Bool => 1,
        Sort::Int => 0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bitvector {
    pub term: Term,
    pub signed: bool,
}

impl Bitvector {
    pub fn width(&self) -> u32 {
        term_width(&self.term)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntLiteral {
    pub term: Term,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub decl: DeclId,
    pub type_name: String,
    pub member_id: u64,
    pub width: u64,
    pub fields: IndexMap<String, Value>,
    /// Each field's declared type, so a member write can be cast against it
    /// (invariant I1: a field's declared type never changes).
    pub field_types: IndexMap<String, Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderValue {
    pub decl: DeclId,
    pub type_name: String,
    pub member_id: u64,
    pub width: u64,
    pub fields: IndexMap<String, Value>,
    pub field_types: IndexMap<String, Type>,
    pub valid: Term,
}

/// Enum and Error share this shape (§3: "ErrorSet | same shape as Enum").
/// `term` is the single opaque bitvector-32 constant this instance
/// currently holds, either a fresh unconstrained value (from
/// `gen_instance`) or one of the type's named member constants.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub decl: DeclId,
    pub type_name: String,
    pub term: Term,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListValue {
    pub element_type: Type,
    pub elements: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableValue {
    pub decl: DeclId,
    pub table_name: String,
    pub hit: Term,
    pub keys: Vec<p4z3_ast::Expr>,
    pub actions: Vec<p4z3_ast::Expr>,
    pub immutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternValue {
    pub decl: DeclId,
    pub type_name: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bitvector(Bitvector),
    IntLiteral(IntLiteral),
    Struct(StructValue),
    Header(HeaderValue),
    Enum(EnumValue),
    ErrorSet(EnumValue),
    List(ListValue),
    Declaration(DeclId),
    Table(TableValue),
    Extern(ExternValue),
    FunctionHandle(String),
    Void,
    ControlState(Vec<(String, Term)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bitvector(_) => "Bitvector",
            Value::IntLiteral(_) => "IntLiteral",
            Value::Struct(_) => "Struct",
            Value::Header(_) => "Header",
            Value::Enum(_) => "Enum",
            Value::ErrorSet(_) => "ErrorSet",
            Value::List(_) => "List",
            Value::Declaration(_) => "Declaration",
            Value::Table(_) => "Table",
            Value::Extern(_) => "Extern",
            Value::FunctionHandle(_) => "FunctionHandle",
            Value::Void => "Void",
            Value::ControlState(_) => "ControlState",
        }
    }

    /// Deep copy (§4.1 `copy()`, §9 "copy semantics"). `Term`s are small
    /// `Rc`-shared handles into the term context, so cloning the `Value`
    /// tree is already the full independent copy the spec asks for —
    /// writing through one copy never perturbs the other.
    pub fn copy(&self) -> Value {
        self.clone()
    }

    // -- unary algebra --------------------------------------------------

    pub fn neg(&self, ctx: &TermContext, loc: SourceLocation) -> Result<Value, EvalError> {
        match self {
            Value::Bitvector(a) => Ok(Value::Bitvector(Bitvector { term: ctx.neg(a.term.clone()), signed: a.signed })),
            Value::IntLiteral(a) => Ok(Value::IntLiteral(IntLiteral { term: ctx.int_neg(a.term.clone()) })),
            other => Err(type_mismatch(format!("neg not defined on {}", other.type_name()), loc)),
        }
    }

    pub fn bit_not(&self, ctx: &TermContext, loc: SourceLocation) -> Result<Value, EvalError> {
        match self {
            Value::Bitvector(a) => Ok(Value::Bitvector(Bitvector { term: ctx.bvnot(a.term.clone()), signed: a.signed })),
            other => Err(type_mismatch(format!("bit_not not defined on {}", other.type_name()), loc)),
        }
    }

    pub fn logical_not(&self, ctx: &TermContext, loc: SourceLocation) -> Result<Value, EvalError> {
        match self {
            Value::Bitvector(a) if a.term.sort() == Sort::Bool => {
                let term = ctx.not(a.term.clone()).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::Bitvector(Bitvector { term, signed: false }))
            }
            other => Err(type_mismatch(format!("logical_not not defined on {}", other.type_name()), loc)),
        }
    }

    // -- binary algebra ---------------------------------------------------

    pub fn binary(
        &self,
        op: p4z3_ast::BinaryOp,
        other: &Value,
        ctx: &TermContext,
        cfg: &EvaluatorConfig,
        loc: SourceLocation,
    ) -> Result<Value, EvalError> {
        use p4z3_ast::BinaryOp::*;
        match op {
            LogicalAnd | LogicalOr => logical_binary(self, op, other, ctx, loc),
            Concat => concat(self, other, ctx, loc),
            _ => numeric_binary(self, op, other, ctx, cfg, loc),
        }
    }

    // -- cast -------------------------------------------------------------

    pub fn cast(&self, target: &Type, ctx: &TermContext, loc: SourceLocation) -> Result<Value, EvalError> {
        match (self, target) {
            (Value::Bitvector(a), Type::Bits { width, signed }) => {
                let term = align_bv_width(&a.term, a.width(), *width, ctx);
                Ok(Value::Bitvector(Bitvector { term, signed: *signed }))
            }
            (Value::Bitvector(a), Type::Integer) => {
                let as_unsigned = if a.signed {
                    // reinterpret as nonnegative integer via decimal normalization
                    ctx.bv_to_int(a.term.clone())
                } else {
                    ctx.bv_to_int(a.term.clone())
                };
                Ok(Value::IntLiteral(IntLiteral { term: as_unsigned }))
            }
            (Value::Bitvector(a), Type::Bool) => match a.term.sort() {
                Sort::Bool => Ok(self.clone()),
                Sort::Bv(1) => {
                    let one = ctx.bv_val(1u32, 1u32);
                    let term = ctx.bin(BinOp::Eq, a.term.clone(), one);
                    Ok(Value::Bitvector(Bitvector { term, signed: false }))
                }
                _ => Err(unsupported_cast("bool", loc)),
            },
            (Value::IntLiteral(a), Type::Bits { width, signed }) => {
                let term = ctx.int_to_bv(a.term.clone(), *width);
                Ok(Value::Bitvector(Bitvector { term, signed: *signed }))
            }
            (Value::IntLiteral(_), Type::Integer) => Ok(self.clone()),
            (Value::Struct(s), Type::Struct(id)) if s.decl == *id => Ok(self.clone()),
            (Value::Header(h), Type::Header(id)) if h.decl == *id => Ok(self.clone()),
            (Value::Enum(e), Type::Enum(id)) if e.decl == *id => Ok(self.clone()),
            (Value::ErrorSet(e), Type::Error(id)) if e.decl == *id => Ok(self.clone()),
            (Value::Extern(x), Type::Extern(id)) if x.decl == *id => Ok(self.clone()),
            (Value::List(_), Type::List(_)) | (Value::List(_), Type::Tuple(_)) => Ok(self.clone()),
            (Value::Declaration(_), _) | (Value::Table(_), _) | (Value::FunctionHandle(_), _) => Ok(self.clone()),
            (Value::Void, Type::Void) => Ok(self.clone()),
            _ => Err(unsupported_cast(&format!("{:?}", target), loc)),
        }
    }

    // -- merge --------------------------------------------------------------

    /// `merge(cond, other)`: replaces `self` with the `ite(cond, other, self)`
    /// combination, per §4.1/§4.2. `self` plays the "else" role and `other`
    /// the "then" role, consistently across every variant.
    pub fn merge(&self, cond: &Term, other: &Value, ctx: &TermContext, cfg: &EvaluatorConfig, loc: SourceLocation) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Bitvector(a), Value::Bitvector(b)) => {
                let b_aligned = align_bv_width(&b.term, b.width(), a.width(), ctx);
                let term = ctx.ite(cond.clone(), b_aligned, a.term.clone()).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::Bitvector(Bitvector { term, signed: a.signed }))
            }
            (Value::Bitvector(a), Value::IntLiteral(b)) => {
                let b_bv = ctx.int_to_bv(b.term.clone(), a.width());
                let term = ctx.ite(cond.clone(), b_bv, a.term.clone()).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::Bitvector(Bitvector { term, signed: a.signed }))
            }
            (Value::IntLiteral(a), Value::Bitvector(b)) => {
                // The bitvector side's width always wins, even when it is
                // the "then" operand (source sketch's asymmetric
                // Z3Int::merge convention, §9 design notes).
                let a_bv = ctx.int_to_bv(a.term.clone(), b.width());
                let term = ctx.ite(cond.clone(), b.term.clone(), a_bv).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::Bitvector(Bitvector { term, signed: b.signed }))
            }
            (Value::IntLiteral(a), Value::IntLiteral(b)) => {
                let term = ctx.ite(cond.clone(), b.term.clone(), a.term.clone()).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::IntLiteral(IntLiteral { term }))
            }
            (Value::Struct(a), Value::Struct(b)) => {
                let mut fields = IndexMap::new();
                for (name, a_field) in &a.fields {
                    let b_field = b.fields.get(name).ok_or_else(|| EvalError::FieldNotFound { name: name.clone(), loc })?;
                    fields.insert(name.clone(), a_field.merge(cond, b_field, ctx, cfg, loc)?);
                }
                Ok(Value::Struct(StructValue { fields, ..a.clone() }))
            }
            (Value::Header(a), Value::Header(b)) => {
                let mut fields = IndexMap::new();
                for (name, a_field) in &a.fields {
                    let b_field = b.fields.get(name).ok_or_else(|| EvalError::FieldNotFound { name: name.clone(), loc })?;
                    fields.insert(name.clone(), a_field.merge(cond, b_field, ctx, cfg, loc)?);
                }
                let valid = ctx.ite(cond.clone(), b.valid.clone(), a.valid.clone()).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::Header(HeaderValue { fields, valid, ..a.clone() }))
            }
            (Value::Enum(a), Value::Enum(b)) => {
                let term = ctx.ite(cond.clone(), b.term.clone(), a.term.clone()).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::Enum(EnumValue { term, ..a.clone() }))
            }
            (Value::ErrorSet(a), Value::ErrorSet(b)) => {
                let term = ctx.ite(cond.clone(), b.term.clone(), a.term.clone()).map_err(|e| EvalError::backend(e.to_string(), loc))?;
                Ok(Value::ErrorSet(EnumValue { term, ..a.clone() }))
            }
            (Value::List(a), Value::List(b)) if a.elements.len() == b.elements.len() => {
                let elements = a
                    .elements
                    .iter()
                    .zip(&b.elements)
                    .map(|(x, y)| x.merge(cond, y, ctx, cfg, loc))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(ListValue { elements, element_type: a.element_type.clone() }))
            }
            // Variants carrying no symbolic content merge by keeping the
            // "then" side (invariant I5): control paths are assumed to
            // agree on declarations, tables, externs, handles, and void.
            (Value::Declaration(_), Value::Declaration(_))
            | (Value::Table(_), Value::Table(_))
            | (Value::Extern(_), Value::Extern(_))
            | (Value::FunctionHandle(_), Value::FunctionHandle(_))
            | (Value::Void, Value::Void) => Ok(other.clone()),
            (a, b) => Err(type_mismatch(format!("cannot merge {} with {}", a.type_name(), b.type_name()), loc)),
        }
    }

    // -- undefined reset --------------------------------------------------

    /// Resets this value to a fresh, unconstrained symbolic value of the
    /// same shape, used when a header's invalid-read policy is
    /// `header_invalid_read = zero` (§6) or explicitly requested.
    pub fn set_undefined(&mut self, ctx: &TermContext) {
        match self {
            Value::Bitvector(a) => {
                a.term = ctx.fresh("undef", a.term.sort());
            }
            Value::IntLiteral(a) => {
                a.term = ctx.fresh("undef", Sort::Int);
            }
            Value::Struct(s) => {
                for field in s.fields.values_mut() {
                    field.set_undefined(ctx);
                }
            }
            Value::Header(h) => {
                for field in h.fields.values_mut() {
                    field.set_undefined(ctx);
                }
            }
            Value::Enum(e) => {
                e.term = ctx.fresh("undef_enum", Sort::Bv(32));
            }
            Value::ErrorSet(e) => {
                e.term = ctx.fresh("undef_error", Sort::Bv(32));
            }
            Value::List(l) => {
                for element in &mut l.elements {
                    element.set_undefined(ctx);
                }
            }
            Value::Declaration(_)
            | Value::Table(_)
            | Value::Extern(_)
            | Value::FunctionHandle(_)
            | Value::Void
            | Value::ControlState(_) => {}
        }
    }

    /// Produces the zero-value for a `header_invalid_read = zero` policy,
    /// instead of a fresh unconstrained constant.
    pub fn zeroed(&self, ctx: &TermContext) -> Value {
        match self {
            Value::Bitvector(a) => match a.term.sort() {
                Sort::Bv(w) => Value::Bitvector(Bitvector { term: ctx.bv_val(w, 0u32), signed: a.signed }),
                Sort::Bool => Value::Bitvector(Bitvector { term: ctx.bool_val(false), signed: false }),
                Sort::Int => self.clone(),
            },
            Value::Struct(s) => {
                let fields = s.fields.iter().map(|(n, v)| (n.clone(), v.zeroed(ctx))).collect();
                Value::Struct(StructValue { fields, ..s.clone() })
            }
            Value::Header(h) => {
                let fields = h.fields.iter().map(|(n, v)| (n.clone(), v.zeroed(ctx))).collect();
                Value::Header(HeaderValue { fields, ..h.clone() })
            }
            other => other.clone(),
        }
    }
}

fn type_mismatch(reason: impl Into<String>, loc: SourceLocation) -> EvalError {
    EvalError::TypeMismatch { reason: reason.into(), loc }
}

fn unsupported_cast(target: &str, loc: SourceLocation) -> EvalError {
    EvalError::UnsupportedCast { target: target.to_string(), loc }
}

/// Aligns a bitvector term from `current` width to `target` width:
/// zero-extend if narrower, truncate-from-right (keep the low bits) if
/// wider. This is the one alignment rule used both by explicit casts and
/// by the "align to the left operand's sort" binary-op rule (§4.1).
fn align_bv_width(term: &Term, current: u32, target: u32, ctx: &TermContext) -> Term {
    if current == target {
        term.clone()
    } else if current < target {
        ctx.zero_extend(term.clone(), target - current)
    } else {
        ctx.extract(term.clone(), target - 1, 0).unwrap_or_else(|_| term.clone())
    }
}

fn concat(lhs: &Value, rhs: &Value, ctx: &TermContext, loc: SourceLocation) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Bitvector(a), Value::Bitvector(b)) => {
            Ok(Value::Bitvector(Bitvector { term: ctx.concat(a.term.clone(), b.term.clone()), signed: false }))
        }
        (a, b) => Err(type_mismatch(format!("concat not defined on {} and {}", a.type_name(), b.type_name()), loc)),
    }
}

fn logical_binary(lhs: &Value, op: p4z3_ast::BinaryOp, rhs: &Value, ctx: &TermContext, loc: SourceLocation) -> Result<Value, EvalError> {
    use p4z3_ast::BinaryOp::*;
    match (lhs, rhs) {
        (Value::Bitvector(a), Value::Bitvector(b)) if a.term.sort() == Sort::Bool && b.term.sort() == Sort::Bool => {
            let bin_op = if op == LogicalAnd { BinOp::And } else { BinOp::Or };
            Ok(Value::Bitvector(Bitvector { term: ctx.bin(bin_op, a.term.clone(), b.term.clone()), signed: false }))
        }
        (a, b) => Err(type_mismatch(format!("{:?} not defined on {} and {}", op, a.type_name(), b.type_name()), loc)),
    }
}

fn numeric_binary(
    lhs: &Value,
    op: p4z3_ast::BinaryOp,
    rhs: &Value,
    ctx: &TermContext,
    cfg: &EvaluatorConfig,
    loc: SourceLocation,
) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::IntLiteral(a), Value::IntLiteral(b)) => int_int_binary(a, op, b, ctx, loc),
        (Value::Bitvector(a), Value::Bitvector(b)) => bv_bv_binary(a, op, b, ctx, cfg, loc),
        (Value::Bitvector(a), Value::IntLiteral(b)) => {
            let b_bv = Bitvector { term: ctx.int_to_bv(b.term.clone(), a.width()), signed: a.signed };
            bv_bv_binary(a, op, &b_bv, ctx, cfg, loc)
        }
        (Value::IntLiteral(a), Value::Bitvector(b)) => {
            // Exactly one side is a Bitvector: the IntLiteral side is
            // pure-cast to its sort regardless of operand order (§4.1).
            let a_bv = Bitvector { term: ctx.int_to_bv(a.term.clone(), b.width()), signed: b.signed };
            bv_bv_binary(&a_bv, op, b, ctx, cfg, loc)
        }
        (a, b) => Err(type_mismatch(format!("{:?} not defined on {} and {}", op, a.type_name(), b.type_name()), loc)),
    }
}

fn int_int_binary(a: &IntLiteral, op: p4z3_ast::BinaryOp, b: &IntLiteral, ctx: &TermContext, loc: SourceLocation) -> Result<Value, EvalError> {
    use p4z3_ast::BinaryOp::*;
    let (bin_op, produces_bool) = match op {
        Add => (BinOp::IntAdd, false),
        Sub => (BinOp::IntSub, false),
        Mul => (BinOp::IntMul, false),
        Eq => (BinOp::Eq, true),
        Ne => (BinOp::Ne, true),
        other => return Err(type_mismatch(format!("{:?} not defined on two IntLiteral operands", other), loc)),
    };
    let term = ctx.bin(bin_op, a.term.clone(), b.term.clone());
    if produces_bool {
        Ok(Value::Bitvector(Bitvector { term, signed: false }))
    } else {
        Ok(Value::IntLiteral(IntLiteral { term }))
    }
}

fn bv_bv_binary(
    a: &Bitvector,
    op: p4z3_ast::BinaryOp,
    b: &Bitvector,
    ctx: &TermContext,
    cfg: &EvaluatorConfig,
    loc: SourceLocation,
) -> Result<Value, EvalError> {
    use p4z3_ast::BinaryOp::*;
    let width = a.width();
    match op {
        Shl | Shr => {
            let wide = width.max(b.width());
            let a_wide = align_bv_width(&a.term, width, wide, ctx);
            let b_wide = align_bv_width(&b.term, b.width(), wide, ctx);
            let bin_op = if op == Shl {
                BinOp::Shl
            } else if a.signed {
                BinOp::AShr
            } else {
                BinOp::LShr
            };
            let shifted = ctx.bin(bin_op, a_wide, b_wide);
            let term = align_bv_width(&shifted, wide, width, ctx);
            Ok(Value::Bitvector(Bitvector { term, signed: a.signed }))
        }
        AddSat => Ok(Value::Bitvector(saturating_add(a, b, ctx))),
        SubSat => Ok(Value::Bitvector(saturating_sub(a, b, ctx))),
        _ => {
            let b_term = align_bv_width(&b.term, b.width(), width, ctx);
            match op {
                Add | Sub | Mul => {
                    let bin_op = match op {
                        Add => BinOp::Add,
                        Sub => BinOp::Sub,
                        Mul => BinOp::Mul,
                        _ => unreachable!(),
                    };
                    if a.signed && cfg.signed_integer_policy == super::state::SignedIntegerPolicy::ErrOnOverflow {
                        check_signed_no_overflow(op, &a.term, &b_term, width, ctx, loc)?;
                    }
                    let term = ctx.bin(bin_op, a.term.clone(), b_term);
                    Ok(Value::Bitvector(Bitvector { term, signed: a.signed }))
                }
                Div | Mod => {
                    let bin_op = match (op, a.signed) {
                        (Div, true) => BinOp::SDiv,
                        (Div, false) => BinOp::UDiv,
                        (Mod, true) => BinOp::SRem,
                        (Mod, false) => BinOp::URem,
                        _ => unreachable!(),
                    };
                    let term = ctx.bin(bin_op, a.term.clone(), b_term);
                    Ok(Value::Bitvector(Bitvector { term, signed: a.signed }))
                }
                Eq | Ne => {
                    let bin_op = if op == Eq { BinOp::Eq } else { BinOp::Ne };
                    let term = ctx.bin(bin_op, a.term.clone(), b_term);
                    Ok(Value::Bitvector(Bitvector { term, signed: false }))
                }
                Lt | Le | Gt | Ge => {
                    let bin_op = match (op, a.signed) {
                        (Lt, true) => BinOp::Slt,
                        (Lt, false) => BinOp::Ult,
                        (Le, true) => BinOp::Sle,
                        (Le, false) => BinOp::Ule,
                        (Gt, true) => BinOp::Sgt,
                        (Gt, false) => BinOp::Ugt,
                        (Ge, true) => BinOp::Sge,
                        (Ge, false) => BinOp::Uge,
                        _ => unreachable!(),
                    };
                    let term = ctx.bin(bin_op, a.term.clone(), b_term);
                    Ok(Value::Bitvector(Bitvector { term, signed: false }))
                }
                BitAnd | BitOr | BitXor => {
                    let bin_op = match op {
                        BitAnd => BinOp::BvAnd,
                        BitOr => BinOp::BvOr,
                        BitXor => BinOp::BvXor,
                        _ => unreachable!(),
                    };
                    let term = ctx.bin(bin_op, a.term.clone(), b_term);
                    Ok(Value::Bitvector(Bitvector { term, signed: a.signed }))
                }
                other => Err(type_mismatch(format!("{:?} not defined on Bitvector operands", other), loc)),
            }
        }
    }
}

/// `add_sat a b` = `ite(no_overflow, a+b, MAX)`, computed by widening both
/// operands by one bit and checking the extra bit (§4.1).
fn saturating_add(a: &Bitvector, b: &Bitvector, ctx: &TermContext) -> Bitvector {
    let width = a.width();
    let b_term = align_bv_width(&b.term, b.width(), width, ctx);
    let ext_a = ctx.zero_extend(a.term.clone(), 1);
    let ext_b = ctx.zero_extend(b_term, 1);
    let wide_sum = ctx.bin(BinOp::Add, ext_a, ext_b);
    let overflow_bit = ctx.extract(wide_sum.clone(), width, width).expect("extract within widened sort");
    let no_overflow = ctx.bin(BinOp::Eq, overflow_bit, ctx.bv_val(1u32, 0u32));
    let truncated = ctx.extract(wide_sum, width - 1, 0).expect("extract within widened sort");
    let max_val = ctx.bv_val(width, (BigUint::from(1u8) << width) - BigUint::from(1u8));
    let term = ctx.ite(no_overflow, truncated, max_val).expect("ite on bool condition");
    Bitvector { term, signed: a.signed }
}

/// `sub_sat a b` = `ite(no_underflow, a-b, 0)`.
fn saturating_sub(a: &Bitvector, b: &Bitvector, ctx: &TermContext) -> Bitvector {
    let width = a.width();
    let b_term = align_bv_width(&b.term, b.width(), width, ctx);
    let no_underflow = ctx.bin(BinOp::Uge, a.term.clone(), b_term.clone());
    let diff = ctx.bin(BinOp::Sub, a.term.clone(), b_term);
    let zero = ctx.bv_val(width, 0u32);
    let term = ctx.ite(no_underflow, diff, zero).expect("ite on bool condition");
    Bitvector { term, signed: a.signed }
}

/// `signed_integer_policy = err_on_overflow`: only catches overflow that
/// provably always happens (the simplified no-overflow condition folds to
/// a constant `false`); a symbolic condition is left unresolved, since
/// this engine does not invoke a solver.
fn check_signed_no_overflow(
    op: p4z3_ast::BinaryOp,
    a: &Term,
    b: &Term,
    width: u32,
    ctx: &TermContext,
    loc: SourceLocation,
) -> Result<(), EvalError> {
    use p4z3_ast::BinaryOp::*;
    let ext_a = ctx.sign_extend(a.clone(), 1);
    let ext_b = ctx.sign_extend(b.clone(), 1);
    let wide = match op {
        Add => ctx.bin(BinOp::Add, ext_a, ext_b),
        Sub => ctx.bin(BinOp::Sub, ext_a, ext_b),
        Mul => ctx.bin(BinOp::Mul, ext_a, ext_b),
        _ => return Ok(()),
    };
    let narrowed = ctx.extract(wide.clone(), width - 1, 0).expect("extract within widened sort");
    let re_extended = ctx.sign_extend(narrowed, 1);
    let no_overflow = ctx.bin(BinOp::Eq, wide, re_extended);
    let simplified = ctx.simplify(&no_overflow);
    if matches!(simplified.as_ref(), p4z3_smt::TermNode::BoolConst(false)) {
        return Err(EvalError::backend(format!("signed {:?} always overflows at width {width}", op), loc));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4z3_ast::BinaryOp;
    use proptest::prelude::*;

    fn bv(ctx: &TermContext, width: u32, value: u32, signed: bool) -> Value {
        Value::Bitvector(Bitvector { term: ctx.bv_val(width, value), signed })
    }

    fn cfg() -> EvaluatorConfig {
        EvaluatorConfig::default()
    }

    #[test]
    fn width_alignment_uses_left_operand_sort() {
        let ctx = TermContext::new();
        // bit<8> a = 1; bit<16> b = 2; a = a + (bit<8>)b;
        let a = bv(&ctx, 8, 1, false);
        let b = bv(&ctx, 16, 2, false);
        let b_cast = b.cast(&Type::Bits { width: 8, signed: false }, &ctx, SourceLocation::synthetic()).unwrap();
        let result = a.binary(BinaryOp::Add, &b_cast, &ctx, &cfg(), SourceLocation::synthetic()).unwrap();
        assert_eq!(result, bv(&ctx, 8, 3, false));
    }

    #[test]
    fn int_literal_mixed_with_bv_is_modular() {
        let ctx = TermContext::new();
        // bit<4> x = 1; x = x + 15;
        let x = bv(&ctx, 4, 1, false);
        let fifteen = Value::IntLiteral(IntLiteral { term: ctx.int_val_from_decimal("15").unwrap() });
        let result = x.binary(BinaryOp::Add, &fifteen, &ctx, &cfg(), SourceLocation::synthetic()).unwrap();
        assert_eq!(result, bv(&ctx, 4, 0, false));
    }

    #[test]
    fn saturating_add_caps_at_max() {
        let ctx = TermContext::new();
        // bit<4> x = 10; x = x |+| 9;
        let a = bv(&ctx, 4, 10, false);
        let b = bv(&ctx, 4, 9, false);
        let result = a.binary(BinaryOp::AddSat, &b, &ctx, &cfg(), SourceLocation::synthetic()).unwrap();
        assert_eq!(result, bv(&ctx, 4, 15, false));
    }

    #[test]
    fn merge_tautology_keeps_then_side() {
        let ctx = TermContext::new();
        let a = bv(&ctx, 8, 1, false);
        let b = bv(&ctx, 8, 2, false);
        let tautology = ctx.bool_val(true);
        let merged = a.merge(&tautology, &b, &ctx, &cfg(), SourceLocation::synthetic()).unwrap();
        let simplified = match &merged {
            Value::Bitvector(bv) => ctx.simplify(&bv.term),
            _ => unreachable!(),
        };
        assert_eq!(simplified, ctx.bv_val(8u32, 2u32));
    }

    #[test]
    fn merge_contradiction_keeps_self() {
        let ctx = TermContext::new();
        let a = bv(&ctx, 8, 1, false);
        let b = bv(&ctx, 8, 2, false);
        let contradiction = ctx.bool_val(false);
        let merged = a.merge(&contradiction, &b, &ctx, &cfg(), SourceLocation::synthetic()).unwrap();
        let simplified = match &merged {
            Value::Bitvector(bv) => ctx.simplify(&bv.term),
            _ => unreachable!(),
        };
        assert_eq!(simplified, ctx.bv_val(8u32, 1u32));
    }

    proptest! {
        // §8 invariant: merge is idempotent under the tautology/contradiction,
        // for every 8-bit pair, not just the fixed 1/2 example above.
        #[test]
        fn merge_tautology_and_contradiction_hold_for_any_pair(a_val in 0u32..256, b_val in 0u32..256) {
            let ctx = TermContext::new();
            let a = bv(&ctx, 8, a_val, false);
            let b = bv(&ctx, 8, b_val, false);

            let tautology = ctx.bool_val(true);
            let merged_true = a.merge(&tautology, &b, &ctx, &cfg(), SourceLocation::synthetic()).unwrap();
            let Value::Bitvector(bv_true) = &merged_true else { unreachable!() };
            prop_assert_eq!(ctx.simplify(&bv_true.term), ctx.bv_val(8u32, b_val));

            let contradiction = ctx.bool_val(false);
            let merged_false = a.merge(&contradiction, &b, &ctx, &cfg(), SourceLocation::synthetic()).unwrap();
            let Value::Bitvector(bv_false) = &merged_false else { unreachable!() };
            prop_assert_eq!(ctx.simplify(&bv_false.term), ctx.bv_val(8u32, a_val));
        }

        // §8 invariant: cast(cast(v, integer), bv(W)) == v for every 8-bit v.
        #[test]
        fn bv_to_int_to_bv_round_trips(val in 0u32..256) {
            let ctx = TermContext::new();
            let v = bv(&ctx, 8, val, false);
            let as_int = v.cast(&Type::Integer, &ctx, SourceLocation::synthetic()).unwrap();
            let back = as_int.cast(&Type::Bits { width: 8, signed: false }, &ctx, SourceLocation::synthetic()).unwrap();
            let Value::Bitvector(result) = &back else { unreachable!() };
            prop_assert_eq!(ctx.simplify(&result.term), ctx.bv_val(8u32, val));
        }
    }
}
