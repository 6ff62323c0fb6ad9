//! Expression and statement node kinds.
//!
//! The engine consuming this tree never mutates it; it is built once by an
//! external front end and walked read-only by the interpreter.

use serde::{Deserialize, Serialize};

use crate::location::SourceLocation;
use crate::types::Type;

/// Unary operators (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    BitNot,
    LogicalNot,
}

/// Binary operators (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    AddSat,
    SubSat,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Concat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Reference to a variable by name.
    Var(String),
    /// A bitvector or integer literal, given as a decimal string so that
    /// arbitrary-precision values round-trip without a native integer type.
    IntLit(String),
    BoolLit(bool),
    /// `obj.field`.
    Member { object: Box<Expr>, field: String },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Explicit cast to a target type.
    Cast { target: Type, expr: Box<Expr> },
    /// `cond ? then_expr : else_expr`.
    Mux { cond: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    /// A tuple/list literal.
    ListLit(Vec<Expr>),
    /// A call to a function, action, or extern method by name.
    Call { callee: String, args: Vec<Expr> },
    /// `obj.method(args)`, e.g. `header.isValid()`.
    MethodCall { object: Box<Expr>, method: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLocation,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: SourceLocation) -> Self {
        Expr { kind, loc }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `bit<8> x = init;` — declares a fresh local, optionally initialized.
    VarDecl { name: String, ty: Type, init: Option<Expr> },
    /// `target = value;`, including nested-field targets (`h.f = ...`).
    Assign { target: Expr, value: Expr },
    If { cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt> },
    Return { value: Option<Expr> },
    /// Exits the enclosing entry point early without returning a value
    /// (the parser/control `exit` statement).
    Exit,
    /// `table_name.apply();`
    TableApply { table: String },
    /// An expression evaluated for effect only (e.g. `header.setValid()`).
    ExprStmt(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLocation,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: SourceLocation) -> Self {
        Stmt { kind, loc }
    }
}
