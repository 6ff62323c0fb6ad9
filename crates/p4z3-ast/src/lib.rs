//! The program tree the interpreter walks, and its supporting declaration
//! table and type system.
//!
//! Everything in this crate is produced by an external front end and
//! treated as immutable by the evaluator: parsing, name resolution and
//! canonicalization happen before a [`program::Program`] reaches
//! `p4z3-core`.

pub mod ast;
pub mod decl;
pub mod error;
pub mod id;
pub mod location;
pub mod program;
pub mod types;

pub use ast::{BinaryOp, Expr, ExprKind, Stmt, StmtKind, UnaryOp};
pub use decl::{
    CallableDecl, Decl, EnumDecl, ErrorDecl, ExternDecl, Field, HeaderDecl, Param, ParamDirection,
    StructDecl, TableDecl,
};
pub use error::AstError;
pub use id::{DeclId, NodeId};
pub use location::SourceLocation;
pub use program::{EntryPoint, Program};
pub use types::Type;
