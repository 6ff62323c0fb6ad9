//! Declaration nodes: struct-likes, headers, enums, errors, externs,
//! callables (functions/actions) and tables.

use serde::{Deserialize, Serialize};

use crate::ast::{Expr, Stmt};
use crate::id::DeclId;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub id: DeclId,
    pub name: String,
    /// Fields in declaration order — the interpreter relies on this order
    /// both for width/flat-id accumulation and for list-to-struct casts.
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDecl {
    pub id: DeclId,
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub id: DeclId,
    pub name: String,
    /// Member names in declaration order.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDecl {
    pub id: DeclId,
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternDecl {
    pub id: DeclId,
    pub name: String,
    /// Method names this extern exposes. Method bodies are opaque to the
    /// evaluator; it only needs to know a method exists to build a
    /// `FunctionHandle` for it.
    pub methods: Vec<String>,
}

/// Parameter-passing direction (§4.3 Calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
    /// No direction annotation — treated as `In`.
    None,
}

impl ParamDirection {
    pub fn reads_argument(self) -> bool {
        matches!(self, ParamDirection::In | ParamDirection::InOut | ParamDirection::None)
    }

    pub fn writes_back(self) -> bool {
        matches!(self, ParamDirection::Out | ParamDirection::InOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub direction: ParamDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableDecl {
    pub id: DeclId,
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDecl {
    pub id: DeclId,
    pub name: String,
    /// Key expressions, evaluated to build the `hit` condition.
    pub keys: Vec<Expr>,
    /// Candidate actions (calls) the table may symbolically invoke.
    pub actions: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decl {
    Struct(StructDecl),
    Header(HeaderDecl),
    Enum(EnumDecl),
    Error(ErrorDecl),
    Extern(ExternDecl),
    /// Functions and actions share shape; actions are callables with no
    /// return value (`ret == Type::Void`).
    Function(CallableDecl),
    Table(TableDecl),
}

impl Decl {
    pub fn id(&self) -> DeclId {
        match self {
            Decl::Struct(d) => d.id,
            Decl::Header(d) => d.id,
            Decl::Enum(d) => d.id,
            Decl::Error(d) => d.id,
            Decl::Extern(d) => d.id,
            Decl::Function(d) => d.id,
            Decl::Table(d) => d.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Decl::Struct(d) => &d.name,
            Decl::Header(d) => &d.name,
            Decl::Enum(d) => &d.name,
            Decl::Error(d) => &d.name,
            Decl::Extern(d) => &d.name,
            Decl::Function(d) => &d.name,
            Decl::Table(d) => &d.name,
        }
    }

    /// Fields in declaration order, for struct-likes; empty otherwise.
    pub fn fields(&self) -> &[Field] {
        match self {
            Decl::Struct(d) => &d.fields,
            Decl::Header(d) => &d.fields,
            _ => &[],
        }
    }
}
