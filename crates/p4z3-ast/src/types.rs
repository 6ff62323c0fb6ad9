//! Static type kinds the interpreter distinguishes between.
//!
//! Matches the §6 input contract: the interpreter needs to tell bits(W)
//! apart from varbits(W), booleans, unbounded integers, struct-likes,
//! headers, enums, errors, lists/tuples and externs, and to resolve a
//! `Name` reference to the declaration it stands for.

use serde::{Deserialize, Serialize};

use crate::id::DeclId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    /// Fixed-width bitvector, e.g. `bit<8>` or `int<8>`.
    Bits { width: u32, signed: bool },
    /// Variable-width bitvector with a declared maximum, e.g. `varbit<64>`.
    Varbits { max_width: u32 },
    Bool,
    /// Arbitrary-precision integer literal type (`int` constants before
    /// they are coerced to a concrete bit width).
    Integer,
    Struct(DeclId),
    Header(DeclId),
    Enum(DeclId),
    Error(DeclId),
    List(Box<Type>),
    Tuple(Vec<Type>),
    Extern(DeclId),
    Void,
    /// An unresolved type name; must be run through
    /// [`crate::program::Program::resolve_type`] before use.
    Name(String),
}

impl Type {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Struct(_) | Type::Header(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Bits { .. } | Type::Varbits { .. } | Type::Bool)
    }
}
