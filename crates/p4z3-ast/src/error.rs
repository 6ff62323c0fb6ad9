//! Error types for program construction and declaration lookup.
//!
//! Uses `thiserror` for structured, matchable error variants.

use crate::id::DeclId;
use thiserror::Error;

/// Errors produced while building or querying a [`crate::program::Program`].
#[derive(Debug, Error)]
pub enum AstError {
    /// Attempting to register a declaration name that already exists.
    #[error("duplicate declaration name: '{name}'")]
    DuplicateDeclName { name: String },

    /// A declaration name was not found.
    #[error("declaration not found: '{name}'")]
    DeclNotFound { name: String },

    /// A `DeclId` was not found in the program's declaration table.
    #[error("declaration not found: DeclId({id})", id = id.0)]
    DeclIdNotFound { id: DeclId },

    /// A type name could not be resolved to a declaration.
    #[error("type not found: '{name}'")]
    TypeNotFound { name: String },
}
