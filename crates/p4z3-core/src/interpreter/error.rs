//! Evaluation errors. Every variant corresponds 1:1 to an error kind in
//! the error taxonomy, and carries the source location of the AST node
//! being processed when the error was raised.
//!
//! All of these are fatal: evaluation unwinds to the entry point and no
//! partial `ControlState` is produced.

use p4z3_ast::SourceLocation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{loc}: type mismatch: {reason}")]
    TypeMismatch { reason: String, loc: SourceLocation },

    #[error("{loc}: unsupported cast to {target}")]
    UnsupportedCast { target: String, loc: SourceLocation },

    #[error("{loc}: field not found: '{name}'")]
    FieldNotFound { name: String, loc: SourceLocation },

    #[error("{loc}: variable not found: '{name}'")]
    VarNotFound { name: String, loc: SourceLocation },

    #[error("{loc}: type not found: '{name}'")]
    TypeNotFound { name: String, loc: SourceLocation },

    #[error("{loc}: list arity mismatch: list has {found} elements, target has {expected}")]
    ListArityMismatch { expected: usize, found: usize, loc: SourceLocation },

    #[error("{loc}: return statement after a prior return on the same path")]
    ReturnAfterReturn { loc: SourceLocation },

    #[error("{loc}: backend error: {reason}")]
    BackendError { reason: String, loc: SourceLocation },
}

impl EvalError {
    pub fn backend(reason: impl Into<String>, loc: SourceLocation) -> Self {
        EvalError::BackendError { reason: reason.into(), loc }
    }
}
