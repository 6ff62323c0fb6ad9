//! Source locations, attached to every AST node so that interpreter errors
//! can point back at the offending syntax.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A location in the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub const fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }

    /// Used for synthetic nodes introduced by the interpreter itself (fresh
    /// locals, copy-out write-backs) that have no source text of their own.
    pub const fn synthetic() -> Self {
        SourceLocation { line: 0, column: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::synthetic()
    }
}
