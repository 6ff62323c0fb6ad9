//! Stable ID newtypes for declarations and AST nodes.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that a `DeclId` cannot be accidentally used where a `NodeId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a top-level or nested declaration (struct, header, enum,
/// error, extern, function, action, table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub u32);

/// Identity of an AST node, used to attach source locations and to report
/// errors against a specific syntactic form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decl_id_display() {
        assert_eq!(format!("{}", DeclId(7)), "7");
    }

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(3)), "3");
    }

    #[test]
    fn serde_roundtrip() {
        let id = DeclId(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: DeclId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn id_types_are_distinct() {
        // Compile-time guarantee; values can coincide without confusion.
        let decl = DeclId(1);
        let node = NodeId(1);
        assert_eq!(decl.0, node.0);
    }
}
