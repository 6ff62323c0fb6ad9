//! The program: a flat table of declarations plus the entry points the
//! interpreter is asked to evaluate.
//!
//! This is the concrete shape of the "external AST layer" described in
//! §6: the interpreter never builds or mutates a [`Program`], it only
//! resolves names and enumerates fields/members through it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::decl::Decl;
use crate::error::AstError;
use crate::id::DeclId;
use crate::types::Type;

/// A P4-family entry point: a parser or control block whose terminal
/// `ControlState` the caller wants observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    pub callable: DeclId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    decls: IndexMap<DeclId, Decl>,
    names: IndexMap<String, DeclId>,
    entry_points: Vec<EntryPoint>,
    next_id: u32,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Registers a declaration under its own `id()`. Callers that need a
    /// fresh id first should call [`Program::fresh_id`] before
    /// constructing the declaration.
    pub fn declare(&mut self, decl: Decl) -> Result<DeclId, AstError> {
        let name = decl.name().to_string();
        if self.names.contains_key(&name) {
            return Err(AstError::DuplicateDeclName { name });
        }
        let id = decl.id();
        self.names.insert(name, id);
        self.decls.insert(id, decl);
        self.next_id = self.next_id.max(id.0 + 1);
        Ok(id)
    }

    pub fn fresh_id(&mut self) -> DeclId {
        let id = DeclId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: DeclId) -> Result<&Decl, AstError> {
        self.decls.get(&id).ok_or(AstError::DeclIdNotFound { id })
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Decl, AstError> {
        let id = self
            .names
            .get(name)
            .copied()
            .ok_or_else(|| AstError::DeclNotFound { name: name.to_string() })?;
        self.get(id)
    }

    pub fn add_entry_point(&mut self, name: impl Into<String>, callable: DeclId) {
        self.entry_points.push(EntryPoint { name: name.into(), callable });
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    /// Resolves a possibly-unresolved [`Type`] to its concrete form.
    /// `Type::Name(n)` is followed to the declaration named `n`; every
    /// other variant is returned unchanged, per §4.2's `resolve_type`
    /// contract.
    pub fn resolve_type(&self, ty: &Type) -> Result<Type, AstError> {
        match ty {
            Type::Name(name) => {
                let decl = self.get_by_name(name)?;
                Ok(match decl {
                    Decl::Struct(d) => Type::Struct(d.id),
                    Decl::Header(d) => Type::Header(d.id),
                    Decl::Enum(d) => Type::Enum(d.id),
                    Decl::Error(d) => Type::Error(d.id),
                    Decl::Extern(d) => Type::Extern(d.id),
                    Decl::Function(_) | Decl::Table(_) => {
                        return Err(AstError::TypeNotFound { name: name.clone() })
                    }
                })
            }
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{Field, StructDecl};

    fn struct_decl(id: u32, name: &str, fields: Vec<Field>) -> Decl {
        Decl::Struct(StructDecl { id: DeclId(id), name: name.to_string(), fields })
    }

    #[test]
    fn declare_and_lookup_by_name() {
        let mut program = Program::new();
        let id = program.declare(struct_decl(1, "Ethernet", vec![])).unwrap();
        assert_eq!(program.get(id).unwrap().name(), "Ethernet");
        assert_eq!(program.get_by_name("Ethernet").unwrap().id(), id);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut program = Program::new();
        program.declare(struct_decl(1, "Ethernet", vec![])).unwrap();
        let err = program.declare(struct_decl(2, "Ethernet", vec![])).unwrap_err();
        assert!(matches!(err, AstError::DuplicateDeclName { .. }));
    }

    #[test]
    fn resolve_type_follows_name_reference() {
        let mut program = Program::new();
        let id = program.declare(struct_decl(1, "Ethernet", vec![])).unwrap();
        let resolved = program.resolve_type(&Type::Name("Ethernet".to_string())).unwrap();
        assert_eq!(resolved, Type::Struct(id));
    }

    #[test]
    fn resolve_type_passes_through_concrete_types() {
        let program = Program::new();
        let resolved = program.resolve_type(&Type::Bits { width: 8, signed: false }).unwrap();
        assert_eq!(resolved, Type::Bits { width: 8, signed: false });
    }

    proptest::proptest! {
        #[test]
        fn fresh_id_never_repeats(count in 1usize..200) {
            let mut program = Program::new();
            let mut seen = std::collections::HashSet::new();
            for _ in 0..count {
                let id = program.fresh_id();
                proptest::prop_assert!(seen.insert(id));
            }
        }
    }
}
