use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::errors::DocGraphError;
use crate::record::{TypeDef, TypeKind};

/// Declared type names. Declarations are not transactional.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<BTreeMap<String, TypeKind>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defs<I: IntoIterator<Item = TypeDef>>(defs: I) -> Self {
        let types = defs.into_iter().map(|def| (def.name, def.kind)).collect();
        Self {
            types: RwLock::new(types),
        }
    }

    /// Returns `Ok(true)` when the type was newly added, `Ok(false)` when it already
    /// existed with the same kind.
    pub fn declare(&self, name: &str, kind: TypeKind) -> Result<bool, DocGraphError> {
        validate_type_name(name)?;
        let mut types = self.types.write();
        match types.get(name) {
            Some(existing) if *existing == kind => Ok(false),
            Some(existing) => Err(DocGraphError::type_conflict(format!(
                "type {name} is already declared as {existing}, not {kind}"
            ))),
            None => {
                types.insert(name.to_string(), kind);
                Ok(true)
            }
        }
    }

    /// Drops a declaration again; used when persisting a fresh declaration fails.
    pub(crate) fn forget(&self, name: &str) {
        self.types.write().remove(name);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        self.types.read().get(name).copied()
    }

    /// Kind of a declared type, or `NotFound`.
    pub fn require(&self, name: &str) -> Result<TypeKind, DocGraphError> {
        self.kind_of(name)
            .ok_or_else(|| DocGraphError::not_found(format!("type {name}")))
    }

    pub fn list(&self) -> Vec<TypeDef> {
        self.types
            .read()
            .iter()
            .map(|(name, kind)| TypeDef {
                name: name.clone(),
                kind: *kind,
            })
            .collect()
    }
}

pub(crate) fn validate_type_name(name: &str) -> Result<(), DocGraphError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DocGraphError::invalid_argument(format!(
            "invalid type name {name:?}"
        )))
    }
}
