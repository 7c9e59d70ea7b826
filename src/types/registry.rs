//! The process-wide, immutable type table (spec §3 "Lifecycle": "created at
//! program load and never mutated").

use std::collections::HashMap;

use super::{TypeDescriptor, TypeId};

/// Immutable table of every [`TypeDescriptor`] known to a loaded program,
/// keyed by [`TypeId`]. Built once at load time by
/// [`crate::program::Program`] and never mutated afterward — there is no
/// interior mutability here, unlike the teacher's process-wide globals
/// (Design Notes §9: "Re-architect as an explicitly-passed `Program`
/// context").
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    by_id: HashMap<TypeId, TypeDescriptor>,
}

impl TypeRegistry {
    /// Build a registry from a complete set of descriptors.
    pub fn new(descriptors: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        let by_id = descriptors.into_iter().map(|d| (d.tid, d)).collect();
        TypeRegistry { by_id }
    }

    /// Look up a descriptor by `TypeID`.
    pub fn get(&self, tid: TypeId) -> Option<&TypeDescriptor> {
        self.by_id.get(&tid)
    }

    /// Look up a descriptor, panicking (a fatal internal error, in
    /// practice returned as [`crate::error::FatalReason::MissingMember`])
    /// if absent — used where the bytecode's own well-formedness already
    /// guarantees existence.
    pub fn require(&self, tid: TypeId) -> Result<&TypeDescriptor, crate::error::FatalReason> {
        self.get(tid)
            .ok_or_else(|| crate::error::FatalReason::MissingMember(format!("TypeID {tid}")))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when no types are registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Linearly scan whether `sub` is reachable from `of`'s declared
    /// `subtypes` list — backs the `TypeTagSubtypeOf` opcode (spec §4.4:
    /// "the latter linearly scans `of.subtypes`").
    pub fn is_subtype_of(&self, sub: TypeId, of: TypeId) -> bool {
        if sub == of {
            return true;
        }
        self.get(of)
            .and_then(|d| d.category.union_layout())
            .map(|u| u.subtypes.contains(&sub))
            .unwrap_or(false)
    }
}
