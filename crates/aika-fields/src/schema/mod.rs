// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type/relation schema and its compiled, flattened form.
//!
//! A [`TypeRegistry`] collects declarations. [`TypeRegistry::flatten_type_hierarchy`]
//! merges every type's own and inherited field definitions into a dense slot
//! space and precomputes, per slot, the input-side and output-side link
//! lists. The result is an immutable [`Schema`] shared by every
//! [`Document`](crate::Document) built from the registry; nothing at runtime
//! walks the type hierarchy.

mod field_def;
mod flatten;
mod registry;

use thiserror::Error;

use crate::ident::{FieldDefId, FieldIndex, FieldLinkId, Hash, RelationId, TypeId};
use crate::relation::Relation;

pub use field_def::{FieldDef, FieldLinkDef, LinkKind, QueueSpec};
pub use flatten::{FlattenedType, Slot};
pub use registry::{FieldDefBuilder, TypeDecl, TypeRegistry};

/// Errors raised while declaring or compiling a schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The registry was already flattened and accepts no more declarations.
    #[error("type registry is sealed")]
    Sealed,
    /// A document still holds the compiled schema.
    #[error("compiled schema is in use by a document")]
    SchemaInUse,
    /// Referenced type was never declared.
    #[error("unknown type: {0:?}")]
    UnknownType(TypeId),
    /// Referenced relation was never declared.
    #[error("unknown relation: {0:?}")]
    UnknownRelation(RelationId),
    /// Referenced field definition was never declared.
    #[error("unknown field definition: {0:?}")]
    UnknownField(FieldDefId),
    /// Only the registry's own self relation may have the self kind.
    #[error("relations declared in pairs cannot use the self kind")]
    InvalidRelationKind,
    /// The parent graph contains a cycle through this type.
    #[error("inheritance cycle through type {0:?}")]
    InheritanceCycle(TypeId),
    /// An override does not target a field of a strict ancestor type.
    #[error("field {field:?} cannot override {parent:?}")]
    InvalidOverride {
        /// The overriding definition.
        field: FieldDefId,
        /// The overridden definition.
        parent: FieldDefId,
    },
    /// Argument binding or override breaks the combinator's arity contract.
    #[error("arity mismatch on field {0:?}")]
    ArityMismatch(FieldDefId),
    /// Argument index is beyond the combinator's arity.
    #[error("argument {arg} out of range for field {field:?}")]
    ArgumentOutOfRange {
        /// Target definition.
        field: FieldDefId,
        /// Offending argument index.
        arg: u8,
    },
    /// Selection edges may only originate from max fields.
    #[error("field {0:?} is not a max field")]
    NotAMaxField(FieldDefId),
    /// Id space exhausted.
    #[error("schema capacity exceeded")]
    Capacity,
}

/// Compiled, immutable schema.
#[derive(Debug)]
pub struct Schema {
    pub(crate) relations: Vec<Relation>,
    pub(crate) defs: Vec<FieldDef>,
    pub(crate) links: Vec<FieldLinkDef>,
    pub(crate) types: Vec<FlattenedType>,
    pub(crate) links_by_relation: Vec<Vec<FieldLinkId>>,
    pub(crate) digest: Hash,
}

impl Schema {
    /// BLAKE3 fingerprint of the flattened layout.
    ///
    /// Identical declarations produce identical digests; persisted field
    /// values carry it so they are never restored into a different layout.
    pub fn digest(&self) -> &Hash {
        &self.digest
    }

    /// Relation by id.
    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.index())
    }

    /// Field definition by id.
    pub fn def(&self, id: FieldDefId) -> Option<&FieldDef> {
        self.defs.get(id.index())
    }

    /// Compiled link by id.
    pub fn link(&self, id: FieldLinkId) -> Option<&FieldLinkDef> {
        self.links.get(id.index())
    }

    /// Flattened table of a type.
    pub fn flattened(&self, ty: TypeId) -> Option<&FlattenedType> {
        self.types.get(ty.index())
    }

    /// All flattened types, indexed by type id.
    pub fn types(&self) -> &[FlattenedType] {
        &self.types
    }

    /// Slot of `def` on `ty`, if the type carries it.
    pub fn slot_of(&self, ty: TypeId, def: FieldDefId) -> Option<FieldIndex> {
        self.flattened(ty)?.slot_index(def)
    }

    /// Slot table entry of `slot` on `ty`.
    pub fn slot(&self, ty: TypeId, slot: FieldIndex) -> Option<&Slot> {
        self.flattened(ty)?.slot(slot)
    }

    /// Value links whose relation is `rel`.
    pub(crate) fn links_along(&self, rel: RelationId) -> &[FieldLinkId] {
        self.links_by_relation
            .get(rel.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `true` if `ty` is `ancestor` or derives from it.
    pub fn is_instance_of(&self, ty: TypeId, ancestor: TypeId) -> bool {
        self.flattened(ty)
            .is_some_and(|f| f.ancestors().binary_search(&ancestor).is_ok())
    }
}
