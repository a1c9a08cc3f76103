// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier newtypes for schema entries and runtime handles.
//!
//! All ids are small dense integers handed out in declaration order by the
//! [`TypeRegistry`](crate::TypeRegistry) or the [`Document`](crate::Document)
//! arena. Using dedicated wrappers prevents mixing a field definition id with
//! a flattened slot index, which look alike but live in different spaces.

/// Canonical 256-bit digest used for compiled schema fingerprints.
pub type Hash = [u8; 32];

/// Identifier of a declared [`Type`](crate::schema::TypeDecl).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeId(pub u16);

/// Identifier of a [`Relation`](crate::Relation) in the registry-owned table.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RelationId(pub u16);

impl RelationId {
    /// The pre-declared self relation; navigating it yields the object itself.
    pub const SELF: Self = Self(0);
}

/// Identifier of a declared field definition.
///
/// Stable across flattening: a definition keeps its id no matter which
/// flattened slot it ends up sharing with overrides.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldDefId(pub u32);

/// Identifier of a declared field link definition.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldLinkId(pub u32);

/// Dense per-type slot index produced by flattening.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldIndex(pub u16);

/// Handle of an object in a [`Document`](crate::Document) arena.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ObjId(pub u32);

/// Address of a single field cell: the owning object plus its flattened slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldRef {
    /// Owning object.
    pub obj: ObjId,
    /// Slot within the object's flattened type.
    pub slot: FieldIndex,
}

impl FieldRef {
    /// Builds a field address.
    pub const fn new(obj: ObjId, slot: FieldIndex) -> Self {
        Self { obj, slot }
    }
}

macro_rules! dense_index {
    ($($ty:ident),* $(,)?) => {
        $(
            impl $ty {
                /// Returns the id as a `usize` suitable for indexing dense tables.
                #[must_use]
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

dense_index!(TypeId, RelationId, FieldDefId, FieldLinkId, FieldIndex, ObjId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_relation_is_first_entry() {
        assert_eq!(RelationId::SELF.index(), 0);
    }

    #[test]
    fn field_refs_order_by_object_then_slot() {
        let a = FieldRef::new(ObjId(1), FieldIndex(7));
        let b = FieldRef::new(ObjId(2), FieldIndex(0));
        let c = FieldRef::new(ObjId(2), FieldIndex(3));
        assert!(a < b);
        assert!(b < c);
    }
}
