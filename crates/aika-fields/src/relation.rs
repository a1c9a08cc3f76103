// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Invertible navigation edges between object types.
//!
//! Relations are pure schema metadata. They live in a registry-owned table
//! addressed by [`RelationId`]; the reverse of a relation is an explicit id
//! fixed when the pair is declared, so there is no mutable back-reference
//! wiring and no declaration order hazard.

use crate::ident::RelationId;

/// How many objects navigating a relation can yield.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RelationKind {
    /// Zero or one related object.
    One,
    /// Any number of related objects, in connection order.
    Many,
    /// The object itself. Only [`RelationId::SELF`] has this kind.
    SelfRef,
}

/// A declared relation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Relation {
    id: RelationId,
    name: String,
    kind: RelationKind,
    reverse: RelationId,
}

impl Relation {
    /// Relation id.
    pub fn id(&self) -> RelationId {
        self.id
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Navigation cardinality.
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// The relation walking the opposite direction.
    pub fn reverse(&self) -> RelationId {
        self.reverse
    }
}

/// Registry-owned relation table.
#[derive(Clone, Debug)]
pub(crate) struct RelationTable {
    relations: Vec<Relation>,
}

impl Default for RelationTable {
    fn default() -> Self {
        Self {
            relations: vec![Relation {
                id: RelationId::SELF,
                name: "self".to_owned(),
                kind: RelationKind::SelfRef,
                reverse: RelationId::SELF,
            }],
        }
    }
}

impl RelationTable {
    /// Declares a relation together with its reverse.
    ///
    /// Returns `None` once the 16-bit id space is exhausted.
    pub(crate) fn declare_pair(
        &mut self,
        name: &str,
        kind: RelationKind,
        reverse_name: &str,
        reverse_kind: RelationKind,
    ) -> Option<(RelationId, RelationId)> {
        let forward = RelationId(u16::try_from(self.relations.len()).ok()?);
        let backward = RelationId(forward.0.checked_add(1)?);
        self.relations.push(Relation {
            id: forward,
            name: name.to_owned(),
            kind,
            reverse: backward,
        });
        self.relations.push(Relation {
            id: backward,
            name: reverse_name.to_owned(),
            kind: reverse_kind,
            reverse: forward,
        });
        Some((forward, backward))
    }

    pub(crate) fn get(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.index())
    }

    pub(crate) fn into_vec(self) -> Vec<Relation> {
        self.relations
    }

    pub(crate) fn as_slice(&self) -> &[Relation] {
        &self.relations
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn pairs_reference_each_other() {
        let mut table = RelationTable::default();
        let (fwd, bwd) = table
            .declare_pair("input", RelationKind::One, "outputs", RelationKind::Many)
            .unwrap();
        assert_eq!(table.get(fwd).unwrap().reverse(), bwd);
        assert_eq!(table.get(bwd).unwrap().reverse(), fwd);
        assert_eq!(table.get(bwd).unwrap().kind(), RelationKind::Many);
    }

    #[test]
    fn self_relation_is_its_own_reverse() {
        let table = RelationTable::default();
        let rel = table.get(RelationId::SELF).unwrap();
        assert_eq!(rel.reverse(), RelationId::SELF);
        assert_eq!(rel.kind(), RelationKind::SelfRef);
    }
}
