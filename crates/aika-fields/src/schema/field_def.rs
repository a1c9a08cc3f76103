// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field and field link definitions.

use crate::function::Combinator;
use crate::ident::{FieldDefId, FieldLinkId, RelationId, TypeId};
use crate::queue::Phase;

/// Deferred-update configuration attached to a field definition.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueueSpec {
    /// Phase the field's coalesced update step runs in.
    pub phase: Phase,
    /// Schedule the step one round after the current one.
    pub next_round: bool,
}

/// A declared field definition.
#[derive(Clone, Debug)]
pub struct FieldDef {
    pub(crate) id: FieldDefId,
    pub(crate) owner: TypeId,
    pub(crate) name: String,
    pub(crate) combinator: Combinator,
    pub(crate) tolerance: Option<f64>,
    pub(crate) parent: Option<FieldDefId>,
    pub(crate) queued: Option<QueueSpec>,
}

impl FieldDef {
    /// Definition id.
    pub fn id(&self) -> FieldDefId {
        self.id
    }

    /// Type that declares this definition.
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Combinator.
    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    /// Minimum delta magnitude that propagates. `None` drops only exact zeros.
    pub fn tolerance(&self) -> Option<f64> {
        self.tolerance
    }

    /// Overridden ancestor definition, if any.
    pub fn parent(&self) -> Option<FieldDefId> {
        self.parent
    }

    /// Deferred-update configuration, if the field is queued by declaration.
    pub fn queued(&self) -> Option<QueueSpec> {
        self.queued
    }

    /// Returns `true` when `delta` must be dropped without propagating.
    pub fn below_tolerance(&self, delta: f64) -> bool {
        match self.tolerance {
            Some(t) => delta.abs() < t,
            None => delta == 0.0,
        }
    }
}

/// What a link carries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LinkKind {
    /// Ordinary value propagation from input to output.
    Value,
    /// Forwarding edge driven by a max field's current winner.
    Selection,
}

/// Declared link before flattening; relations are validated at compile time.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LinkDecl {
    pub(crate) input: FieldDefId,
    pub(crate) output: FieldDefId,
    /// Relation navigated from the output side for value links, and from the
    /// winning source object for selection links.
    pub(crate) via: RelationId,
    pub(crate) arg: Option<u8>,
    pub(crate) kind: LinkKind,
}

/// A compiled field link.
///
/// Value flows from `input` to `output` across `relation`, which navigates
/// from the input's object to the output's object. `reverse` walks back for
/// fetch and initialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FieldLinkDef {
    pub(crate) id: FieldLinkId,
    pub(crate) input: FieldDefId,
    pub(crate) output: FieldDefId,
    pub(crate) relation: RelationId,
    pub(crate) reverse: RelationId,
    pub(crate) arg: Option<u8>,
    pub(crate) kind: LinkKind,
}

impl FieldLinkDef {
    /// Link id.
    pub fn id(&self) -> FieldLinkId {
        self.id
    }

    /// Source definition.
    pub fn input(&self) -> FieldDefId {
        self.input
    }

    /// Target definition.
    pub fn output(&self) -> FieldDefId {
        self.output
    }

    /// Relation from the source object to the target object.
    pub fn relation(&self) -> RelationId {
        self.relation
    }

    /// Relation from the target object back to the source object.
    pub fn reverse(&self) -> RelationId {
        self.reverse
    }

    /// Argument position on fixed-arity targets.
    pub fn arg(&self) -> Option<u8> {
        self.arg
    }

    /// Link kind.
    pub fn kind(&self) -> LinkKind {
        self.kind
    }
}
