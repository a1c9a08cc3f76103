// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Object arena, relation edges and the document's step queue.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::codec::CodecError;
use crate::config::DocumentConfig;
use crate::field::{Field, FieldInputs};
use crate::ident::{FieldDefId, FieldRef, ObjId, RelationId, TypeId};
use crate::interceptor::QueueInterceptor;
use crate::queue::{self, DrainReport, Phase, Queue, QueueError, QueueHost, QueueKey, Round, Step};
use crate::relation::RelationKind;
use crate::schema::{FieldDef, Schema, SchemaError, TypeRegistry};
use crate::telemetry::{NullObserver, QueueEventSink, SelectionObserver, TracingSink};

/// Errors raised by document operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The registry must be flattened before a document can use it.
    #[error("type registry has not been flattened")]
    NotFlattened,
    /// Type id not present in the schema.
    #[error("unknown type: {0:?}")]
    UnknownType(TypeId),
    /// Object handle not present in the arena.
    #[error("unknown object: {0:?}")]
    UnknownObj(ObjId),
    /// Slot not present on the object's type.
    #[error("unknown field slot: {0:?}")]
    UnknownSlot(FieldRef),
    /// The object's type does not carry the field definition.
    #[error("field {field:?} is not defined on type {ty:?}")]
    FieldNotOnType {
        /// Requested definition.
        field: FieldDefId,
        /// Type of the addressed object.
        ty: TypeId,
    },
    /// A field received an update while it was propagating its own.
    #[error("reentrant update of field {0:?}")]
    Reentrancy(FieldRef),
    /// A `One` relation already has a related object.
    #[error("relation {relation:?} of object {obj:?} is already occupied")]
    RelationOccupied {
        /// Object whose side is full.
        obj: ObjId,
        /// Relation navigated from `obj`.
        relation: RelationId,
    },
    /// The two objects are already connected through this relation.
    #[error("objects {from:?} and {to:?} are already connected via {relation:?}")]
    AlreadyConnected {
        /// Source object.
        from: ObjId,
        /// Target object.
        to: ObjId,
        /// Relation.
        relation: RelationId,
    },
    /// The self relation is implicit and cannot be connected.
    #[error("the self relation cannot be connected")]
    SelfRelationEdge,
    /// Schema lookup failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Queue drain failure.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Field value decoding failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Clone, Debug)]
pub(crate) struct ObjRecord {
    pub(crate) ty: TypeId,
    pub(crate) fields: Vec<Option<Field>>,
}

/// A processing session: objects, their fields, and one step queue.
///
/// All propagation and step processing for a document runs on the caller's
/// thread through `&mut self`.
pub struct Document {
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: DocumentConfig,
    pub(crate) objs: Vec<ObjRecord>,
    pub(crate) edges: FxHashMap<(ObjId, RelationId), Vec<ObjId>>,
    pub(crate) queue: Queue<Document>,
    pub(crate) observer: Arc<dyn SelectionObserver>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("objs", &self.objs.len())
            .field("edges", &self.edges.len())
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueueHost for Document {
    type Error = DocumentError;

    fn queue(&self) -> &Queue<Self> {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut Queue<Self> {
        &mut self.queue
    }
}

impl Document {
    /// Creates a document over a flattened registry with default config.
    pub fn new(registry: &TypeRegistry) -> Result<Self, DocumentError> {
        Self::with_config(registry, DocumentConfig::default())
    }

    /// Creates a document over a flattened registry.
    pub fn with_config(
        registry: &TypeRegistry,
        config: DocumentConfig,
    ) -> Result<Self, DocumentError> {
        let schema = registry.schema().ok_or(DocumentError::NotFlattened)?;
        Ok(Self::from_schema(schema, config))
    }

    /// Creates a document over an already compiled schema.
    pub fn from_schema(schema: Arc<Schema>, config: DocumentConfig) -> Self {
        let mut queue = Queue::new();
        queue.set_timeout(config.timeout());
        if config.trace_steps {
            queue.set_sink(Arc::new(TracingSink));
        }
        Self {
            schema,
            config,
            objs: Vec::new(),
            edges: FxHashMap::default(),
            queue,
            observer: Arc::new(NullObserver),
        }
    }

    /// Compiled schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Active configuration.
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Installs the observer notified of max-field winner changes.
    pub fn set_observer(&mut self, observer: Arc<dyn SelectionObserver>) {
        self.observer = observer;
    }

    /// Installs the queue event sink.
    pub fn set_queue_sink(&mut self, sink: Arc<dyn QueueEventSink>) {
        self.queue.set_sink(sink);
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objs.len()
    }

    /// Returns `true` if no object was instantiated.
    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    /// Creates an object of `ty`. Its fields are created lazily.
    pub fn instantiate(&mut self, ty: TypeId) -> Result<ObjId, DocumentError> {
        let table = self
            .schema
            .flattened(ty)
            .ok_or(DocumentError::UnknownType(ty))?;
        let id = ObjId(u32::try_from(self.objs.len()).map_err(|_| SchemaError::Capacity)?);
        self.objs.push(ObjRecord {
            ty,
            fields: vec![None; table.len()],
        });
        Ok(id)
    }

    /// Type of an object.
    pub fn obj_type(&self, obj: ObjId) -> Result<TypeId, DocumentError> {
        self.objs
            .get(obj.index())
            .map(|r| r.ty)
            .ok_or(DocumentError::UnknownObj(obj))
    }

    /// Objects reached by navigating `rel` from `obj`, in connection order.
    pub fn related(&self, obj: ObjId, rel: RelationId) -> Result<Vec<ObjId>, DocumentError> {
        self.obj_type(obj)?;
        if rel == RelationId::SELF {
            return Ok(vec![obj]);
        }
        Ok(self.edges.get(&(obj, rel)).cloned().unwrap_or_default())
    }

    /// Connects `from` to `to` along `rel` (and `to` to `from` along its
    /// reverse), then pulls current values across every field link that
    /// uses the new edge.
    pub fn connect(
        &mut self,
        rel: RelationId,
        from: ObjId,
        to: ObjId,
    ) -> Result<(), DocumentError> {
        if rel == RelationId::SELF {
            return Err(DocumentError::SelfRelationEdge);
        }
        let schema = Arc::clone(&self.schema);
        let forward = schema
            .relation(rel)
            .ok_or(SchemaError::UnknownRelation(rel))?;
        let backward = schema
            .relation(forward.reverse())
            .ok_or(SchemaError::UnknownRelation(forward.reverse()))?;
        self.obj_type(from)?;
        self.obj_type(to)?;

        if self
            .edges
            .get(&(from, rel))
            .is_some_and(|targets| targets.contains(&to))
        {
            return Err(DocumentError::AlreadyConnected {
                from,
                to,
                relation: rel,
            });
        }
        self.ensure_vacant(from, rel, forward.kind())?;
        self.ensure_vacant(to, backward.id(), backward.kind())?;

        self.edges.entry((from, rel)).or_default().push(to);
        self.edges.entry((to, backward.id())).or_default().push(from);

        for &link_id in schema.links_along(rel) {
            self.fetch_across(&schema, link_id, from, to)?;
        }
        for &link_id in schema.links_along(backward.id()) {
            self.fetch_across(&schema, link_id, to, from)?;
        }
        Ok(())
    }

    fn ensure_vacant(
        &self,
        obj: ObjId,
        rel: RelationId,
        kind: RelationKind,
    ) -> Result<(), DocumentError> {
        let occupied = self
            .edges
            .get(&(obj, rel))
            .is_some_and(|targets| !targets.is_empty());
        if kind == RelationKind::One && occupied {
            return Err(DocumentError::RelationOccupied { obj, relation: rel });
        }
        Ok(())
    }

    /// Address of the cell carrying `def` on `obj`.
    pub fn field_ref(&self, obj: ObjId, def: FieldDefId) -> Result<FieldRef, DocumentError> {
        let ty = self.obj_type(obj)?;
        let slot = self
            .schema
            .slot_of(ty, def)
            .ok_or(DocumentError::FieldNotOnType { field: def, ty })?;
        Ok(FieldRef::new(obj, slot))
    }

    /// The field cell, or `None` if it was never created.
    pub fn field(&self, obj: ObjId, def: FieldDefId) -> Result<Option<&Field>, DocumentError> {
        let at = self.field_ref(obj, def)?;
        Ok(self.field_at(at))
    }

    /// Committed value; `0.0` for a field that was never created.
    pub fn field_value(&self, obj: ObjId, def: FieldDefId) -> Result<f64, DocumentError> {
        Ok(self.field(obj, def)?.map_or(0.0, Field::value))
    }

    /// Pending value while propagating, else the committed value.
    pub fn updated_value(&self, obj: ObjId, def: FieldDefId) -> Result<f64, DocumentError> {
        Ok(self.field(obj, def)?.map_or(0.0, Field::updated_value))
    }

    /// Routes future updates of the field through a coalescing step in
    /// `phase`.
    pub fn set_queued(
        &mut self,
        obj: ObjId,
        def: FieldDefId,
        phase: Phase,
        next_round: bool,
    ) -> Result<(), DocumentError> {
        let at = self.field_ref(obj, def)?;
        let field = self.get_or_create(at)?;
        match field.interceptor.as_mut() {
            Some(icpt) => icpt.reconfigure(phase, next_round),
            None => field.interceptor = Some(QueueInterceptor::new(phase, next_round)),
        }
        Ok(())
    }

    /// Source field of the max field's current winner.
    pub fn selected_input(
        &self,
        obj: ObjId,
        def: FieldDefId,
    ) -> Result<Option<FieldRef>, DocumentError> {
        Ok(self.field(obj, def)?.and_then(|f| match &f.inputs {
            FieldInputs::Max(state) => state.winner().map(|w| w.source),
            _ => None,
        }))
    }

    /// Enqueues a step on the document's queue.
    pub fn add_step(&mut self, step: Box<dyn Step<Self>>) -> QueueKey {
        self.queue.add_step(step)
    }

    /// Document queue.
    pub fn queue(&self) -> &Queue<Self> {
        &self.queue
    }

    /// Document queue, mutably.
    pub fn queue_mut(&mut self) -> &mut Queue<Self> {
        &mut self.queue
    }

    /// Drains the queue.
    pub fn process(&mut self) -> Result<DrainReport, DocumentError> {
        queue::process(self)
    }

    /// Drains the queue, skipping steps rejected by `filter`. Skipped steps
    /// remain queued.
    pub fn process_filtered<F>(&mut self, filter: F) -> Result<DrainReport, DocumentError>
    where
        F: FnMut(&QueueKey, &dyn Step<Self>) -> bool,
    {
        queue::process_filtered(self, filter)
    }

    /// Drains steps up to and including `round`.
    pub fn process_through(&mut self, round: Round) -> Result<DrainReport, DocumentError> {
        queue::process_through(self, round)
    }

    pub(crate) fn field_at(&self, at: FieldRef) -> Option<&Field> {
        self.objs
            .get(at.obj.index())?
            .fields
            .get(at.slot.index())?
            .as_ref()
    }

    pub(crate) fn field_at_mut(&mut self, at: FieldRef) -> Option<&mut Field> {
        self.objs
            .get_mut(at.obj.index())?
            .fields
            .get_mut(at.slot.index())?
            .as_mut()
    }

    pub(crate) fn get_or_create(&mut self, at: FieldRef) -> Result<&mut Field, DocumentError> {
        let rec = self
            .objs
            .get_mut(at.obj.index())
            .ok_or(DocumentError::UnknownObj(at.obj))?;
        let slot = self
            .schema
            .slot(rec.ty, at.slot)
            .ok_or(DocumentError::UnknownSlot(at))?;
        let def = def_of(&self.schema, slot.def())?;
        let cell = rec
            .fields
            .get_mut(at.slot.index())
            .ok_or(DocumentError::UnknownSlot(at))?;
        Ok(cell.get_or_insert_with(|| Field::new(def)))
    }
}

pub(crate) fn def_of(schema: &Schema, id: FieldDefId) -> Result<&FieldDef, DocumentError> {
    schema
        .def(id)
        .ok_or(DocumentError::Schema(SchemaError::UnknownField(id)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]
    use super::*;

    fn registry() -> (TypeRegistry, TypeId, TypeId, RelationId) {
        let mut reg = TypeRegistry::new();
        let (one, _many) = reg
            .new_relation("owner", RelationKind::One, "members", RelationKind::Many)
            .unwrap();
        let member = reg.new_type("member", &[]).unwrap();
        let group = reg.new_type("group", &[]).unwrap();
        reg.input_field(member, "x").unwrap();
        (reg, member, group, one)
    }

    #[test]
    fn unflattened_registry_is_rejected() {
        let (reg, ..) = registry();
        assert_eq!(Document::new(&reg).unwrap_err(), DocumentError::NotFlattened);
    }

    #[test]
    fn one_relation_accepts_a_single_target() {
        let (mut reg, member, group, owner) = registry();
        reg.flatten_type_hierarchy().unwrap();
        let mut doc = Document::new(&reg).unwrap();
        let m = doc.instantiate(member).unwrap();
        let g1 = doc.instantiate(group).unwrap();
        let g2 = doc.instantiate(group).unwrap();

        doc.connect(owner, m, g1).unwrap();
        assert_eq!(
            doc.connect(owner, m, g1).unwrap_err(),
            DocumentError::AlreadyConnected {
                from: m,
                to: g1,
                relation: owner
            }
        );
        assert_eq!(
            doc.connect(owner, m, g2).unwrap_err(),
            DocumentError::RelationOccupied {
                obj: m,
                relation: owner
            }
        );
        let members = reg.relation(owner).unwrap().reverse();
        assert_eq!(doc.related(g1, members).unwrap(), vec![m]);
        assert_eq!(doc.related(m, RelationId::SELF).unwrap(), vec![m]);
        assert!(doc.related(g2, members).unwrap().is_empty());
    }

    #[test]
    fn self_relation_cannot_be_connected() {
        let (mut reg, member, ..) = registry();
        reg.flatten_type_hierarchy().unwrap();
        let mut doc = Document::new(&reg).unwrap();
        let m = doc.instantiate(member).unwrap();
        assert_eq!(
            doc.connect(RelationId::SELF, m, m).unwrap_err(),
            DocumentError::SelfRelationEdge
        );
    }

    #[test]
    fn fields_are_created_lazily() {
        let (mut reg, member, group, _) = registry();
        let schema = reg.flatten_type_hierarchy().unwrap();
        let x = schema.types()[member.index()].slots()[0].def();
        let mut doc = Document::new(&reg).unwrap();
        let m = doc.instantiate(member).unwrap();
        let g = doc.instantiate(group).unwrap();

        assert!(doc.field(m, x).unwrap().is_none());
        assert_eq!(doc.field_value(m, x).unwrap(), 0.0);
        assert_eq!(
            doc.field_value(g, x).unwrap_err(),
            DocumentError::FieldNotOnType { field: x, ty: group }
        );
        doc.set_field_value(m, x, 2.0).unwrap();
        assert_eq!(doc.field(m, x).unwrap().unwrap().value(), 2.0);
    }
}
