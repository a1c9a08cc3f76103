// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Declaration surface: types, relations and field definitions.

use std::sync::Arc;

use crate::function::Combinator;
use crate::ident::{FieldDefId, RelationId, TypeId};
use crate::queue::Phase;
use crate::relation::{Relation, RelationKind, RelationTable};

use super::field_def::{FieldDef, LinkDecl, LinkKind, QueueSpec};
use super::flatten::compile;
use super::{Schema, SchemaError};

/// A declared object type.
#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) parents: Vec<TypeId>,
}

impl TypeDecl {
    /// Type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct parents in declaration order.
    pub fn parents(&self) -> &[TypeId] {
        &self.parents
    }
}

/// Collects schema declarations and compiles them into a [`Schema`].
///
/// Declarations are only accepted before [`flatten_type_hierarchy`]
/// succeeds; afterwards the registry is sealed. Structural mistakes
/// (cycles, bad overrides, arity mismatches) are reported by the flatten
/// call, before any object exists.
///
/// [`flatten_type_hierarchy`]: TypeRegistry::flatten_type_hierarchy
#[derive(Debug, Default)]
pub struct TypeRegistry {
    pub(crate) relations: RelationTable,
    pub(crate) types: Vec<TypeDecl>,
    pub(crate) defs: Vec<FieldDef>,
    pub(crate) links: Vec<LinkDecl>,
    compiled: Option<Arc<Schema>>,
}

impl TypeRegistry {
    /// Creates an empty registry with the self relation pre-declared.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), SchemaError> {
        if self.compiled.is_some() {
            return Err(SchemaError::Sealed);
        }
        Ok(())
    }

    fn ensure_type(&self, ty: TypeId) -> Result<(), SchemaError> {
        if ty.index() < self.types.len() {
            Ok(())
        } else {
            Err(SchemaError::UnknownType(ty))
        }
    }

    /// Declares a type with the given parents.
    pub fn new_type(&mut self, name: &str, parents: &[TypeId]) -> Result<TypeId, SchemaError> {
        self.ensure_open()?;
        for &p in parents {
            self.ensure_type(p)?;
        }
        let id = TypeId(u16::try_from(self.types.len()).map_err(|_| SchemaError::Capacity)?);
        self.types.push(TypeDecl {
            id,
            name: name.to_owned(),
            parents: parents.to_vec(),
        });
        Ok(id)
    }

    /// Adds a parent to an existing type. Cycles are reported at flatten time.
    pub fn add_parent(&mut self, ty: TypeId, parent: TypeId) -> Result<(), SchemaError> {
        self.ensure_open()?;
        self.ensure_type(parent)?;
        let decl = self
            .types
            .get_mut(ty.index())
            .ok_or(SchemaError::UnknownType(ty))?;
        if !decl.parents.contains(&parent) {
            decl.parents.push(parent);
        }
        Ok(())
    }

    /// Declares a relation and its reverse as one pair.
    ///
    /// `kind` describes navigation along `name`; `reverse_kind` along
    /// `reverse_name`.
    pub fn new_relation(
        &mut self,
        name: &str,
        kind: RelationKind,
        reverse_name: &str,
        reverse_kind: RelationKind,
    ) -> Result<(RelationId, RelationId), SchemaError> {
        self.ensure_open()?;
        if kind == RelationKind::SelfRef || reverse_kind == RelationKind::SelfRef {
            return Err(SchemaError::InvalidRelationKind);
        }
        self.relations
            .declare_pair(name, kind, reverse_name, reverse_kind)
            .ok_or(SchemaError::Capacity)
    }

    /// The pre-declared self relation.
    pub fn self_relation(&self) -> RelationId {
        RelationId::SELF
    }

    /// Looks up a relation.
    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id)
    }

    /// Looks up a type declaration.
    pub fn type_decl(&self, id: TypeId) -> Option<&TypeDecl> {
        self.types.get(id.index())
    }

    /// Looks up a field definition.
    pub fn field_def(&self, id: FieldDefId) -> Option<&FieldDef> {
        self.defs.get(id.index())
    }

    /// Declares a field definition on `ty` and returns a builder for its links.
    pub fn field(
        &mut self,
        ty: TypeId,
        name: &str,
        combinator: Combinator,
    ) -> Result<FieldDefBuilder<'_>, SchemaError> {
        self.ensure_open()?;
        self.ensure_type(ty)?;
        let id = FieldDefId(u32::try_from(self.defs.len()).map_err(|_| SchemaError::Capacity)?);
        self.defs.push(FieldDef {
            id,
            owner: ty,
            name: name.to_owned(),
            combinator,
            tolerance: None,
            parent: None,
            queued: None,
        });
        Ok(FieldDefBuilder { registry: self, id })
    }

    /// Declares a plain input field: a sum with no declared inputs, written
    /// through [`Document::set_field_value`](crate::Document::set_field_value).
    pub fn input_field(&mut self, ty: TypeId, name: &str) -> Result<FieldDefId, SchemaError> {
        Ok(self.field(ty, name, Combinator::Sum)?.id())
    }

    /// Reopens the builder of an already declared definition.
    pub fn builder(&mut self, id: FieldDefId) -> Result<FieldDefBuilder<'_>, SchemaError> {
        self.ensure_open()?;
        if id.index() >= self.defs.len() {
            return Err(SchemaError::UnknownField(id));
        }
        Ok(FieldDefBuilder { registry: self, id })
    }

    /// Compiles every declaration into dense per-type tables and seals the
    /// registry.
    ///
    /// Repeating the call returns an identical schema. Once a
    /// [`Document`](crate::Document) holds the compiled schema, repeating it
    /// fails with [`SchemaError::SchemaInUse`].
    pub fn flatten_type_hierarchy(&mut self) -> Result<Arc<Schema>, SchemaError> {
        if let Some(existing) = &self.compiled {
            if Arc::strong_count(existing) > 1 {
                return Err(SchemaError::SchemaInUse);
            }
        }
        let schema = Arc::new(compile(self)?);
        self.compiled = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Returns the compiled schema, or `None` before flattening.
    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.compiled.clone()
    }

    /// Returns `true` once the registry has been flattened.
    pub fn is_sealed(&self) -> bool {
        self.compiled.is_some()
    }

    fn def_mut(&mut self, id: FieldDefId) -> Option<&mut FieldDef> {
        self.defs.get_mut(id.index())
    }
}

/// Fluent builder returned by [`TypeRegistry::field`].
///
/// Builder calls only record declarations; validation happens in
/// [`TypeRegistry::flatten_type_hierarchy`].
#[derive(Debug)]
pub struct FieldDefBuilder<'r> {
    registry: &'r mut TypeRegistry,
    id: FieldDefId,
}

impl FieldDefBuilder<'_> {
    fn link(self, via: RelationId, input: FieldDefId, arg: Option<u8>) -> Self {
        let output = self.id;
        self.registry.links.push(LinkDecl {
            input,
            output,
            via,
            arg,
            kind: LinkKind::Value,
        });
        self
    }

    /// Adds a variable-arity input: `source` is found by navigating `via`
    /// from this field's object.
    pub fn input(self, via: RelationId, source: FieldDefId) -> Self {
        self.link(via, source, None)
    }

    /// Adds an input bound to argument position `arg` of a fixed-arity
    /// combinator.
    pub fn input_arg(self, via: RelationId, source: FieldDefId, arg: u8) -> Self {
        self.link(via, source, Some(arg))
    }

    /// Sets the propagation tolerance.
    pub fn tolerance(self, tolerance: f64) -> Self {
        let id = self.id;
        if let Some(def) = self.registry.def_mut(id) {
            def.tolerance = Some(tolerance);
        }
        self
    }

    /// Declares this definition as an override of an ancestor type's field.
    pub fn override_of(self, parent: FieldDefId) -> Self {
        let id = self.id;
        if let Some(def) = self.registry.def_mut(id) {
            def.parent = Some(parent);
        }
        self
    }

    /// Routes updates of this field through a coalescing queue step.
    pub fn queued(self, phase: Phase, next_round: bool) -> Self {
        let id = self.id;
        if let Some(def) = self.registry.def_mut(id) {
            def.queued = Some(QueueSpec { phase, next_round });
        }
        self
    }

    /// Adds a selection edge on a max field: the current winner's value is
    /// forwarded to `target`, found by navigating `via` from the winning
    /// input's object.
    pub fn select_out(self, via: RelationId, target: FieldDefId) -> Self {
        let input = self.id;
        self.registry.links.push(LinkDecl {
            input,
            output: target,
            via,
            arg: None,
            kind: LinkKind::Selection,
        });
        self
    }

    /// Finishes the builder.
    pub fn id(self) -> FieldDefId {
        self.id
    }
}
