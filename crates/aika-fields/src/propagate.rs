// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Synchronous delta propagation along compiled field links.
//!
//! An update enters a field through [`Document::receive_update`] (tolerance
//! and interceptor apply) or [`Document::set_field_value`] (neither applies).
//! The field then walks its slot's output links: every related object that
//! carries the link's target definition receives the delta, transformed by
//! the target's combinator. The walk is depth-first and completes before the
//! originating call returns.

use std::sync::Arc;

use tracing::trace;

use crate::document::{def_of, Document, DocumentError};
use crate::field::{Field, FieldInputs};
use crate::ident::{FieldDefId, FieldIndex, FieldLinkId, FieldRef, ObjId, TypeId};
use crate::schema::{FieldLinkDef, LinkKind, Schema};

enum Delivery {
    Forward(f64),
    Select,
}

struct Arrival {
    source: FieldRef,
    link: FieldLinkId,
    arg: Option<u8>,
    value: f64,
}

impl Document {
    /// Sets a field to `value` and propagates the difference.
    ///
    /// Bypasses tolerance and any queue interceptor; setting the current
    /// value is a no-op.
    pub fn set_field_value(
        &mut self,
        obj: ObjId,
        def: FieldDefId,
        value: f64,
    ) -> Result<(), DocumentError> {
        let at = self.field_ref(obj, def)?;
        let old = self.get_or_create(at)?.value();
        if value - old == 0.0 {
            return Ok(());
        }
        self.propagate(at, value)
    }

    /// Delivers `delta` to a field as if it arrived over an input link.
    pub fn receive_update(
        &mut self,
        obj: ObjId,
        def: FieldDefId,
        delta: f64,
    ) -> Result<(), DocumentError> {
        let at = self.field_ref(obj, def)?;
        self.receive(at, delta, false)
    }

    /// Recomputes every derived field of `obj` from the current values of
    /// its input fields and propagates the corrections.
    ///
    /// Used after an object was connected before its inputs were set on the
    /// supplying side, or when a document is rebuilt from stored values.
    ///
    /// Only input cells that exist are gathered, and a slot with none is left
    /// alone. A fixed-arity field whose function is non-zero at zero (`Exp`,
    /// `Sigmoid`, an affine `Custom`) is therefore not seeded with `f(0)`
    /// until at least one of its input cells has been created.
    pub fn init_fields(&mut self, obj: ObjId) -> Result<(), DocumentError> {
        let schema = Arc::clone(&self.schema);
        let ty = self.obj_type(obj)?;
        let table = schema
            .flattened(ty)
            .ok_or(DocumentError::UnknownType(ty))?;
        for (slot, index) in table.slots().iter().zip((0u16..).map(FieldIndex)) {
            if slot.inputs().is_empty() || slot.is_selection_target() {
                continue;
            }
            let dst = FieldRef::new(obj, index);
            let arrivals = self.gather(&schema, dst, slot.inputs())?;
            if arrivals.is_empty() {
                continue;
            }
            self.recompute(&schema, dst, &arrivals)?;
        }
        Ok(())
    }

    fn gather(
        &self,
        schema: &Schema,
        dst: FieldRef,
        inputs: &[FieldLinkId],
    ) -> Result<Vec<Arrival>, DocumentError> {
        let mut arrivals = Vec::new();
        for link in inputs.iter().filter_map(|&id| schema.link(id)) {
            for src_obj in self.related(dst.obj, link.reverse())? {
                let src_ty = self.obj_type(src_obj)?;
                let Some(slot) = schema.slot_of(src_ty, link.input()) else {
                    continue;
                };
                let source = FieldRef::new(src_obj, slot);
                if let Some(field) = self.field_at(source) {
                    arrivals.push(Arrival {
                        source,
                        link: link.id(),
                        arg: link.arg(),
                        value: field.value(),
                    });
                }
            }
        }
        Ok(arrivals)
    }

    fn recompute(
        &mut self,
        schema: &Schema,
        dst: FieldRef,
        arrivals: &[Arrival],
    ) -> Result<(), DocumentError> {
        let delivery = {
            let field = self.get_or_create(dst)?;
            let projected = field.projected();
            let combinator = def_of(schema, field.def)?.combinator();
            match &mut field.inputs {
                FieldInputs::Accumulate => {
                    let total: f64 = arrivals.iter().map(|a| a.value).sum();
                    Delivery::Forward(total - projected)
                }
                FieldInputs::Args(args) => {
                    args.iter_mut().for_each(|a| *a = 0.0);
                    for arrival in arrivals {
                        if let Some(a) = args.get_mut(usize::from(arrival.arg.unwrap_or(0))) {
                            *a += arrival.value;
                        }
                    }
                    Delivery::Forward(combinator.evaluate(args, projected) - projected)
                }
                FieldInputs::Max(state) => {
                    for arrival in arrivals {
                        state.set_input(arrival.source, arrival.link, arrival.value);
                    }
                    Delivery::Select
                }
            }
        };
        match delivery {
            Delivery::Forward(delta) if delta == 0.0 => Ok(()),
            Delivery::Forward(delta) => self.receive(dst, delta, false),
            Delivery::Select => self.refresh_max(dst),
        }
    }

    /// Entry point of every link-borne update.
    pub(crate) fn receive(
        &mut self,
        target: FieldRef,
        delta: f64,
        replace: bool,
    ) -> Result<(), DocumentError> {
        let (def, queued) = {
            let field = self.get_or_create(target)?;
            if field.is_propagating() {
                return Err(DocumentError::Reentrancy(target));
            }
            (field.def, field.is_queued())
        };
        if !replace && def_of(&self.schema, def)?.below_tolerance(delta) {
            trace!(?target, delta, "update below tolerance");
            return Ok(());
        }
        if queued {
            self.intercept(target, delta, replace)
        } else {
            self.trigger_update(target, delta)
        }
    }

    /// Applies `delta` unless it falls below the field's tolerance.
    pub(crate) fn trigger_checked(
        &mut self,
        target: FieldRef,
        delta: f64,
    ) -> Result<(), DocumentError> {
        let field = self
            .field_at(target)
            .ok_or(DocumentError::UnknownSlot(target))?;
        if def_of(&self.schema, field.def)?.below_tolerance(delta) {
            trace!(?target, delta, "merged update below tolerance");
            return Ok(());
        }
        self.trigger_update(target, delta)
    }

    pub(crate) fn trigger_update(
        &mut self,
        target: FieldRef,
        delta: f64,
    ) -> Result<(), DocumentError> {
        let value = self
            .field_at(target)
            .ok_or(DocumentError::UnknownSlot(target))?
            .value();
        self.propagate(target, value + delta)
    }

    /// Moves the field to `updated`, walks its output links, then commits.
    fn propagate(&mut self, target: FieldRef, updated: f64) -> Result<(), DocumentError> {
        let schema = Arc::clone(&self.schema);
        let ty = self.obj_type(target.obj)?;
        let old = self
            .field_at_mut(target)
            .ok_or(DocumentError::UnknownSlot(target))?
            .begin(target, updated)
            .map_err(DocumentError::Reentrancy)?;
        let delta = updated - old;
        trace!(?target, old, updated, "propagate");
        let walked = if delta == 0.0 {
            Ok(())
        } else {
            self.fan_out(&schema, ty, target, delta)
        };
        if let Some(field) = self.field_at_mut(target) {
            field.commit();
        }
        walked
    }

    fn fan_out(
        &mut self,
        schema: &Schema,
        ty: TypeId,
        source: FieldRef,
        delta: f64,
    ) -> Result<(), DocumentError> {
        let slot = schema
            .slot(ty, source.slot)
            .ok_or(DocumentError::UnknownSlot(source))?;
        for link in slot.outputs().iter().filter_map(|&id| schema.link(id)) {
            self.push_along(schema, link, source.obj, source, delta)?;
        }
        Ok(())
    }

    /// Delivers `delta` from `source` to every object reached from
    /// `from_obj` across `link`.
    pub(crate) fn push_along(
        &mut self,
        schema: &Schema,
        link: &FieldLinkDef,
        from_obj: ObjId,
        source: FieldRef,
        delta: f64,
    ) -> Result<(), DocumentError> {
        for dst_obj in self.related(from_obj, link.relation())? {
            let dst_ty = self.obj_type(dst_obj)?;
            let Some(index) = bound_slot(schema, link, dst_ty) else {
                trace!(?dst_obj, link = ?link.id(), "related object lacks link target");
                continue;
            };
            self.deliver(schema, FieldRef::new(dst_obj, index), link, source, delta)?;
        }
        Ok(())
    }

    /// Pulls the committed value of the link's source on `src_obj` into its
    /// target on `dst_obj`. Nothing happens if the source was never created.
    pub(crate) fn fetch_across(
        &mut self,
        schema: &Schema,
        link: FieldLinkId,
        src_obj: ObjId,
        dst_obj: ObjId,
    ) -> Result<(), DocumentError> {
        let Some(link) = schema.link(link) else {
            return Ok(());
        };
        let src_ty = self.obj_type(src_obj)?;
        let Some(src_slot) = schema.slot_of(src_ty, link.input()) else {
            return Ok(());
        };
        let source = FieldRef::new(src_obj, src_slot);
        let Some(value) = self.field_at(source).map(Field::value) else {
            return Ok(());
        };
        let dst_ty = self.obj_type(dst_obj)?;
        let Some(index) = bound_slot(schema, link, dst_ty) else {
            return Ok(());
        };
        trace!(?source, ?dst_obj, value, "fetch across new edge");
        self.deliver(schema, FieldRef::new(dst_obj, index), link, source, value)
    }

    fn deliver(
        &mut self,
        schema: &Schema,
        dst: FieldRef,
        link: &FieldLinkDef,
        source: FieldRef,
        delta: f64,
    ) -> Result<(), DocumentError> {
        let delivery = {
            let field = self.get_or_create(dst)?;
            if field.is_propagating() {
                return Err(DocumentError::Reentrancy(dst));
            }
            let projected = field.projected();
            let combinator = def_of(schema, field.def)?.combinator();
            match &mut field.inputs {
                FieldInputs::Accumulate => Delivery::Forward(delta),
                FieldInputs::Args(args) => {
                    if let Some(a) = args.get_mut(usize::from(link.arg().unwrap_or(0))) {
                        *a += delta;
                    }
                    Delivery::Forward(combinator.evaluate(args, projected) - projected)
                }
                FieldInputs::Max(state) => {
                    state.record(source, link.id(), delta);
                    Delivery::Select
                }
            }
        };
        match delivery {
            Delivery::Forward(change) => self.receive(dst, change, false),
            Delivery::Select => self.refresh_max(dst),
        }
    }
}

/// Slot of `link`'s target on `ty`, if the link feeds it.
///
/// An override that declares its own inputs replaces the inherited ones on
/// the shared slot, so value links are checked against the slot's inputs.
fn bound_slot(schema: &Schema, link: &FieldLinkDef, ty: TypeId) -> Option<FieldIndex> {
    let index = schema.slot_of(ty, link.output())?;
    let bound = link.kind() == LinkKind::Selection
        || schema
            .slot(ty, index)
            .is_some_and(|slot| slot.inputs().contains(&link.id()));
    bound.then_some(index)
}
