// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Whole-registry flattening into dense per-type slot tables.

use std::collections::BTreeSet;

use blake3::Hasher;
use tracing::debug;

use crate::function::Combinator;
use crate::ident::{FieldDefId, FieldIndex, FieldLinkId, Hash, TypeId};

use super::field_def::{FieldDef, FieldLinkDef, LinkKind};
use super::registry::TypeRegistry;
use super::{Schema, SchemaError};

/// One dense slot of a flattened type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub(crate) def: FieldDefId,
    pub(crate) aliases: Vec<FieldDefId>,
    pub(crate) inputs: Vec<FieldLinkId>,
    pub(crate) outputs: Vec<FieldLinkId>,
    pub(crate) selections: Vec<FieldLinkId>,
    pub(crate) selection_target: bool,
}

impl Slot {
    /// The most derived definition present on the type.
    pub fn def(&self) -> FieldDefId {
        self.def
    }

    /// Every definition mapped onto this slot, ascending.
    pub fn aliases(&self) -> &[FieldDefId] {
        &self.aliases
    }

    /// Value links used to compute this slot from its inputs.
    pub fn inputs(&self) -> &[FieldLinkId] {
        &self.inputs
    }

    /// Value links used to push this slot's deltas to dependents.
    pub fn outputs(&self) -> &[FieldLinkId] {
        &self.outputs
    }

    /// Selection links driven by this slot when it is a max field.
    pub fn selections(&self) -> &[FieldLinkId] {
        &self.selections
    }

    /// Returns `true` when the slot is fed by another field's selection.
    pub fn is_selection_target(&self) -> bool {
        self.selection_target
    }
}

/// Precompiled dispatch table of a single type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlattenedType {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) depth: u16,
    pub(crate) ancestors: Vec<TypeId>,
    pub(crate) slot_of: Vec<Option<FieldIndex>>,
    pub(crate) slots: Vec<Slot>,
}

impl FlattenedType {
    /// Type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the longest parent chain above this type.
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// This type and every ancestor, ascending.
    pub fn ancestors(&self) -> &[TypeId] {
        &self.ancestors
    }

    /// All slots in slot order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the type carries no fields.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot by index.
    pub fn slot(&self, slot: FieldIndex) -> Option<&Slot> {
        self.slots.get(slot.index())
    }

    /// Slot carrying `def` (directly or as an overridden alias).
    pub fn slot_index(&self, def: FieldDefId) -> Option<FieldIndex> {
        self.slot_of.get(def.index()).copied().flatten()
    }
}

#[derive(Clone, Copy)]
enum Mark {
    Unvisited,
    Visiting,
    Done(u16),
}

struct LinkIndex {
    into: Vec<Vec<FieldLinkId>>,
    from: Vec<Vec<FieldLinkId>>,
    select_from: Vec<Vec<FieldLinkId>>,
    select_into: Vec<bool>,
}

impl LinkIndex {
    fn build(defs: usize, links: &[FieldLinkDef]) -> Self {
        let mut index = Self {
            into: vec![Vec::new(); defs],
            from: vec![Vec::new(); defs],
            select_from: vec![Vec::new(); defs],
            select_into: vec![false; defs],
        };
        for link in links {
            match link.kind {
                LinkKind::Value => {
                    index.into[link.output.index()].push(link.id);
                    index.from[link.input.index()].push(link.id);
                }
                LinkKind::Selection => {
                    index.select_from[link.input.index()].push(link.id);
                    index.select_into[link.output.index()] = true;
                }
            }
        }
        index
    }
}

pub(crate) fn compile(reg: &TypeRegistry) -> Result<Schema, SchemaError> {
    let links = compile_links(reg)?;

    let mut marks = vec![Mark::Unvisited; reg.types.len()];
    let mut depths = Vec::with_capacity(reg.types.len());
    for decl in &reg.types {
        depths.push(depth_of(reg, decl.id, &mut marks)?);
    }
    let ancestors: Vec<Vec<TypeId>> = reg
        .types
        .iter()
        .map(|decl| ancestors_of(reg, decl.id))
        .collect();

    validate_overrides(reg, &ancestors)?;

    let index = LinkIndex::build(reg.defs.len(), &links);
    let mut order: Vec<TypeId> = reg.types.iter().map(|decl| decl.id).collect();
    order.sort_by_key(|ty| (depths[ty.index()], *ty));

    let mut flattened: Vec<Option<FlattenedType>> = (0..reg.types.len()).map(|_| None).collect();
    for ty in order {
        let table = flatten_one(reg, &index, ty, &depths, &ancestors, &flattened)?;
        flattened[ty.index()] = Some(table);
    }
    let types: Vec<FlattenedType> = flattened.into_iter().flatten().collect();

    let relations = reg.relations.clone().into_vec();
    let mut links_by_relation = vec![Vec::new(); relations.len()];
    for link in links.iter().filter(|l| l.kind == LinkKind::Value) {
        links_by_relation[link.relation.index()].push(link.id);
    }

    let digest = digest(&reg.defs, &links, &types);
    debug!(
        types = types.len(),
        fields = reg.defs.len(),
        links = links.len(),
        "flattened type hierarchy"
    );

    Ok(Schema {
        relations,
        defs: reg.defs.clone(),
        links,
        types,
        links_by_relation,
        digest,
    })
}

fn compile_links(reg: &TypeRegistry) -> Result<Vec<FieldLinkDef>, SchemaError> {
    let mut out = Vec::with_capacity(reg.links.len());
    for (i, decl) in reg.links.iter().enumerate() {
        let id = FieldLinkId(u32::try_from(i).map_err(|_| SchemaError::Capacity)?);
        let input = reg
            .field_def(decl.input)
            .ok_or(SchemaError::UnknownField(decl.input))?;
        let output = reg
            .field_def(decl.output)
            .ok_or(SchemaError::UnknownField(decl.output))?;
        let via = reg
            .relation(decl.via)
            .ok_or(SchemaError::UnknownRelation(decl.via))?;

        let (relation, reverse) = match decl.kind {
            LinkKind::Value => {
                check_arg(output, decl.arg)?;
                (via.reverse(), via.id())
            }
            LinkKind::Selection => {
                if !matches!(input.combinator, Combinator::Max) {
                    return Err(SchemaError::NotAMaxField(input.id));
                }
                if output.combinator.arity().is_some() {
                    return Err(SchemaError::ArityMismatch(output.id));
                }
                (via.id(), via.reverse())
            }
        };
        out.push(FieldLinkDef {
            id,
            input: input.id,
            output: output.id,
            relation,
            reverse,
            arg: decl.arg,
            kind: decl.kind,
        });
    }
    Ok(out)
}

fn check_arg(output: &FieldDef, arg: Option<u8>) -> Result<(), SchemaError> {
    match (output.combinator.arity(), arg) {
        (None, None) => Ok(()),
        (Some(n), Some(a)) if usize::from(a) < n => Ok(()),
        (Some(_), Some(a)) => Err(SchemaError::ArgumentOutOfRange {
            field: output.id,
            arg: a,
        }),
        (None, Some(_)) | (Some(_), None) => Err(SchemaError::ArityMismatch(output.id)),
    }
}

fn depth_of(reg: &TypeRegistry, ty: TypeId, marks: &mut [Mark]) -> Result<u16, SchemaError> {
    match marks[ty.index()] {
        Mark::Done(depth) => return Ok(depth),
        Mark::Visiting => return Err(SchemaError::InheritanceCycle(ty)),
        Mark::Unvisited => {}
    }
    marks[ty.index()] = Mark::Visiting;
    let mut depth = 0u16;
    for &parent in &reg.types[ty.index()].parents {
        depth = depth.max(depth_of(reg, parent, marks)?.saturating_add(1));
    }
    marks[ty.index()] = Mark::Done(depth);
    Ok(depth)
}

fn ancestors_of(reg: &TypeRegistry, ty: TypeId) -> Vec<TypeId> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![ty];
    while let Some(next) = stack.pop() {
        if seen.insert(next) {
            stack.extend(reg.types[next.index()].parents.iter().copied());
        }
    }
    seen.into_iter().collect()
}

fn validate_overrides(reg: &TypeRegistry, ancestors: &[Vec<TypeId>]) -> Result<(), SchemaError> {
    for def in &reg.defs {
        let Some(parent_id) = def.parent else {
            continue;
        };
        let parent = reg
            .field_def(parent_id)
            .ok_or(SchemaError::UnknownField(parent_id))?;
        let strict_ancestor = parent.owner != def.owner
            && ancestors[def.owner.index()]
                .binary_search(&parent.owner)
                .is_ok();
        if !strict_ancestor {
            return Err(SchemaError::InvalidOverride {
                field: def.id,
                parent: parent_id,
            });
        }
        if def.combinator.arity() != parent.combinator.arity() {
            return Err(SchemaError::ArityMismatch(def.id));
        }
    }
    Ok(())
}

fn flatten_one(
    reg: &TypeRegistry,
    index: &LinkIndex,
    ty: TypeId,
    depths: &[u16],
    ancestors: &[Vec<TypeId>],
    flattened: &[Option<FlattenedType>],
) -> Result<FlattenedType, SchemaError> {
    let own_ancestors = &ancestors[ty.index()];
    let in_set: Vec<bool> = reg
        .defs
        .iter()
        .map(|d| own_ancestors.binary_search(&d.owner).is_ok())
        .collect();

    // Each definition resolves to the deepest override present on this type;
    // ties between diamond branches go to the higher definition id.
    let mut best: Vec<Option<((u16, FieldDefId), FieldDefId)>> = vec![None; reg.defs.len()];
    for e in reg.defs.iter().filter(|d| in_set[d.id.index()]) {
        let key = (depths[e.owner.index()], e.id);
        let mut cursor = Some(e.id);
        while let Some(d) = cursor {
            let entry = &mut best[d.index()];
            let replace = match entry {
                Some((k, _)) => key > *k,
                None => true,
            };
            if replace {
                *entry = Some((key, e.id));
            }
            cursor = reg.defs[d.index()].parent;
        }
    }
    let resolved = |d: FieldDefId| best[d.index()].map_or(d, |(_, r)| r);

    // Parent tables first so inherited slots keep the primary parent's layout.
    let decl = &reg.types[ty.index()];
    let mut visit: Vec<FieldDefId> = Vec::new();
    for parent in &decl.parents {
        if let Some(table) = flattened[parent.index()].as_ref() {
            for slot in &table.slots {
                visit.extend(slot.aliases.iter().copied());
            }
        }
    }
    visit.extend(reg.defs.iter().filter(|d| d.owner == ty).map(|d| d.id));
    visit.extend(
        reg.defs
            .iter()
            .filter(|d| in_set[d.id.index()])
            .map(|d| d.id),
    );

    let mut slot_for: Vec<Option<FieldIndex>> = vec![None; reg.defs.len()];
    let mut slot_defs: Vec<FieldDefId> = Vec::new();
    for d in visit {
        if !in_set[d.index()] {
            continue;
        }
        let r = resolved(d);
        if slot_for[r.index()].is_none() {
            let idx =
                FieldIndex(u16::try_from(slot_defs.len()).map_err(|_| SchemaError::Capacity)?);
            slot_for[r.index()] = Some(idx);
            slot_defs.push(r);
        }
    }

    let slot_of: Vec<Option<FieldIndex>> = reg
        .defs
        .iter()
        .map(|d| {
            if in_set[d.id.index()] {
                slot_for[resolved(d.id).index()]
            } else {
                None
            }
        })
        .collect();

    let slots = slot_defs
        .iter()
        .map(|&r| {
            let aliases: Vec<FieldDefId> = reg
                .defs
                .iter()
                .filter(|d| in_set[d.id.index()] && resolved(d.id) == r)
                .map(|d| d.id)
                .collect();
            let mut outputs: Vec<FieldLinkId> = aliases
                .iter()
                .flat_map(|a| index.from[a.index()].iter().copied())
                .collect();
            outputs.sort_unstable();
            let mut selections: Vec<FieldLinkId> = aliases
                .iter()
                .flat_map(|a| index.select_from[a.index()].iter().copied())
                .collect();
            selections.sort_unstable();
            let selection_target = aliases.iter().any(|a| index.select_into[a.index()]);
            Slot {
                def: r,
                inputs: inherited_inputs(reg, index, r),
                aliases,
                outputs,
                selections,
                selection_target,
            }
        })
        .collect();

    Ok(FlattenedType {
        id: ty,
        name: decl.name.clone(),
        depth: depths[ty.index()],
        ancestors: own_ancestors.clone(),
        slot_of,
        slots,
    })
}

/// Input links of `def`, or of the nearest overridden ancestor that declares
/// any when `def` declares none.
fn inherited_inputs(reg: &TypeRegistry, index: &LinkIndex, def: FieldDefId) -> Vec<FieldLinkId> {
    let mut cursor = Some(def);
    while let Some(d) = cursor {
        let declared = &index.into[d.index()];
        if !declared.is_empty() {
            return declared.clone();
        }
        cursor = reg.defs[d.index()].parent;
    }
    Vec::new()
}

fn digest(defs: &[FieldDef], links: &[FieldLinkDef], types: &[FlattenedType]) -> Hash {
    fn ids<T: Copy>(h: &mut Hasher, items: &[T], f: impl Fn(T) -> u32) {
        h.update(&(items.len() as u64).to_le_bytes());
        for &item in items {
            h.update(&f(item).to_le_bytes());
        }
    }

    let mut h = Hasher::new();
    h.update(b"aika-schema:v1");

    h.update(&(defs.len() as u64).to_le_bytes());
    for def in defs {
        h.update(&def.id.0.to_le_bytes());
        h.update(&def.owner.0.to_le_bytes());
        h.update(&[def.combinator.code()]);
        if let Combinator::Threshold {
            threshold,
            comparison,
            is_final,
        } = def.combinator
        {
            h.update(&threshold.to_bits().to_le_bytes());
            h.update(&[comparison as u8, u8::from(is_final)]);
        }
        h.update(&def.tolerance.map_or(u64::MAX, f64::to_bits).to_le_bytes());
        h.update(&def.parent.map_or(u32::MAX, |p| p.0).to_le_bytes());
        h.update(&(def.name.len() as u64).to_le_bytes());
        h.update(def.name.as_bytes());
    }

    h.update(&(links.len() as u64).to_le_bytes());
    for link in links {
        h.update(&link.input.0.to_le_bytes());
        h.update(&link.output.0.to_le_bytes());
        h.update(&link.relation.0.to_le_bytes());
        h.update(&[link.arg.unwrap_or(u8::MAX), link.kind as u8]);
    }

    h.update(&(types.len() as u64).to_le_bytes());
    for table in types {
        h.update(&table.id.0.to_le_bytes());
        h.update(&(table.name.len() as u64).to_le_bytes());
        h.update(table.name.as_bytes());
        h.update(&(table.slots.len() as u64).to_le_bytes());
        for slot in &table.slots {
            h.update(&slot.def.0.to_le_bytes());
            ids(&mut h, &slot.aliases, |d| d.0);
            ids(&mut h, &slot.inputs, |l| l.0);
            ids(&mut h, &slot.outputs, |l| l.0);
            ids(&mut h, &slot.selections, |l| l.0);
        }
    }
    h.finalize().into()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::relation::RelationKind;
    use crate::ident::RelationId;

    #[test]
    fn child_inherits_parent_layout_prefix() {
        let mut reg = TypeRegistry::new();
        let base = reg.new_type("base", &[]).unwrap();
        let child = reg.new_type("child", &[base]).unwrap();
        let x = reg.input_field(base, "x").unwrap();
        let own = reg.input_field(child, "own").unwrap();
        let y = reg.input_field(base, "y").unwrap();
        let schema = reg.flatten_type_hierarchy().unwrap();

        assert_eq!(schema.slot_of(base, x), Some(FieldIndex(0)));
        assert_eq!(schema.slot_of(base, y), Some(FieldIndex(1)));
        assert_eq!(schema.slot_of(child, x), Some(FieldIndex(0)));
        assert_eq!(schema.slot_of(child, y), Some(FieldIndex(1)));
        assert_eq!(schema.slot_of(child, own), Some(FieldIndex(2)));
        assert_eq!(schema.slot_of(base, own), None);
    }

    #[test]
    fn override_reuses_slot_and_fans_out_both_levels() {
        let mut reg = TypeRegistry::new();
        let (to_out, from_in) = reg
            .new_relation("out", RelationKind::One, "in", RelationKind::One)
            .unwrap();
        let base = reg.new_type("base", &[]).unwrap();
        let child = reg.new_type("child", &[base]).unwrap();
        let out = reg.new_type("out", &[]).unwrap();
        let p = reg.input_field(base, "p").unwrap();
        let c = reg
            .field(child, "c", Combinator::Sum)
            .unwrap()
            .override_of(p)
            .id();
        let from_parent = reg
            .field(out, "from_parent", Combinator::Sum)
            .unwrap()
            .input(from_in, p)
            .id();
        let from_child = reg
            .field(out, "from_child", Combinator::Sum)
            .unwrap()
            .input(from_in, c)
            .id();
        let schema = reg.flatten_type_hierarchy().unwrap();

        let slot = schema.slot_of(child, p).unwrap();
        assert_eq!(schema.slot_of(child, c), Some(slot));
        let table = schema.slot(child, slot).unwrap();
        assert_eq!(table.def(), c);
        assert_eq!(table.aliases(), &[p, c]);
        let targets: Vec<FieldDefId> = table
            .outputs()
            .iter()
            .map(|l| schema.link(*l).unwrap().output())
            .collect();
        assert_eq!(targets, vec![from_parent, from_child]);
        assert_eq!(schema.link(table.outputs()[0]).unwrap().relation(), to_out);
    }

    #[test]
    fn cycle_is_reported() {
        let mut reg = TypeRegistry::new();
        let a = reg.new_type("a", &[]).unwrap();
        let b = reg.new_type("b", &[a]).unwrap();
        reg.add_parent(a, b).unwrap();
        assert!(matches!(
            reg.flatten_type_hierarchy(),
            Err(SchemaError::InheritanceCycle(_))
        ));
        assert!(!reg.is_sealed());
    }

    #[test]
    fn override_must_target_ancestor() {
        let mut reg = TypeRegistry::new();
        let a = reg.new_type("a", &[]).unwrap();
        let b = reg.new_type("b", &[]).unwrap();
        let fa = reg.input_field(a, "fa").unwrap();
        let fb = reg
            .field(b, "fb", Combinator::Sum)
            .unwrap()
            .override_of(fa)
            .id();
        assert_eq!(
            reg.flatten_type_hierarchy().unwrap_err(),
            SchemaError::InvalidOverride {
                field: fb,
                parent: fa
            }
        );
    }

    #[test]
    fn override_must_keep_arity() {
        let mut reg = TypeRegistry::new();
        let a = reg.new_type("a", &[]).unwrap();
        let b = reg.new_type("b", &[a]).unwrap();
        let fa = reg.input_field(a, "fa").unwrap();
        let fb = reg
            .field(b, "fb", Combinator::Mul)
            .unwrap()
            .override_of(fa)
            .id();
        assert_eq!(
            reg.flatten_type_hierarchy().unwrap_err(),
            SchemaError::ArityMismatch(fb)
        );
    }

    #[test]
    fn argument_bindings_are_checked() {
        let mut reg = TypeRegistry::new();
        let a = reg.new_type("a", &[]).unwrap();
        let x = reg.input_field(a, "x").unwrap();
        let m = reg
            .field(a, "m", Combinator::Mul)
            .unwrap()
            .input_arg(RelationId::SELF, x, 2)
            .id();
        assert_eq!(
            reg.flatten_type_hierarchy().unwrap_err(),
            SchemaError::ArgumentOutOfRange { field: m, arg: 2 }
        );

        let mut reg = TypeRegistry::new();
        let a = reg.new_type("a", &[]).unwrap();
        let x = reg.input_field(a, "x").unwrap();
        let s = reg
            .field(a, "s", Combinator::Sum)
            .unwrap()
            .input_arg(RelationId::SELF, x, 0)
            .id();
        assert_eq!(
            reg.flatten_type_hierarchy().unwrap_err(),
            SchemaError::ArityMismatch(s)
        );
    }

    #[test]
    fn override_without_inputs_inherits_parent_inputs() {
        let mut reg = TypeRegistry::new();
        let base = reg.new_type("base", &[]).unwrap();
        let child = reg.new_type("child", &[base]).unwrap();
        let x = reg.input_field(base, "x").unwrap();
        let p = reg
            .field(base, "p", Combinator::Sum)
            .unwrap()
            .input(RelationId::SELF, x)
            .id();
        let c = reg
            .field(child, "c", Combinator::Sum)
            .unwrap()
            .override_of(p)
            .id();
        let schema = reg.flatten_type_hierarchy().unwrap();
        let slot = schema.slot(child, schema.slot_of(child, c).unwrap()).unwrap();
        assert_eq!(slot.inputs().len(), 1);
        assert_eq!(schema.link(slot.inputs()[0]).unwrap().input(), x);
    }

    #[test]
    fn diamond_keeps_one_slot_per_shared_field() {
        let mut reg = TypeRegistry::new();
        let top = reg.new_type("top", &[]).unwrap();
        let left = reg.new_type("left", &[top]).unwrap();
        let right = reg.new_type("right", &[top]).unwrap();
        let bottom = reg.new_type("bottom", &[left, right]).unwrap();
        let shared = reg.input_field(top, "shared").unwrap();
        let l = reg.input_field(left, "l").unwrap();
        let r = reg.input_field(right, "r").unwrap();
        let schema = reg.flatten_type_hierarchy().unwrap();

        let table = schema.flattened(bottom).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.slot_index(shared), Some(FieldIndex(0)));
        assert_eq!(table.slot_index(l), Some(FieldIndex(1)));
        assert_eq!(table.slot_index(r), Some(FieldIndex(2)));
        assert_eq!(table.depth(), 2);
        assert!(schema.is_instance_of(bottom, top));
        assert!(!schema.is_instance_of(left, right));
    }

    #[test]
    fn selection_edges_require_max_source() {
        let mut reg = TypeRegistry::new();
        let a = reg.new_type("a", &[]).unwrap();
        let s = reg.input_field(a, "s").unwrap();
        let not_max = reg
            .field(a, "n", Combinator::Sum)
            .unwrap()
            .select_out(RelationId::SELF, s)
            .id();
        assert_eq!(
            reg.flatten_type_hierarchy().unwrap_err(),
            SchemaError::NotAMaxField(not_max)
        );
    }
}
