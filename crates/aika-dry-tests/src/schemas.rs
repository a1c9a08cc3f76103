// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Prebuilt type registries for common field topologies.
//!
//! Every builder returns a flattened registry together with the ids tests
//! need to instantiate objects and address fields.

use aika_fields::{
    Combinator, Document, FieldDefId, Phase, RelationId, RelationKind, SoftmaxFields,
    SoftmaxLayout, TypeId, TypeRegistry,
};

/// `a -> b -> c` on one type, all sums over the self relation.
#[derive(Debug)]
pub struct SumChain {
    /// Flattened registry.
    pub registry: TypeRegistry,
    /// The only type.
    pub node: TypeId,
    /// Input field.
    pub a: FieldDefId,
    /// Sum of `a`.
    pub b: FieldDefId,
    /// Sum of `b`.
    pub c: FieldDefId,
}

impl SumChain {
    /// Document over the fixture with default config.
    #[allow(clippy::expect_used)]
    pub fn document(&self) -> Document {
        Document::new(&self.registry).expect("fixture registry is flattened")
    }
}

/// Builds a [`SumChain`].
#[allow(clippy::expect_used)]
pub fn build_sum_chain() -> SumChain {
    let mut registry = TypeRegistry::new();
    let me = registry.self_relation();
    let node = registry.new_type("node", &[]).expect("declare node");
    let a = registry.input_field(node, "a").expect("declare a");
    let b = registry
        .field(node, "b", Combinator::Sum)
        .expect("declare b")
        .input(me, a)
        .id();
    let c = registry
        .field(node, "c", Combinator::Sum)
        .expect("declare c")
        .input(me, b)
        .id();
    registry.flatten_type_hierarchy().expect("flatten sum chain");
    SumChain {
        registry,
        node,
        a,
        b,
        c,
    }
}

/// Many `src` objects feeding one sum on a `dst` object.
#[derive(Debug)]
pub struct FanIn {
    /// Flattened registry.
    pub registry: TypeRegistry,
    /// Supplying type.
    pub src: TypeId,
    /// Consuming type.
    pub dst: TypeId,
    /// From a `dst` object to its sources.
    pub inputs: RelationId,
    /// From a `src` object to its consumers.
    pub outputs: RelationId,
    /// Input field on `src`.
    pub x: FieldDefId,
    /// Sum over every related `x`.
    pub sum: FieldDefId,
}

impl FanIn {
    /// Document over the fixture with default config.
    #[allow(clippy::expect_used)]
    pub fn document(&self) -> Document {
        Document::new(&self.registry).expect("fixture registry is flattened")
    }
}

/// Builds a [`FanIn`]; `tolerance` applies to the sum.
#[allow(clippy::expect_used)]
pub fn build_fan_in(tolerance: Option<f64>) -> FanIn {
    let mut registry = TypeRegistry::new();
    let (inputs, outputs) = registry
        .new_relation("inputs", RelationKind::Many, "outputs", RelationKind::Many)
        .expect("declare relations");
    let src = registry.new_type("src", &[]).expect("declare src");
    let dst = registry.new_type("dst", &[]).expect("declare dst");
    let x = registry.input_field(src, "x").expect("declare x");
    let mut sum = registry
        .field(dst, "sum", Combinator::Sum)
        .expect("declare sum")
        .input(inputs, x);
    if let Some(t) = tolerance {
        sum = sum.tolerance(t);
    }
    let sum = sum.id();
    registry.flatten_type_hierarchy().expect("flatten fan-in");
    FanIn {
        registry,
        src,
        dst,
        inputs,
        outputs,
        x,
        sum,
    }
}

/// Candidates competing for one max field; the winner's `selected` field
/// carries the best score.
#[derive(Debug)]
pub struct MaxChoice {
    /// Flattened registry.
    pub registry: TypeRegistry,
    /// Candidate type.
    pub candidate: TypeId,
    /// Type owning the max field.
    pub choice: TypeId,
    /// From a choice object to its candidates.
    pub candidates: RelationId,
    /// Score input on each candidate.
    pub score: FieldDefId,
    /// Selection target on each candidate.
    pub selected: FieldDefId,
    /// Max over every related score.
    pub best: FieldDefId,
}

impl MaxChoice {
    /// Document over the fixture with default config.
    #[allow(clippy::expect_used)]
    pub fn document(&self) -> Document {
        Document::new(&self.registry).expect("fixture registry is flattened")
    }
}

/// Builds a [`MaxChoice`]; `queued` routes the max field through a step.
#[allow(clippy::expect_used)]
pub fn build_max_choice(queued: Option<Phase>) -> MaxChoice {
    let mut registry = TypeRegistry::new();
    let me = registry.self_relation();
    let (candidates, _choice_of) = registry
        .new_relation("candidates", RelationKind::Many, "choice", RelationKind::One)
        .expect("declare relations");
    let candidate = registry.new_type("candidate", &[]).expect("declare candidate");
    let choice = registry.new_type("choice", &[]).expect("declare choice");
    let score = registry.input_field(candidate, "score").expect("declare score");
    let selected = registry
        .field(candidate, "selected", Combinator::Sum)
        .expect("declare selected")
        .id();
    let mut best = registry
        .field(choice, "best", Combinator::Max)
        .expect("declare best")
        .input(candidates, score)
        .select_out(me, selected);
    if let Some(phase) = queued {
        best = best.queued(phase, false);
    }
    let best = best.id();
    registry.flatten_type_hierarchy().expect("flatten max choice");
    MaxChoice {
        registry,
        candidate,
        choice,
        candidates,
        score,
        selected,
        best,
    }
}

/// Softmax over token objects normalized by one norm object.
#[derive(Debug)]
pub struct Softmax {
    /// Flattened registry.
    pub registry: TypeRegistry,
    /// Types and relations of the softmax parts.
    pub layout: SoftmaxLayout,
    /// The declared fields.
    pub fields: SoftmaxFields,
    /// Raw input on each token, fed into the exp field.
    pub x: FieldDefId,
}

impl Softmax {
    /// Document over the fixture with default config.
    #[allow(clippy::expect_used)]
    pub fn document(&self) -> Document {
        Document::new(&self.registry).expect("fixture registry is flattened")
    }
}

/// Builds a [`Softmax`].
#[allow(clippy::expect_used)]
pub fn build_softmax() -> Softmax {
    let mut registry = TypeRegistry::new();
    let me = registry.self_relation();
    let (norm_inputs, _) = registry
        .new_relation("members", RelationKind::Many, "norm", RelationKind::One)
        .expect("declare members");
    let (output_input, _) = registry
        .new_relation("input", RelationKind::One, "output", RelationKind::One)
        .expect("declare input");
    let (output_norm, _) = registry
        .new_relation("normalizer", RelationKind::One, "outputs", RelationKind::Many)
        .expect("declare normalizer");
    let layout = SoftmaxLayout {
        input_type: registry.new_type("token", &[]).expect("declare token"),
        norm_type: registry.new_type("norm", &[]).expect("declare norm"),
        output_type: registry.new_type("out", &[]).expect("declare out"),
        norm_inputs,
        output_input,
        output_norm,
    };
    let x = registry.input_field(layout.input_type, "x").expect("declare x");
    let fields = SoftmaxFields::declare(&mut registry, layout, "softmax").expect("declare softmax");
    registry
        .builder(fields.inputs())
        .expect("softmax inputs")
        .input_arg(me, x, 0);
    registry.flatten_type_hierarchy().expect("flatten softmax");
    Softmax {
        registry,
        layout,
        fields,
        x,
    }
}
