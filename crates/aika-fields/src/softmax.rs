// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Softmax as a composition of exp, sum and div fields.

use crate::function::Combinator;
use crate::ident::{FieldDefId, RelationId, TypeId};
use crate::schema::{SchemaError, TypeRegistry};

/// Where the softmax parts live and how they reach each other.
///
/// Every relation is navigated from the object that owns the consuming
/// field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftmaxLayout {
    /// Type carrying one exp field per candidate.
    pub input_type: TypeId,
    /// Type carrying the shared normalizer.
    pub norm_type: TypeId,
    /// Type carrying one normalized output per candidate.
    pub output_type: TypeId,
    /// From the normalizer object to every candidate input object.
    pub norm_inputs: RelationId,
    /// From an output object to its candidate input object.
    pub output_input: RelationId,
    /// From an output object to the normalizer object.
    pub output_norm: RelationId,
}

/// The three field definitions making up a softmax.
///
/// `outputs = exp(x) / Σ exp(x)`; the caller feeds `x` into argument 0 of
/// [`inputs`](Self::inputs).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftmaxFields {
    inputs: FieldDefId,
    norm: FieldDefId,
    outputs: FieldDefId,
}

impl SoftmaxFields {
    /// Declares the exp, norm and div fields named after `name`.
    pub fn declare(
        reg: &mut TypeRegistry,
        layout: SoftmaxLayout,
        name: &str,
    ) -> Result<Self, SchemaError> {
        let inputs = reg
            .field(layout.input_type, &format!("{name}-inputs"), Combinator::Exp)?
            .id();
        let norm = reg
            .field(layout.norm_type, &format!("{name}-norm"), Combinator::Sum)?
            .input(layout.norm_inputs, inputs)
            .id();
        let outputs = reg
            .field(layout.output_type, &format!("{name}-outputs"), Combinator::Div)?
            .input_arg(layout.output_input, inputs, 0)
            .input_arg(layout.output_norm, norm, 1)
            .id();
        Ok(Self {
            inputs,
            norm,
            outputs,
        })
    }

    /// Exp field on each candidate.
    pub fn inputs(&self) -> FieldDefId {
        self.inputs
    }

    /// Sum of all exp fields.
    pub fn norm(&self) -> FieldDefId {
        self.norm
    }

    /// Normalized value per candidate.
    pub fn outputs(&self) -> FieldDefId {
        self.outputs
    }
}
