// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field cells and their two-phase value model.

use crate::function::Combinator;
use crate::ident::{FieldDefId, FieldRef};
use crate::interceptor::QueueInterceptor;
use crate::schema::FieldDef;
use crate::selection::MaxState;

/// Value state of a field.
///
/// A field is `Settled` except while it walks its output links; the pending
/// value is only observable in the `Propagating` state, and any update that
/// arrives then is rejected as reentrant.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum FieldState {
    /// Committed value; ready for updates.
    Settled(f64),
    /// Mid-propagation.
    Propagating {
        /// Committed value before this update.
        value: f64,
        /// Value being propagated; committed when the walk finishes.
        updated: f64,
    },
}

impl FieldState {
    /// Committed value.
    pub fn value(&self) -> f64 {
        match *self {
            Self::Settled(v) | Self::Propagating { value: v, .. } => v,
        }
    }

    /// Pending value while propagating, else the committed value.
    pub fn updated_value(&self) -> f64 {
        match *self {
            Self::Settled(v) | Self::Propagating { updated: v, .. } => v,
        }
    }
}

/// Per-combinator bookkeeping of what has arrived on a field's inputs.
#[derive(Clone, Debug)]
pub(crate) enum FieldInputs {
    /// Deltas forwarded as they are.
    Accumulate,
    /// Current value of each argument position.
    Args(Vec<f64>),
    /// Competitive selection state.
    Max(MaxState),
}

impl FieldInputs {
    fn for_combinator(combinator: Combinator) -> Self {
        match combinator {
            Combinator::Sum => Self::Accumulate,
            Combinator::Max => Self::Max(MaxState::default()),
            other => Self::Args(vec![0.0; other.arity().unwrap_or(1)]),
        }
    }
}

/// A value cell on an object.
#[derive(Clone, Debug)]
pub struct Field {
    pub(crate) def: FieldDefId,
    pub(crate) state: FieldState,
    pub(crate) inputs: FieldInputs,
    pub(crate) interceptor: Option<QueueInterceptor>,
}

impl Field {
    pub(crate) fn new(def: &FieldDef) -> Self {
        Self {
            def: def.id(),
            state: FieldState::Settled(0.0),
            inputs: FieldInputs::for_combinator(def.combinator()),
            interceptor: def
                .queued()
                .map(|spec| QueueInterceptor::new(spec.phase, spec.next_round)),
        }
    }

    /// Definition this cell was created from.
    pub fn def(&self) -> FieldDefId {
        self.def
    }

    /// Current state.
    pub fn state(&self) -> FieldState {
        self.state
    }

    /// Committed value.
    pub fn value(&self) -> f64 {
        self.state.value()
    }

    /// Pending value while propagating, else the committed value.
    pub fn updated_value(&self) -> f64 {
        self.state.updated_value()
    }

    /// Returns `true` while the field walks its output links.
    pub fn is_propagating(&self) -> bool {
        matches!(self.state, FieldState::Propagating { .. })
    }

    /// Returns `true` if updates are routed through a queue step.
    pub fn is_queued(&self) -> bool {
        self.interceptor.is_some()
    }

    /// Delta waiting in the interceptor, if any.
    pub fn pending_delta(&self) -> Option<f64> {
        self.interceptor.as_ref().and_then(QueueInterceptor::pending_delta)
    }

    /// Committed value plus any delta still waiting in the interceptor.
    pub(crate) fn projected(&self) -> f64 {
        self.value() + self.pending_delta().unwrap_or(0.0)
    }

    /// Enters the propagating state with `updated` as the pending value.
    pub(crate) fn begin(&mut self, at: FieldRef, updated: f64) -> Result<f64, FieldRef> {
        match self.state {
            FieldState::Settled(value) => {
                self.state = FieldState::Propagating { value, updated };
                Ok(value)
            }
            FieldState::Propagating { .. } => Err(at),
        }
    }

    /// Commits the pending value.
    pub(crate) fn commit(&mut self) {
        self.state = FieldState::Settled(self.state.updated_value());
    }

    /// Overwrites the committed value without propagating.
    pub(crate) fn restore(&mut self, value: f64) {
        self.state = FieldState::Settled(value);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]
    use super::*;
    use crate::ident::{FieldIndex, ObjId, TypeId};

    fn def(combinator: Combinator) -> FieldDef {
        FieldDef {
            id: FieldDefId(0),
            owner: TypeId(0),
            name: "f".to_owned(),
            combinator,
            tolerance: None,
            parent: None,
            queued: None,
        }
    }

    #[test]
    fn two_phase_views() {
        let at = FieldRef::new(ObjId(0), FieldIndex(0));
        let mut field = Field::new(&def(Combinator::Sum));
        assert_eq!(field.begin(at, 4.0).unwrap(), 0.0);
        assert_eq!(field.value(), 0.0);
        assert_eq!(field.updated_value(), 4.0);
        assert_eq!(field.begin(at, 9.0), Err(at));
        field.commit();
        assert_eq!(field.state(), FieldState::Settled(4.0));
    }

    #[test]
    fn inputs_follow_arity() {
        assert!(matches!(
            Field::new(&def(Combinator::Div)).inputs,
            FieldInputs::Args(ref a) if a.len() == 2
        ));
        assert!(matches!(
            Field::new(&def(Combinator::Max)).inputs,
            FieldInputs::Max(_)
        ));
        assert!(matches!(
            Field::new(&def(Combinator::Sum)).inputs,
            FieldInputs::Accumulate
        ));
    }
}
