// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Argmax selection for max fields.
//!
//! A max field tracks every input that has delivered to it and holds the
//! value of the largest one. Its selection links forward only the current
//! winner's value. When the winner changes, the old winner's contribution is
//! retracted before the new winner's is adopted, so a downstream consumer
//! never sees two selected inputs at once.

use std::sync::Arc;

use tracing::debug;

use crate::document::{Document, DocumentError};
use crate::field::FieldInputs;
use crate::ident::{FieldDefId, FieldLinkId, FieldRef, ObjId};
use crate::telemetry::SelectionEvent;

/// One candidate of a max field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaxInput {
    /// Field that delivered the value.
    pub source: FieldRef,
    /// Link it arrived over.
    pub link: FieldLinkId,
    /// Current value of the candidate.
    pub value: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum Selection {
    #[default]
    NoWinner,
    Winner {
        input: usize,
        forwarded: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Retract {
    pub(crate) input: FieldRef,
    pub(crate) forwarded: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SelectionChange {
    Unchanged,
    Moved {
        input: FieldRef,
        delta: f64,
    },
    Switched {
        retract: Option<Retract>,
        adopt: MaxInput,
    },
}

/// Candidates in first-seen order plus the current winner.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MaxState {
    inputs: Vec<MaxInput>,
    selection: Selection,
}

impl MaxState {
    fn position(&self, source: FieldRef, link: FieldLinkId) -> Option<usize> {
        self.inputs
            .iter()
            .position(|c| c.source == source && c.link == link)
    }

    /// Adds `delta` to a candidate, registering it on first delivery.
    pub(crate) fn record(&mut self, source: FieldRef, link: FieldLinkId, delta: f64) {
        match self.position(source, link) {
            Some(i) => self.inputs[i].value += delta,
            None => self.inputs.push(MaxInput {
                source,
                link,
                value: delta,
            }),
        }
    }

    /// Overwrites a candidate's value.
    pub(crate) fn set_input(&mut self, source: FieldRef, link: FieldLinkId, value: f64) {
        match self.position(source, link) {
            Some(i) => self.inputs[i].value = value,
            None => self.inputs.push(MaxInput {
                source,
                link,
                value,
            }),
        }
    }

    pub(crate) fn inputs(&self) -> &[MaxInput] {
        &self.inputs
    }

    /// Index of the largest candidate; the earliest one wins among equals.
    pub(crate) fn argmax(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, c) in self.inputs.iter().enumerate() {
            if best.is_none_or(|b| c.value > self.inputs[b].value) {
                best = Some(i);
            }
        }
        best
    }

    pub(crate) fn best_value(&self) -> Option<f64> {
        self.argmax().map(|i| self.inputs[i].value)
    }

    pub(crate) fn winner(&self) -> Option<MaxInput> {
        match self.selection {
            Selection::Winner { input, .. } => self.inputs.get(input).copied(),
            Selection::NoWinner => None,
        }
    }

    /// Moves the selection to the current argmax and reports what the
    /// selection links must forward.
    pub(crate) fn settle(&mut self) -> SelectionChange {
        let Some(best) = self.argmax() else {
            return SelectionChange::Unchanged;
        };
        let adopt = self.inputs[best];
        let previous = self.selection;
        self.selection = Selection::Winner {
            input: best,
            forwarded: adopt.value,
        };
        match previous {
            Selection::Winner { input, forwarded } if input == best => {
                let delta = adopt.value - forwarded;
                if delta == 0.0 {
                    SelectionChange::Unchanged
                } else {
                    SelectionChange::Moved {
                        input: adopt.source,
                        delta,
                    }
                }
            }
            Selection::Winner { input, forwarded } => SelectionChange::Switched {
                retract: Some(Retract {
                    input: self.inputs[input].source,
                    forwarded,
                }),
                adopt,
            },
            Selection::NoWinner => SelectionChange::Switched {
                retract: None,
                adopt,
            },
        }
    }
}

impl Document {
    /// Candidates of a max field in first-seen order; empty for a field that
    /// was never created or is not a max field.
    pub fn max_inputs(&self, obj: ObjId, def: FieldDefId) -> Result<Vec<MaxInput>, DocumentError> {
        Ok(self.field(obj, def)?.map_or_else(Vec::new, |f| match &f.inputs {
            FieldInputs::Max(state) => state.inputs().to_vec(),
            _ => Vec::new(),
        }))
    }

    /// Re-evaluates a max field after one of its inputs changed.
    pub(crate) fn refresh_max(&mut self, dst: FieldRef) -> Result<(), DocumentError> {
        let (queued, best, value) = {
            let field = self
                .field_at(dst)
                .ok_or(DocumentError::UnknownSlot(dst))?;
            let FieldInputs::Max(state) = &field.inputs else {
                return Ok(());
            };
            (field.is_queued(), state.best_value(), field.value())
        };
        if queued {
            // The step re-reads the argmax when it runs, so the pending
            // delta only needs to track the latest best value.
            let delta = best.map_or(0.0, |b| b - value);
            return self.intercept(dst, delta, true);
        }
        self.settle_selection(dst)
    }

    /// Switches the winner if needed, then moves the field to the best value.
    pub(crate) fn settle_selection(&mut self, dst: FieldRef) -> Result<(), DocumentError> {
        let (change, best) = {
            let field = self
                .field_at_mut(dst)
                .ok_or(DocumentError::UnknownSlot(dst))?;
            if field.is_propagating() {
                return Err(DocumentError::Reentrancy(dst));
            }
            let FieldInputs::Max(state) = &mut field.inputs else {
                return Ok(());
            };
            (state.settle(), state.best_value())
        };
        self.update_selection(dst, change)?;
        let Some(best) = best else {
            return Ok(());
        };
        let value = self
            .field_at(dst)
            .ok_or(DocumentError::UnknownSlot(dst))?
            .value();
        self.trigger_checked(dst, best - value)
    }

    fn update_selection(
        &mut self,
        dst: FieldRef,
        change: SelectionChange,
    ) -> Result<(), DocumentError> {
        match change {
            SelectionChange::Unchanged => Ok(()),
            SelectionChange::Moved { input, delta } => self.forward_selection(dst, input, delta),
            SelectionChange::Switched { retract, adopt } => {
                let observer = Arc::clone(&self.observer);
                if let Some(old) = retract {
                    debug!(field = ?dst, input = ?old.input, "selection: disconnect");
                    self.forward_selection(dst, old.input, -old.forwarded)?;
                    observer.on_selection(dst, SelectionEvent::Disconnect { input: old.input });
                }
                debug!(field = ?dst, input = ?adopt.source, "selection: connect");
                self.forward_selection(dst, adopt.source, adopt.value)?;
                observer.on_selection(dst, SelectionEvent::Connect {
                    input: adopt.source,
                });
                Ok(())
            }
        }
    }

    /// Pushes `delta` along the max field's selection links, navigating
    /// from the winning input's object.
    fn forward_selection(
        &mut self,
        dst: FieldRef,
        winner: FieldRef,
        delta: f64,
    ) -> Result<(), DocumentError> {
        if delta == 0.0 {
            return Ok(());
        }
        let schema = Arc::clone(&self.schema);
        let ty = self.obj_type(dst.obj)?;
        let slot = schema
            .slot(ty, dst.slot)
            .ok_or(DocumentError::UnknownSlot(dst))?;
        for link in slot.selections().iter().filter_map(|&id| schema.link(id)) {
            self.push_along(&schema, link, winner.obj, dst, delta)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::ident::FieldIndex;

    fn src(n: u32) -> FieldRef {
        FieldRef::new(ObjId(n), FieldIndex(0))
    }

    #[test]
    fn first_seen_wins_ties() {
        let mut state = MaxState::default();
        state.record(src(0), FieldLinkId(0), 2.0);
        state.record(src(1), FieldLinkId(0), 2.0);
        assert_eq!(state.argmax(), Some(0));
    }

    #[test]
    fn earlier_input_takes_over_on_tie() {
        let mut state = MaxState::default();
        state.record(src(0), FieldLinkId(0), 1.0);
        state.record(src(1), FieldLinkId(0), 3.0);
        assert!(matches!(state.settle(), SelectionChange::Switched { retract: None, .. }));
        state.record(src(0), FieldLinkId(0), 2.0);
        assert_eq!(state.argmax(), Some(0));
        assert!(matches!(
            state.settle(),
            SelectionChange::Switched {
                retract: Some(Retract { forwarded, .. }),
                adopt: MaxInput { value, .. },
            } if forwarded == 3.0 && value == 3.0
        ));
    }

    #[test]
    fn switch_retracts_previous_winner() {
        let mut state = MaxState::default();
        state.record(src(0), FieldLinkId(0), 1.0);
        state.settle();
        state.record(src(1), FieldLinkId(0), 4.0);
        assert_eq!(
            state.settle(),
            SelectionChange::Switched {
                retract: Some(Retract {
                    input: src(0),
                    forwarded: 1.0
                }),
                adopt: MaxInput {
                    source: src(1),
                    link: FieldLinkId(0),
                    value: 4.0
                },
            }
        );
        state.record(src(1), FieldLinkId(0), 1.0);
        assert_eq!(
            state.settle(),
            SelectionChange::Moved {
                input: src(1),
                delta: 1.0
            }
        );
        assert_eq!(state.inputs().len(), 2);
    }
}
