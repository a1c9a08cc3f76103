// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coalescing of synchronous field updates into deferred queue steps.
//!
//! A queued field owns a [`QueueInterceptor`]. Updates it receives are added
//! to one pending delta; the first non-zero delta schedules a single
//! [`FieldUpdate`] step, later ones merge into it. Processing the step
//! applies the merged delta once through the ordinary trigger path.

use crate::document::{Document, DocumentError};
use crate::field::FieldInputs;
use crate::ident::FieldRef;
use crate::queue::{Phase, QueueKey, Step};

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PendingUpdate {
    pub(crate) delta: f64,
    pub(crate) key: Option<QueueKey>,
}

/// Buffers a field's updates until its queue step runs.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueInterceptor {
    phase: Phase,
    next_round: bool,
    pending: Option<PendingUpdate>,
}

impl QueueInterceptor {
    pub(crate) fn new(phase: Phase, next_round: bool) -> Self {
        Self {
            phase,
            next_round,
            pending: None,
        }
    }

    /// Phase the update step runs in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the step is scheduled for the following round.
    pub fn next_round(&self) -> bool {
        self.next_round
    }

    /// Merged delta not yet applied.
    pub fn pending_delta(&self) -> Option<f64> {
        self.pending.map(|p| p.delta)
    }

    /// Key of the scheduled step, if one is queued.
    pub fn pending_key(&self) -> Option<QueueKey> {
        self.pending.and_then(|p| p.key)
    }

    pub(crate) fn reconfigure(&mut self, phase: Phase, next_round: bool) {
        self.phase = phase;
        self.next_round = next_round;
    }
}

/// Larger pending magnitudes run first within a round and phase.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn sort_tiebreak(delta: f64) -> i64 {
    -((delta.abs() * 1000.0).round() as i64)
}

/// Queue step applying a field's merged update.
#[derive(Debug)]
pub struct FieldUpdate {
    target: FieldRef,
    phase: Phase,
    next_round: bool,
    tiebreak: i64,
}

impl FieldUpdate {
    /// Step name reported to filters and sinks.
    pub const NAME: &'static str = "field-update";

    /// Field the step updates.
    pub fn target(&self) -> FieldRef {
        self.target
    }
}

impl Step<Document> for FieldUpdate {
    fn phase(&self) -> Phase {
        self.phase
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn increment_round(&self) -> bool {
        self.next_round
    }

    fn tiebreak(&self) -> i64 {
        self.tiebreak
    }

    fn process(self: Box<Self>, doc: &mut Document) -> Result<(), DocumentError> {
        doc.apply_pending(self.target)
    }
}

enum Coalesced {
    Direct,
    Merged,
    Rekey(QueueKey, i64),
    Schedule(FieldUpdate),
}

impl Document {
    /// Adds `delta` to the field's pending update, or replaces the pending
    /// update when `replace` is set, and schedules a step if none is queued.
    pub(crate) fn intercept(
        &mut self,
        target: FieldRef,
        delta: f64,
        replace: bool,
    ) -> Result<(), DocumentError> {
        let outcome = {
            let field = self
                .field_at_mut(target)
                .ok_or(DocumentError::UnknownSlot(target))?;
            match field.interceptor.as_mut() {
                None => Coalesced::Direct,
                Some(icpt) => {
                    let pending = icpt.pending.get_or_insert(PendingUpdate {
                        delta: 0.0,
                        key: None,
                    });
                    if replace {
                        pending.delta = 0.0;
                    }
                    pending.delta += delta;
                    let tiebreak = sort_tiebreak(pending.delta);
                    match pending.key {
                        Some(key) if key.tiebreak() != tiebreak => Coalesced::Rekey(key, tiebreak),
                        Some(_) => Coalesced::Merged,
                        None if delta != 0.0 || replace => Coalesced::Schedule(FieldUpdate {
                            target,
                            phase: icpt.phase,
                            next_round: icpt.next_round,
                            tiebreak,
                        }),
                        None => Coalesced::Merged,
                    }
                }
            }
        };

        match outcome {
            Coalesced::Direct => self.trigger_update(target, delta),
            Coalesced::Merged => Ok(()),
            Coalesced::Rekey(key, tiebreak) => {
                // A step popped by a running filtered drain cannot move; it
                // keeps its key and still applies the merged delta.
                if let Some(moved) = self.queue.rekey(&key, tiebreak) {
                    self.set_pending_key(target, moved);
                }
                Ok(())
            }
            Coalesced::Schedule(step) => {
                if !self.config.deferred_updates {
                    return self.apply_pending(target);
                }
                let key = self.queue.add_step(Box::new(step));
                self.set_pending_key(target, key);
                Ok(())
            }
        }
    }

    fn set_pending_key(&mut self, target: FieldRef, key: QueueKey) {
        if let Some(pending) = self
            .field_at_mut(target)
            .and_then(|f| f.interceptor.as_mut())
            .and_then(|i| i.pending.as_mut())
        {
            pending.key = Some(key);
        }
    }

    /// Applies and clears the field's merged update.
    pub(crate) fn apply_pending(&mut self, target: FieldRef) -> Result<(), DocumentError> {
        let (delta, is_max) = {
            let field = self
                .field_at_mut(target)
                .ok_or(DocumentError::UnknownSlot(target))?;
            let delta = field
                .interceptor
                .as_mut()
                .and_then(|i| i.pending.take())
                .map_or(0.0, |p| p.delta);
            (delta, matches!(field.inputs, FieldInputs::Max(_)))
        };
        if is_max {
            return self.settle_selection(target);
        }
        self.trigger_checked(target, delta)
    }
}
