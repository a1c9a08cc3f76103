// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scratch queue host and recording steps.

use std::time::Duration;

use aika_fields::{Phase, Queue, QueueError, QueueHost, Step};

/// Minimal [`QueueHost`] that records the label of every processed step.
#[derive(Debug, Default)]
pub struct ScratchHost {
    /// Queue under test.
    pub queue: Queue<ScratchHost>,
    /// Labels in processing order.
    pub log: Vec<&'static str>,
}

impl ScratchHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a recording step.
    pub fn push(&mut self, step: RecordingStep) {
        self.queue.add_step(Box::new(step));
    }
}

impl QueueHost for ScratchHost {
    type Error = QueueError;

    fn queue(&self) -> &Queue<Self> {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut Queue<Self> {
        &mut self.queue
    }
}

/// Step that logs its label and optionally enqueues follow-ups.
///
/// # Example
///
/// ```
/// use aika_dry_tests::{RecordingStep, ScratchHost};
/// use aika_fields::{queue, Phase};
///
/// const WORK: Phase = Phase::new("work", 0);
/// let mut host = ScratchHost::new();
/// host.push(RecordingStep::new("a", WORK).then(RecordingStep::new("b", WORK)));
/// queue::process(&mut host).unwrap();
/// assert_eq!(host.log, ["a", "b"]);
/// ```
#[derive(Clone, Debug)]
pub struct RecordingStep {
    label: &'static str,
    phase: Phase,
    next_round: bool,
    tiebreak: i64,
    sleep: Option<Duration>,
    then: Vec<RecordingStep>,
}

impl RecordingStep {
    /// Creates a step in `phase` of the current round.
    pub fn new(label: &'static str, phase: Phase) -> Self {
        Self {
            label,
            phase,
            next_round: false,
            tiebreak: 0,
            sleep: None,
            then: Vec::new(),
        }
    }

    /// Schedules the step one round later.
    pub fn next_round(mut self) -> Self {
        self.next_round = true;
        self
    }

    /// Sets the tiebreak.
    pub fn tiebreak(mut self, tiebreak: i64) -> Self {
        self.tiebreak = tiebreak;
        self
    }

    /// Blocks for `dur` while processing.
    pub fn sleeping(mut self, dur: Duration) -> Self {
        self.sleep = Some(dur);
        self
    }

    /// Enqueues `step` when this one is processed.
    pub fn then(mut self, step: Self) -> Self {
        self.then.push(step);
        self
    }

    /// Label recorded on processing.
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Step<ScratchHost> for RecordingStep {
    fn phase(&self) -> Phase {
        self.phase
    }

    fn name(&self) -> &'static str {
        self.label
    }

    fn increment_round(&self) -> bool {
        self.next_round
    }

    fn tiebreak(&self) -> i64 {
        self.tiebreak
    }

    fn process(self: Box<Self>, host: &mut ScratchHost) -> Result<(), QueueError> {
        host.log.push(self.label);
        if let Some(dur) = self.sleep {
            std::thread::sleep(dur);
        }
        for step in self.then {
            host.queue.add_step(Box::new(step));
        }
        Ok(())
    }
}
