// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Multi-round work queue.
//!
//! Steps are ordered by [`QueueKey`]: round, phase rank, a step-specific
//! tiebreak and finally the insertion timestamp. The queue is generic over
//! its [`QueueHost`], the owner that steps mutate while they are processed;
//! a [`Document`](crate::Document) is the usual host.

mod drain;
mod key;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::trace;

use crate::telemetry::{NullSink, QueueEventSink};

pub use drain::{process, process_filtered, process_through, DrainReport};
pub use key::{Phase, QueueKey, Round, Timestamp};

/// Errors raised while draining a queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The drain exceeded its wall-clock budget. Steps processed before the
    /// check stay committed.
    #[error("queue drain timed out after {elapsed:?} ({processed} steps processed)")]
    Timeout {
        /// Time spent in the drain.
        elapsed: Duration,
        /// Steps processed before aborting.
        processed: usize,
    },
}

/// Owner of a [`Queue`], handed to every step it processes.
pub trait QueueHost: Sized {
    /// Error type steps may fail with.
    type Error: From<QueueError>;

    /// Shared access to the queue.
    fn queue(&self) -> &Queue<Self>;

    /// Exclusive access to the queue.
    fn queue_mut(&mut self) -> &mut Queue<Self>;
}

/// Unit of deferred work.
pub trait Step<H: QueueHost>: fmt::Debug {
    /// Phase the step runs in.
    fn phase(&self) -> Phase;

    /// Short name for logs and filters.
    fn name(&self) -> &'static str;

    /// Schedule one round after the current one.
    fn increment_round(&self) -> bool {
        false
    }

    /// Ordering within a round and phase; lower values run first.
    fn tiebreak(&self) -> i64 {
        0
    }

    /// Runs the step. It may enqueue further steps on `host`.
    fn process(self: Box<Self>, host: &mut H) -> Result<(), H::Error>;
}

/// Ordered step queue.
pub struct Queue<H: QueueHost> {
    steps: BTreeMap<QueueKey, Box<dyn Step<H>>>,
    next_timestamp: u64,
    current_round: u32,
    current: Option<QueueKey>,
    timeout: Option<Duration>,
    sink: Arc<dyn QueueEventSink>,
}

impl<H: QueueHost> fmt::Debug for Queue<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.steps.len())
            .field("current_round", &self.current_round)
            .field("current", &self.current)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<H: QueueHost> Default for Queue<H> {
    fn default() -> Self {
        Self {
            steps: BTreeMap::new(),
            next_timestamp: 0,
            current_round: 0,
            current: None,
            timeout: None,
            sink: Arc::new(NullSink),
        }
    }
}

impl<H: QueueHost> Queue<H> {
    /// Creates an empty queue without a timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wall-clock budget of a single drain.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Wall-clock budget of a single drain.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Replaces the event sink.
    pub fn set_sink(&mut self, sink: Arc<dyn QueueEventSink>) {
        self.sink = sink;
    }

    pub(crate) fn sink(&self) -> Arc<dyn QueueEventSink> {
        Arc::clone(&self.sink)
    }

    /// Highest concrete round processed so far.
    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// Starts the next round for steps added from now on.
    pub fn advance_round(&mut self) {
        self.current_round = self.current_round.saturating_add(1);
    }

    /// Key of the step being processed, if a drain is running one.
    pub fn current_key(&self) -> Option<QueueKey> {
        self.current
    }

    /// Number of queued steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns `true` if `key` is queued.
    pub fn contains(&self, key: &QueueKey) -> bool {
        self.steps.contains_key(key)
    }

    /// Queued keys in processing order.
    pub fn keys(&self) -> impl Iterator<Item = &QueueKey> + '_ {
        self.steps.keys()
    }

    /// Queued steps in processing order.
    pub fn entries(&self) -> impl Iterator<Item = (&QueueKey, &dyn Step<H>)> + '_ {
        self.steps.iter().map(|(k, s)| (k, s.as_ref()))
    }

    fn next_timestamp(&mut self) -> Timestamp {
        let ts = Timestamp(self.next_timestamp);
        self.next_timestamp += 1;
        ts
    }

    /// Enqueues `step` and returns its key.
    ///
    /// Non-delayed phases get the current round, delayed phases the
    /// [`Round::Delayed`] sentinel; [`Step::increment_round`] bumps either by
    /// one, which leaves `Delayed` unchanged.
    pub fn add_step(&mut self, step: Box<dyn Step<H>>) -> QueueKey {
        let phase = step.phase();
        let mut round = if phase.is_delayed() {
            Round::Delayed
        } else {
            Round::At(self.current_round)
        };
        if step.increment_round() {
            round = round.next();
        }
        let key = QueueKey {
            round,
            phase,
            tiebreak: step.tiebreak(),
            timestamp: self.next_timestamp(),
        };
        trace!(%key, step = step.name(), "step added");
        self.sink.on_added(&key, step.name());
        self.steps.insert(key, step);
        key
    }

    /// Removes a queued step.
    pub fn remove_step(&mut self, key: &QueueKey) -> Option<Box<dyn Step<H>>> {
        self.steps.remove(key)
    }

    /// Moves a queued step to a new tiebreak, keeping its round and stamp.
    pub fn rekey(&mut self, key: &QueueKey, tiebreak: i64) -> Option<QueueKey> {
        let step = self.steps.remove(key)?;
        let moved = QueueKey { tiebreak, ..*key };
        self.steps.insert(moved, step);
        Some(moved)
    }

    pub(crate) fn first_key(&self) -> Option<QueueKey> {
        self.steps.first_key_value().map(|(k, _)| *k)
    }

    pub(crate) fn pop_first(&mut self) -> Option<(QueueKey, Box<dyn Step<H>>)> {
        self.steps.pop_first()
    }

    pub(crate) fn begin(&mut self, key: QueueKey) {
        if let Round::At(r) = key.round {
            self.current_round = self.current_round.max(r);
        }
        self.current = Some(key);
    }

    pub(crate) fn finish(&mut self, deferred: Vec<(QueueKey, Box<dyn Step<H>>)>) {
        self.current = None;
        self.steps.extend(deferred);
    }
}
