// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Queue ordering keys.

use std::cmp::Ordering;
use std::fmt;

/// Ordered category of work within a round.
///
/// Phases compare by `rank`; the name is for logs only. A delayed phase pins
/// its steps to [`Round::Delayed`], after every concrete round.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Phase {
    name: &'static str,
    rank: u16,
    delayed: bool,
}

impl Phase {
    /// A phase processed within the current round.
    pub const fn new(name: &'static str, rank: u16) -> Self {
        Self {
            name,
            rank,
            delayed: false,
        }
    }

    /// A phase whose steps run only after all concrete rounds drained.
    pub const fn delayed(name: &'static str, rank: u16) -> Self {
        Self {
            name,
            rank,
            delayed: true,
        }
    }

    /// Display name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Sort rank within a round.
    pub const fn rank(&self) -> u16 {
        self.rank
    }

    /// Returns `true` for delayed phases.
    pub const fn is_delayed(&self) -> bool {
        self.delayed
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.rank)
    }
}

/// Logical sweep index a step belongs to.
///
/// `Delayed` sorts after every concrete round.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Round {
    /// A concrete round.
    At(u32),
    /// Reserved sentinel for delayed phases.
    Delayed,
}

impl Round {
    /// The following round. `Delayed` stays `Delayed`.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::At(r) => Self::At(r.saturating_add(1)),
            Self::Delayed => Self::Delayed,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(r) => write!(f, "{r}"),
            Self::Delayed => f.write_str("MAX"),
        }
    }
}

/// Monotonic insertion stamp assigned by the queue.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Timestamp(pub u64);

/// Total-order key of a queued step: round, phase rank, step tiebreak, then
/// timestamp.
#[derive(Clone, Copy, Debug)]
pub struct QueueKey {
    pub(crate) round: Round,
    pub(crate) phase: Phase,
    pub(crate) tiebreak: i64,
    pub(crate) timestamp: Timestamp,
}

impl QueueKey {
    /// Assigned round.
    pub fn round(&self) -> Round {
        self.round
    }

    /// Phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Step-specific tiebreak; lower values run first.
    pub fn tiebreak(&self) -> i64 {
        self.tiebreak
    }

    /// Insertion stamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn sort_tuple(&self) -> (Round, u16, i64, Timestamp) {
        (self.round, self.phase.rank, self.tiebreak, self.timestamp)
    }
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.sort_tuple() == other.sort_tuple()
    }
}

impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_tuple().cmp(&other.sort_tuple())
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[r:{} p:{} tb:{} ts:{}]",
            self.round, self.phase, self.tiebreak, self.timestamp.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P0: Phase = Phase::new("p0", 0);
    const P1: Phase = Phase::new("p1", 1);

    fn key(round: Round, phase: Phase, tiebreak: i64, ts: u64) -> QueueKey {
        QueueKey {
            round,
            phase,
            tiebreak,
            timestamp: Timestamp(ts),
        }
    }

    #[test]
    fn delayed_round_sorts_last() {
        assert!(Round::At(u32::MAX) < Round::Delayed);
        assert_eq!(Round::Delayed.next(), Round::Delayed);
        assert_eq!(Round::At(3).next(), Round::At(4));
    }

    #[test]
    fn key_order_is_round_phase_tiebreak_timestamp() {
        let mut keys = [
            key(Round::At(1), P0, 0, 0),
            key(Round::At(0), P1, 0, 1),
            key(Round::At(0), P0, 5, 2),
            key(Round::At(0), P0, -5, 3),
            key(Round::At(0), P0, -5, 4),
            key(Round::Delayed, P0, -100, 5),
        ];
        keys.sort();
        let stamps: Vec<u64> = keys.iter().map(|k| k.timestamp.0).collect();
        assert_eq!(stamps, vec![3, 4, 2, 1, 0, 5]);
    }
}
