// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Event hooks for queue and selection activity.

use tracing::{debug, trace};

use crate::ident::FieldRef;
use crate::queue::QueueKey;

/// Receives queue lifecycle events. All methods default to no-ops.
pub trait QueueEventSink: Send + Sync {
    /// A step was enqueued.
    fn on_added(&self, _key: &QueueKey, _step: &'static str) {}
    /// A step is about to be processed.
    fn on_before(&self, _key: &QueueKey, _step: &'static str) {}
    /// A step finished processing.
    fn on_after(&self, _key: &QueueKey, _step: &'static str) {}
    /// A filter rejected a step during a drain.
    fn on_skipped(&self, _key: &QueueKey, _step: &'static str) {}
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl QueueEventSink for NullSink {}

/// Forwards queue events to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl QueueEventSink for TracingSink {
    fn on_added(&self, key: &QueueKey, step: &'static str) {
        debug!(%key, step, "queue: added");
    }

    fn on_before(&self, key: &QueueKey, step: &'static str) {
        debug!(%key, step, "queue: before");
    }

    fn on_after(&self, key: &QueueKey, step: &'static str) {
        debug!(%key, step, "queue: after");
    }

    fn on_skipped(&self, key: &QueueKey, step: &'static str) {
        debug!(%key, step, "queue: skipped");
    }
}

/// Selection change reported by a max field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionEvent {
    /// The previous winner's forwarding edge was retracted.
    Disconnect {
        /// Source field of the retracted input.
        input: FieldRef,
    },
    /// The new winner's forwarding edge was adopted.
    Connect {
        /// Source field of the adopted input.
        input: FieldRef,
    },
}

/// Observes winner changes of max fields.
///
/// Embedding layers use this to notify structures bound to the previously
/// or newly selected candidate.
pub trait SelectionObserver: Send + Sync {
    /// Called once per retraction and once per adoption, in that order.
    fn on_selection(&self, field: FieldRef, event: SelectionEvent) {
        trace!(?field, ?event, "selection changed");
    }
}

/// Ignores selection changes apart from trace logging.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl SelectionObserver for NullObserver {}
