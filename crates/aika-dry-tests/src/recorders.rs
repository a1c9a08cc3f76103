// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Recording doubles for queue sinks and selection observers.
//!
//! Both recorders are cheap handles over shared state: clone one, install
//! the clone, and inspect the original after the run.

use std::sync::{Arc, Mutex};

use aika_fields::{FieldRef, QueueEventSink, QueueKey, SelectionEvent, SelectionObserver};

/// Queue lifecycle event captured by [`RecordingSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueEvent {
    /// Step enqueued.
    Added(&'static str),
    /// Step about to run.
    Before(&'static str),
    /// Step finished.
    After(&'static str),
    /// Step rejected by a filter.
    Skipped(&'static str),
}

/// [`QueueEventSink`] that keeps every event with its key.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Vec<(QueueKey, QueueEvent)>>>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, key: &QueueKey, event: QueueEvent) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((*key, event));
    }

    /// Events in arrival order.
    pub fn events(&self) -> Vec<QueueEvent> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, e)| *e)
            .collect()
    }

    /// Keys of processed steps in processing order.
    pub fn processed_keys(&self) -> Vec<QueueKey> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, e)| matches!(e, QueueEvent::Before(_)))
            .map(|(k, _)| *k)
            .collect()
    }
}

impl QueueEventSink for RecordingSink {
    fn on_added(&self, key: &QueueKey, step: &'static str) {
        self.push(key, QueueEvent::Added(step));
    }

    fn on_before(&self, key: &QueueKey, step: &'static str) {
        self.push(key, QueueEvent::Before(step));
    }

    fn on_after(&self, key: &QueueKey, step: &'static str) {
        self.push(key, QueueEvent::After(step));
    }

    fn on_skipped(&self, key: &QueueKey, step: &'static str) {
        self.push(key, QueueEvent::Skipped(step));
    }
}

/// [`SelectionObserver`] that keeps every winner change.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    inner: Arc<Mutex<Vec<(FieldRef, SelectionEvent)>>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in arrival order.
    pub fn events(&self) -> Vec<(FieldRef, SelectionEvent)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drops every recorded event.
    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl SelectionObserver for RecordingObserver {
    fn on_selection(&self, field: FieldRef, event: SelectionEvent) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((field, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aika_fields::{FieldIndex, ObjId};

    #[test]
    fn clones_share_state() {
        let observer = RecordingObserver::new();
        let installed = observer.clone();
        let at = FieldRef::new(ObjId(0), FieldIndex(0));
        installed.on_selection(at, SelectionEvent::Connect { input: at });
        assert_eq!(
            observer.events(),
            vec![(at, SelectionEvent::Connect { input: at })]
        );
        observer.clear();
        assert!(installed.events().is_empty());
    }
}
