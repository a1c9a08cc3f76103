// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Queue ordering, delayed phases, filters and timeouts.

use std::sync::Arc;
use std::time::Duration;

use aika_dry_tests::{QueueEvent, RecordingSink, RecordingStep, ScratchHost};
use aika_fields::queue::{process, process_filtered, process_through};
use aika_fields::{Phase, QueueError, Round};

const FIRST: Phase = Phase::new("first", 0);
const SECOND: Phase = Phase::new("second", 1);
const LATE: Phase = Phase::delayed("late", 0);

#[test]
fn steps_drain_by_round_then_phase() {
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    for order in orders {
        let steps = [
            RecordingStep::new("A", SECOND),
            RecordingStep::new("B", FIRST),
            RecordingStep::new("C", FIRST).next_round(),
        ];
        let mut host = ScratchHost::new();
        for i in order {
            host.push(steps[i].clone());
        }
        let report = process(&mut host).unwrap();
        assert_eq!(host.log, ["B", "A", "C"], "enqueue order {order:?}");
        assert_eq!(report.processed, 3);
        assert_eq!(host.queue.current_round(), 1);
    }
}

#[test]
fn tiebreak_orders_within_a_phase_and_timestamp_breaks_ties() {
    let mut host = ScratchHost::new();
    host.push(RecordingStep::new("zero", FIRST));
    host.push(RecordingStep::new("low", FIRST).tiebreak(-5));
    host.push(RecordingStep::new("three-a", FIRST).tiebreak(3));
    host.push(RecordingStep::new("three-b", FIRST).tiebreak(3));
    process(&mut host).unwrap();
    assert_eq!(host.log, ["low", "zero", "three-a", "three-b"]);
}

#[test]
fn delayed_steps_wait_for_every_concrete_round() {
    let mut host = ScratchHost::new();
    host.push(
        RecordingStep::new("x", FIRST)
            .then(RecordingStep::new("delayed", LATE))
            .then(RecordingStep::new("same-round", SECOND))
            .then(RecordingStep::new("next-round", FIRST).next_round()),
    );
    process(&mut host).unwrap();
    assert_eq!(host.log, ["x", "same-round", "next-round", "delayed"]);
}

#[test]
fn delayed_round_never_advances_current_round() {
    let mut host = ScratchHost::new();
    host.push(RecordingStep::new("delayed", LATE).next_round());
    let key = *host.queue.keys().next().unwrap();
    assert_eq!(key.round(), Round::Delayed);
    process(&mut host).unwrap();
    assert_eq!(host.queue.current_round(), 0);
}

#[test]
fn process_through_leaves_later_rounds_queued() {
    let mut host = ScratchHost::new();
    host.push(RecordingStep::new("now", FIRST));
    host.push(RecordingStep::new("later", FIRST).next_round());
    host.push(RecordingStep::new("delayed", LATE));

    let report = process_through(&mut host, Round::At(0)).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(host.log, ["now"]);
    assert_eq!(host.queue.len(), 2);

    process_through(&mut host, Round::At(1)).unwrap();
    assert_eq!(host.log, ["now", "later"]);
    process(&mut host).unwrap();
    assert_eq!(host.log, ["now", "later", "delayed"]);
}

#[test]
fn filtered_steps_stay_queued_under_their_keys() {
    let sink = RecordingSink::new();
    let mut host = ScratchHost::new();
    host.queue.set_sink(Arc::new(sink.clone()));
    host.push(RecordingStep::new("infer", FIRST));
    host.push(RecordingStep::new("train", SECOND));
    host.push(RecordingStep::new("infer-2", FIRST).next_round());
    let train_key = *host.queue.keys().nth(1).unwrap();

    let report = process_filtered(&mut host, |_, step| step.name() != "train").unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(host.log, ["infer", "infer-2"]);
    assert!(host.queue.contains(&train_key));
    assert!(sink.events().contains(&QueueEvent::Skipped("train")));

    process(&mut host).unwrap();
    assert_eq!(host.log, ["infer", "infer-2", "train"]);
    assert!(host.queue.is_empty());
}

#[test]
fn sink_sees_every_lifecycle_event() {
    let sink = RecordingSink::new();
    let mut host = ScratchHost::new();
    host.queue.set_sink(Arc::new(sink.clone()));
    host.push(RecordingStep::new("a", FIRST).then(RecordingStep::new("b", FIRST)));
    process(&mut host).unwrap();
    assert_eq!(
        sink.events(),
        vec![
            QueueEvent::Added("a"),
            QueueEvent::Before("a"),
            QueueEvent::Added("b"),
            QueueEvent::After("a"),
            QueueEvent::Before("b"),
            QueueEvent::After("b"),
        ]
    );
    let processed = sink.processed_keys();
    assert!(processed.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn timeout_aborts_without_rolling_back() {
    let mut host = ScratchHost::new();
    host.queue.set_timeout(Some(Duration::from_millis(5)));
    host.push(RecordingStep::new("slow", FIRST).sleeping(Duration::from_millis(30)));
    host.push(RecordingStep::new("never", FIRST));

    let err = process(&mut host).unwrap_err();
    assert!(matches!(err, QueueError::Timeout { processed: 1, .. }));
    assert_eq!(host.log, ["slow"]);
    assert_eq!(host.queue.len(), 1);
    assert!(host.queue.current_key().is_none());
}

#[test]
fn slow_final_step_still_completes_the_drain() {
    let mut host = ScratchHost::new();
    host.queue.set_timeout(Some(Duration::from_millis(5)));
    host.push(RecordingStep::new("slow", FIRST).sleeping(Duration::from_millis(30)));

    let report = process(&mut host).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(host.log, ["slow"]);
    assert!(host.queue.is_empty());
}

#[test]
fn slow_step_before_a_later_round_limit_still_completes() {
    let mut host = ScratchHost::new();
    host.queue.set_timeout(Some(Duration::from_millis(5)));
    host.push(RecordingStep::new("slow", FIRST).sleeping(Duration::from_millis(30)));
    host.push(RecordingStep::new("later", FIRST).next_round());

    let report = process_through(&mut host, Round::At(0)).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(host.queue.len(), 1);
}

#[test]
fn advanced_round_applies_to_steps_added_afterwards() {
    let mut host = ScratchHost::new();
    let before = host.queue.add_step(Box::new(RecordingStep::new("before", FIRST)));
    host.queue.advance_round();
    let after = host.queue.add_step(Box::new(RecordingStep::new("after", FIRST)));
    let bumped = host
        .queue
        .add_step(Box::new(RecordingStep::new("bumped", FIRST).next_round()));

    assert_eq!(host.queue.current_round(), 1);
    assert_eq!(before.round(), Round::At(0));
    assert_eq!(after.round(), Round::At(1));
    assert_eq!(bumped.round(), Round::At(2));

    process(&mut host).unwrap();
    assert_eq!(host.log, ["before", "after", "bumped"]);
    assert_eq!(host.queue.current_round(), 2);
}

#[test]
fn removed_step_never_runs() {
    let mut host = ScratchHost::new();
    host.push(RecordingStep::new("kept", FIRST));
    let dropped = host.queue.add_step(Box::new(RecordingStep::new("dropped", SECOND)));

    let removed = host.queue.remove_step(&dropped).unwrap();
    assert_eq!(removed.name(), "dropped");
    assert!(!host.queue.contains(&dropped));
    assert!(host.queue.remove_step(&dropped).is_none());

    process(&mut host).unwrap();
    assert_eq!(host.log, ["kept"]);
}
