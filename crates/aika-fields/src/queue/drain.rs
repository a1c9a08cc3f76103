// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Drain loops.

use std::time::Instant;

use tracing::{debug, instrument, trace, warn};

use super::{QueueError, QueueHost, QueueKey, Round, Step};

/// Outcome of a completed drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Steps whose `process` ran.
    pub processed: usize,
    /// Steps rejected by the filter and left queued.
    pub skipped: usize,
}

/// Drains every queued step in key order.
pub fn process<H: QueueHost>(host: &mut H) -> Result<DrainReport, H::Error> {
    drain(host, None, |_, _| true)
}

/// Drains in key order, processing only steps accepted by `filter`.
///
/// Rejected steps are not processed. They stay out of the way for the rest
/// of the drain and are queued again, under their original keys, once it
/// ends.
pub fn process_filtered<H, F>(host: &mut H, filter: F) -> Result<DrainReport, H::Error>
where
    H: QueueHost,
    F: FnMut(&QueueKey, &dyn Step<H>) -> bool,
{
    drain(host, None, filter)
}

/// Drains steps whose round is at most `round`, leaving later ones queued.
pub fn process_through<H: QueueHost>(host: &mut H, round: Round) -> Result<DrainReport, H::Error> {
    drain(host, Some(round), |_, _| true)
}

#[instrument(level = "debug", skip_all, fields(limit = ?limit))]
fn drain<H, F>(host: &mut H, limit: Option<Round>, mut filter: F) -> Result<DrainReport, H::Error>
where
    H: QueueHost,
    F: FnMut(&QueueKey, &dyn Step<H>) -> bool,
{
    let started = Instant::now();
    let timeout = host.queue().timeout();
    let sink = host.queue().sink();
    let mut deferred = Vec::new();
    let mut report = DrainReport::default();

    let outcome: Result<(), H::Error> = loop {
        let Some(first) = host.queue().first_key() else {
            break Ok(());
        };
        if limit.is_some_and(|limit| first.round > limit) {
            break Ok(());
        }
        // Only checked while work remains.
        if let Some(budget) = timeout {
            let elapsed = started.elapsed();
            if elapsed > budget {
                warn!(?elapsed, processed = report.processed, "queue drain timed out");
                break Err(QueueError::Timeout {
                    elapsed,
                    processed: report.processed,
                }
                .into());
            }
        }
        let Some((key, step)) = host.queue_mut().pop_first() else {
            break Ok(());
        };
        let name = step.name();
        if !filter(&key, step.as_ref()) {
            trace!(%key, step = name, "step skipped");
            sink.on_skipped(&key, name);
            report.skipped += 1;
            deferred.push((key, step));
            continue;
        }

        host.queue_mut().begin(key);
        trace!(%key, step = name, "processing step");
        sink.on_before(&key, name);
        if let Err(err) = step.process(host) {
            break Err(err);
        }
        sink.on_after(&key, name);
        report.processed += 1;
    };

    host.queue_mut().finish(deferred);
    if outcome.is_ok() {
        debug!(
            processed = report.processed,
            skipped = report.skipped,
            "queue drained"
        );
    }
    outcome.map(|()| report)
}
