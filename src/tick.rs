//! Deciding what is due and running it.
//!
//! Hooks run in series and stop at the first failure. Due jobs run as one
//! concurrent batch: every job is spawned up front, failures are collected
//! as they complete, and nothing in flight is cancelled.

use chrono::{DateTime, TimeZone};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::{BoxError, CronError};
use crate::notify::Summary;
use crate::registry::JobRegistry;
use crate::task::panic_error;
use crate::Result;

/// The jobs selected for one tick.
#[derive(Debug, Clone, Default)]
pub struct Due {
    /// Expressions that matched, in registration order.
    pub expressions: Vec<String>,
    /// Their jobs, grouped by expression, registration order within a group.
    pub entries: Vec<Entry>,
}

impl Due {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Jobs whose expression matches the minute containing `at`.
pub fn due_at<Z>(registry: &JobRegistry, at: &DateTime<Z>) -> Due
where
    Z: TimeZone,
{
    let mut due = Due::default();
    for scheduled in registry.schedules() {
        if scheduled.expression().matches(at) {
            due.expressions
                .push(scheduled.expression().as_str().to_string());
            due.entries.extend(scheduled.entries().iter().cloned());
        }
    }
    due
}

/// Every scheduled job, each exactly once, regardless of time.
pub fn due_always(registry: &JobRegistry) -> Due {
    let mut due = Due::default();
    for scheduled in registry.schedules() {
        due.expressions
            .push(scheduled.expression().as_str().to_string());
        due.entries.extend(scheduled.entries().iter().cloned());
    }
    due
}

/// Outcome of a concurrent batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub due: usize,
    pub succeeded: usize,
    /// Failures in the order they completed.
    pub errors: Vec<CronError>,
}

impl BatchReport {
    pub fn summary(&self) -> Summary {
        Summary {
            due: self.due,
            succeeded: self.succeeded,
            failed: self.errors.len(),
        }
    }

    /// The failure that completed first, if any.
    pub fn into_first_error(self) -> Option<CronError> {
        self.errors.into_iter().next()
    }
}

/// Runs every entry concurrently and waits for all of them.
pub async fn run_batch(entries: &[Entry]) -> BatchReport {
    let mut report = BatchReport {
        due: entries.len(),
        ..BatchReport::default()
    };

    let mut running: FuturesUnordered<_> = entries
        .iter()
        .map(|entry| {
            let label = entry.label();
            let entry = entry.clone();
            let handle = tokio::spawn(async move { entry.invoke().await });
            async move { (label, handle.await) }
        })
        .collect();

    while let Some((label, joined)) = running.next().await {
        let source: BoxError = match joined {
            Ok(Ok(())) => {
                debug!(job = %label, "job finished");
                report.succeeded += 1;
                continue;
            }
            Ok(Err(source)) => source,
            Err(err) if err.is_panic() => panic_error(err.into_panic()),
            Err(err) => Box::new(err),
        };
        warn!(job = %label, error = %source, "job failed");
        report.errors.push(CronError::job(label, source));
    }

    report
}

/// Runs `entries` one after another, stopping at the first failure.
pub async fn run_series(entries: &[Entry]) -> Result<()> {
    for entry in entries {
        debug!(hook = %entry.label(), "running hook");
        if let Err(source) = entry.invoke().await {
            warn!(hook = %entry.label(), error = %source, "hook failed");
            return Err(CronError::job(entry.label(), source));
        }
    }
    Ok(())
}
