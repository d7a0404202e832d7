//! Result reporting for external notifiers (chat webhooks and the like).

use chrono::{DateTime, TimeZone};
use futures::future::BoxFuture;

use crate::error::BoxError;

/// Job counts for one run or one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// What a [`Notifier`] is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Aggregate counts.
    Results(Summary),
    /// The error that failed the run.
    Failed(String),
}

/// Receives a [`Report`] and signals back once it has been delivered.
///
/// Delivery failures are logged by the caller and never change a run's outcome.
pub trait Notifier<Z>: Send + Sync
where
    Z: TimeZone,
{
    fn notify<'a>(
        &'a self,
        report: &'a Report,
        at: &'a DateTime<Z>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}
