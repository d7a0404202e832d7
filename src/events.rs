//! Typed notification channels: `tick`, `error` and `started`.
//!
//! Listeners are plain callbacks. Each emitted event reaches every listener
//! exactly once, in the order the listeners were added.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tracing::warn;

use crate::error::CronError;

/// One evaluation of what is due.
#[derive(Debug, Clone)]
pub struct TickEvent<Z>
where
    Z: TimeZone,
{
    /// The evaluated minute, seconds zeroed.
    pub at: DateTime<Z>,
    /// How many jobs were due.
    pub due: usize,
}

type TickListener<Z> = Arc<dyn Fn(&TickEvent<Z>) + Send + Sync>;
type ErrorListener<Z> = Arc<dyn Fn(&CronError, &DateTime<Z>) + Send + Sync>;
type StartedListener = Arc<dyn Fn(Duration) + Send + Sync>;

/// Listener lists for every notification channel.
pub struct Events<Z>
where
    Z: TimeZone,
{
    tick: Vec<TickListener<Z>>,
    error: Vec<ErrorListener<Z>>,
    started: Vec<StartedListener>,
}

impl<Z> Events<Z>
where
    Z: TimeZone,
{
    pub fn new() -> Self {
        Events {
            tick: Vec::new(),
            error: Vec::new(),
            started: Vec::new(),
        }
    }

    /// Called on every tick, even when nothing is due.
    pub fn on_tick<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&TickEvent<Z>) + Send + Sync + 'static,
    {
        self.tick.push(Arc::new(f));
        self
    }

    /// Called for every job failure in daemon mode, with the tick it belonged to.
    pub fn on_error<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&CronError, &DateTime<Z>) + Send + Sync + 'static,
    {
        self.error.push(Arc::new(f));
        self
    }

    /// Called once when the daemon starts, with the wait until its first tick.
    pub fn on_started<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.started.push(Arc::new(f));
        self
    }

    pub(crate) fn emit_tick(&self, event: &TickEvent<Z>) {
        for listener in &self.tick {
            deliver("tick", || listener(event));
        }
    }

    pub(crate) fn emit_error(&self, err: &CronError, at: &DateTime<Z>) {
        for listener in &self.error {
            deliver("error", || listener(err, at));
        }
    }

    pub(crate) fn emit_started(&self, wait: Duration) {
        for listener in &self.started {
            deliver("started", || listener(wait));
        }
    }
}

impl<Z> Default for Events<Z>
where
    Z: TimeZone,
{
    fn default() -> Self {
        Events::new()
    }
}

impl<Z> fmt::Debug for Events<Z>
where
    Z: TimeZone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events")
            .field("tick", &self.tick.len())
            .field("error", &self.error.len())
            .field("started", &self.started.len())
            .finish()
    }
}

fn deliver<F>(channel: &str, f: F)
where
    F: FnOnce(),
{
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(channel, "event listener panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    #[test]
    fn test_tick_reaches_every_listener_once_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events: Events<Utc> = Events::new();

        let s1 = Arc::clone(&seen);
        let s2 = Arc::clone(&seen);
        events
            .on_tick(move |e| s1.lock().unwrap().push(("first", e.due)))
            .on_tick(move |e| s2.lock().unwrap().push(("second", e.due)));

        events.emit_tick(&TickEvent {
            at: Utc::now(),
            due: 3,
        });

        assert_eq!(*seen.lock().unwrap(), vec![("first", 3), ("second", 3)]);
    }

    #[test]
    fn test_panicking_listener_is_skipped() {
        let count = Arc::new(Mutex::new(0));
        let mut events: Events<Utc> = Events::new();

        let c = Arc::clone(&count);
        events
            .on_started(|_| panic!("listener bug"))
            .on_started(move |_| *c.lock().unwrap() += 1);

        events.emit_started(Duration::from_secs(42));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_error_listener_receives_timestamp() {
        let seen = Arc::new(Mutex::new(None));
        let mut events: Events<Utc> = Events::new();

        let s = Arc::clone(&seen);
        events.on_error(move |err, at| {
            *s.lock().unwrap() = Some((err.to_string(), *at));
        });

        let at = Utc::now();
        events.emit_error(&CronError::AlreadyRunning, &at);

        let (message, when) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(message, "You cannot run the Cron library twice");
        assert_eq!(when, at);
    }
}
