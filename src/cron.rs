//! The single-shot run controller.
//!
//! A [`Cron`] collects jobs and hooks, then runs once per process: start
//! hooks in series, the due jobs as one concurrent batch, stop hooks in
//! series. The lock marker is taken before the first start hook and given
//! back before the first stop hook.

use std::ffi::OsString;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Timelike, Utc};
use tracing::{error, info, warn};

use crate::alias::{AliasNames, AliasTable};
use crate::args::{RunArgs, RunMode};
use crate::config::CronConfig;
use crate::error::CronError;
use crate::events::{Events, TickEvent};
use crate::lock::{FileLock, LockManager};
use crate::notify::{Notifier, Report, Summary};
use crate::registry::{Hook, JobRegistry};
use crate::schedule::truncate_to_minute;
use crate::task::Task;
use crate::tick::{self, BatchReport, Due};
use crate::Result;

/// Where a [`Cron`] is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl RunState {
    fn from_u8(value: u8) -> RunState {
        match value {
            0 => RunState::NotStarted,
            1 => RunState::Running,
            2 => RunState::Completed,
            _ => RunState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::NotStarted => 0,
            RunState::Running => 1,
            RunState::Completed => 2,
            RunState::Failed => 3,
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunReport<Z>
where
    Z: TimeZone,
{
    /// The effective minute, seconds zeroed.
    pub at: DateTime<Z>,
    pub mode: RunMode,
    /// Expressions that were due.
    pub expressions: Vec<String>,
    pub summary: Summary,
}

/// Result of a successful [`Cron::run`].
#[derive(Debug, Clone)]
pub enum RunOutcome<Z>
where
    Z: TimeZone,
{
    /// `list` mode: the registry summary.
    Listed(String),
    Completed(RunReport<Z>),
}

/// A set of scheduled jobs, run once per process.
///
/// Register everything up front, then call [`Cron::run`]. A second `run` on
/// the same instance fails with [`CronError::AlreadyRunning`] without
/// touching the lock or any hook. For a long-lived process, wrap the
/// instance in an [`Arc`] and hand it to a [`Daemon`](crate::Daemon).
///
/// # Examples
///
/// ```rust,no_run
/// use chrono::Utc;
/// use cronfile::{Cron, Task};
///
/// #[tokio::main]
/// async fn main() -> cronfile::Result<()> {
///     let mut cron = Cron::new(Utc);
///     cron.on_described("@hourly", "rotate logs", Task::blocking(|| {
///         println!("rotating");
///         Ok::<(), std::io::Error>(())
///     }))?;
///
///     cron.run(["--no-locking"]).await?;
///     Ok(())
/// }
/// ```
pub struct Cron<Z>
where
    Z: TimeZone + Send + Sync + 'static,
    Z::Offset: Send + Sync,
{
    registry: JobRegistry,
    aliases: AliasTable,
    pub(crate) events: Events<Z>,
    notifiers: Vec<Arc<dyn Notifier<Z>>>,
    lock: Arc<dyn LockManager>,
    config: CronConfig,
    tz: Z,
    fake_time: Option<DateTime<Z>>,
    state: AtomicU8,
}

impl<Z> Cron<Z>
where
    Z: TimeZone + Send + Sync + 'static,
    Z::Offset: Send + Sync,
{
    /// A cron with the built-in aliases and configuration from the environment.
    pub fn new(tz: Z) -> Cron<Z> {
        Cron::build(tz, CronConfig::from_env(), AliasTable::builtin())
    }

    /// A cron using `config`, whose aliases are loaded on top of the built-in set.
    pub fn with_config(tz: Z, config: CronConfig) -> Result<Cron<Z>> {
        let mut aliases = AliasTable::builtin();
        aliases.load(config.aliases.clone())?;
        Ok(Cron::build(tz, config, aliases))
    }

    fn build(tz: Z, config: CronConfig, aliases: AliasTable) -> Cron<Z> {
        let dir = config.resolved_lock_dir();
        let lock = match config.lock_name.as_deref() {
            Some(name) => FileLock::new(&dir, name),
            None => FileLock::for_current_exe(&dir),
        };

        Cron {
            registry: JobRegistry::new(),
            aliases,
            events: Events::new(),
            notifiers: Vec::new(),
            lock: Arc::new(lock),
            config,
            tz,
            fake_time: None,
            state: AtomicU8::new(RunState::NotStarted.as_u8()),
        }
    }

    /// Adds aliases, canonical expression to name(s).
    pub fn aliases<I, K, V>(&mut self, mapping: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<AliasNames>,
    {
        self.aliases.load(mapping)?;
        Ok(self)
    }

    /// Registers `task` under a schedule expression, an alias, or `start`/`stop`.
    pub fn on(&mut self, key: &str, task: Task) -> Result<&mut Self> {
        self.on_all(key, None, [task])
    }

    pub fn on_described(&mut self, key: &str, description: &str, task: Task) -> Result<&mut Self> {
        self.on_all(key, Some(description), [task])
    }

    /// Registers several tasks under one key and one optional description.
    pub fn on_all<I>(&mut self, key: &str, description: Option<&str>, tasks: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = Task>,
    {
        self.registry
            .register(&self.aliases, key, description, tasks)?;
        Ok(self)
    }

    /// Human-readable summary of every scheduled expression.
    pub fn list(&self) -> String {
        self.registry.list()
    }

    /// Replaces the lock used around runs.
    pub fn set_lock<L>(&mut self, lock: L) -> &mut Self
    where
        L: LockManager + 'static,
    {
        self.lock = Arc::new(lock);
        self
    }

    pub fn add_notifier<N>(&mut self, notifier: N) -> &mut Self
    where
        N: Notifier<Z> + 'static,
    {
        self.notifiers.push(Arc::new(notifier));
        self
    }

    /// Listener registration for `tick`, `error` and `started`.
    pub fn events(&mut self) -> &mut Events<Z> {
        &mut self.events
    }

    /// Pins the effective "now". Refused in production.
    pub fn fake_time(&mut self, at: DateTime<Z>) -> Result<&mut Self> {
        self.ensure_not_production("faking the time")?;
        self.fake_time = Some(at);
        Ok(self)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CronConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The effective current time: the faked time if any, else the wall clock.
    pub fn now(&self) -> DateTime<Z> {
        match &self.fake_time {
            Some(at) => at.clone(),
            None => self.wall_clock(),
        }
    }

    pub(crate) fn wall_clock(&self) -> DateTime<Z> {
        self.tz.from_utc_datetime(&Utc::now().naive_utc())
    }

    /// Jobs due in the minute containing `at`. Always emits `tick`.
    pub fn due_jobs(&self, at: &DateTime<Z>) -> Due {
        let at = truncate_to_minute(at.clone());
        let due = tick::due_at(&self.registry, &at);
        self.events.emit_tick(&TickEvent { at, due: due.len() });
        due
    }

    pub(crate) fn ensure_not_production(&self, what: &str) -> Result<()> {
        if self.config.production {
            return Err(CronError::config(format!(
                "{} is not allowed in production",
                what
            )));
        }
        Ok(())
    }

    /// Runs once with command-line style `args` (no program name).
    ///
    /// An instance that has already started fails with
    /// [`CronError::AlreadyRunning`] whatever the arguments. On a fresh
    /// instance, bad arguments are reported without starting it. The first
    /// error from the start hooks, the job batch or the stop hooks fails the
    /// run; stop hooks run regardless.
    pub async fn run<I, T>(&self, args: I) -> Result<RunOutcome<Z>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        if self.state() != RunState::NotStarted {
            return Err(CronError::AlreadyRunning);
        }
        let args = RunArgs::parse_args(args)?;

        if self
            .state
            .compare_exchange(
                RunState::NotStarted.as_u8(),
                RunState::Running.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(CronError::AlreadyRunning);
        }

        let result = self.execute(&args).await;
        let state = if result.is_ok() {
            RunState::Completed
        } else {
            RunState::Failed
        };
        self.state.store(state.as_u8(), Ordering::SeqCst);
        result
    }

    async fn execute(&self, args: &RunArgs) -> Result<RunOutcome<Z>> {
        let mode = args.mode();
        if mode == RunMode::List {
            return Ok(RunOutcome::Listed(self.list()));
        }

        let at = truncate_to_minute(self.effective_time(mode)?);
        let due = match mode {
            RunMode::Test => {
                let due = tick::due_always(&self.registry);
                self.events.emit_tick(&TickEvent {
                    at: at.clone(),
                    due: due.len(),
                });
                due
            }
            _ => self.due_jobs(&at),
        };
        let locking = self.config.locking && !args.no_locking;
        info!(at = ?at, mode = %mode, due = due.len(), locking, "running");

        let mut failure = None;
        let mut batch = BatchReport {
            due: due.len(),
            ..BatchReport::default()
        };
        match self.start_phase(locking, &due.expressions).await {
            Ok(()) => batch = tick::run_batch(&due.entries).await,
            Err(err) => failure = Some(err),
        }
        let summary = batch.summary();
        if failure.is_none() {
            failure = batch.into_first_error();
        }
        if let Err(err) = self.stop_phase(locking).await {
            failure.get_or_insert(err);
        }

        match failure {
            Some(err) => {
                if locking {
                    if let Err(release) = self.lock.release().await {
                        warn!(error = %release, "releasing lock after failure");
                    }
                }
                error!(error = %err, "run failed");
                self.notify(&Report::Failed(err.to_string()), &at).await;
                Err(err)
            }
            None => {
                info!(
                    due = summary.due,
                    succeeded = summary.succeeded,
                    "run completed"
                );
                self.notify(&Report::Results(summary), &at).await;
                Ok(RunOutcome::Completed(RunReport {
                    at,
                    mode,
                    expressions: due.expressions,
                    summary,
                }))
            }
        }
    }

    fn effective_time(&self, mode: RunMode) -> Result<DateTime<Z>> {
        let now = self.now();
        match mode {
            RunMode::At { hour, minute } => now
                .with_hour(hour)
                .and_then(|at| at.with_minute(minute))
                .ok_or_else(|| CronError::config(format!("{} does not exist today", mode))),
            _ => Ok(now),
        }
    }

    async fn start_phase(&self, locking: bool, due: &[String]) -> Result<()> {
        if locking {
            self.lock.acquire(due).await?;
        }
        tick::run_series(self.registry.hooks(Hook::Start)).await
    }

    async fn stop_phase(&self, locking: bool) -> Result<()> {
        if locking {
            self.lock.release().await?;
        }
        tick::run_series(self.registry.hooks(Hook::Stop)).await
    }

    /// Runs only the stop hooks, then releases the lock if this process holds it.
    ///
    /// Usable whether or not [`Cron::run`] ever ran; meant for signal handlers.
    pub async fn stop(&self) -> Result<()> {
        info!("stopping");
        let hooks = tick::run_series(self.registry.hooks(Hook::Stop)).await;
        let released = if self.lock.is_held() {
            self.lock.release().await
        } else {
            Ok(())
        };
        hooks.and(released)
    }

    /// Runs with the process arguments and exits: 0 on success, 1 on failure.
    ///
    /// In `list` mode the summary goes to stdout.
    pub async fn run_and_exit(&self) {
        let code = match self.run(std::env::args_os().skip(1)).await {
            Ok(RunOutcome::Listed(listing)) => {
                println!("{}", listing);
                0
            }
            Ok(RunOutcome::Completed(_)) => 0,
            Err(err) => {
                error!(error = %err, "cron failed");
                eprintln!("{}", err);
                1
            }
        };
        std::process::exit(code)
    }

    pub(crate) async fn notify(&self, report: &Report, at: &DateTime<Z>) {
        for notifier in &self.notifiers {
            if let Err(err) = notifier.notify(report, at).await {
                warn!(error = %err, "notifier failed");
            }
        }
    }
}

impl<Z> fmt::Debug for Cron<Z>
where
    Z: TimeZone + Send + Sync + 'static,
    Z::Offset: Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cron")
            .field("registry", &self.registry)
            .field("aliases", &self.aliases.len())
            .field("events", &self.events)
            .field("notifiers", &self.notifiers.len())
            .field("state", &self.state())
            .field("fake_time", &self.fake_time)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::NoLock;
    use std::sync::Mutex;

    fn cron() -> Cron<Utc> {
        let mut cron = Cron::with_config(Utc, CronConfig::default()).unwrap();
        cron.set_lock(NoLock);
        cron
    }

    fn record(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Task {
        let log = Arc::clone(log);
        let name = name.to_string();
        Task::callback(move |done| {
            log.lock().unwrap().push(name.clone());
            done.ok();
        })
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            RunState::NotStarted,
            RunState::Running,
            RunState::Completed,
            RunState::Failed,
        ] {
            assert_eq!(RunState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_fake_time_refused_in_production() {
        let config = CronConfig {
            production: true,
            ..CronConfig::default()
        };
        let mut cron = Cron::with_config(Utc, config).unwrap();
        let err = cron
            .fake_time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, CronError::Configuration(_)));
    }

    #[test]
    fn test_config_aliases_are_loaded() {
        let mut config = CronConfig::default();
        config
            .aliases
            .insert("0 3 * * *".to_string(), AliasNames::from("nightly"));
        let mut cron = Cron::with_config(Utc, config).unwrap();
        cron.on("nightly", Task::callback(|done| done.ok())).unwrap();
        assert_eq!(cron.list(), "0 3 * * * [nightly] (1 event)\n");
    }

    #[test]
    fn test_due_jobs_emits_tick() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let mut cron = cron();
        let t = Arc::clone(&ticks);
        cron.events().on_tick(move |e| t.lock().unwrap().push(e.due));
        cron.on("*/2 * * * *", Task::callback(|done| done.ok()))
            .unwrap();

        cron.due_jobs(&Utc.with_ymd_and_hms(2024, 6, 3, 12, 1, 45).unwrap());
        cron.due_jobs(&Utc.with_ymd_and_hms(2024, 6, 3, 12, 2, 45).unwrap());
        assert_eq!(*ticks.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_hook_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut cron = cron();
        cron.on("start", record(&log, "start"))
            .unwrap()
            .on("* * * * *", record(&log, "job"))
            .unwrap()
            .on("stop", record(&log, "stop"))
            .unwrap();

        let outcome = cron.run(Vec::<String>::new()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(*log.lock().unwrap(), vec!["start", "job", "stop"]);
        assert_eq!(cron.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_failed_start_skips_jobs_but_runs_stop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut cron = cron();
        cron.on("start", Task::callback(|done| done.err("no database")))
            .unwrap()
            .on("* * * * *", record(&log, "job"))
            .unwrap()
            .on("stop", record(&log, "stop"))
            .unwrap();

        let err = cron.run(Vec::<String>::new()).await.unwrap_err();
        assert!(err.to_string().contains("no database"));
        assert_eq!(*log.lock().unwrap(), vec!["stop"]);
        assert_eq!(cron.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_bad_args_leave_cron_runnable() {
        let cron = cron();
        assert!(matches!(
            cron.run(["99:99"]).await,
            Err(CronError::Configuration(_))
        ));
        assert_eq!(cron.state(), RunState::NotStarted);
        assert!(cron.run(["list"]).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_run_with_bad_args_is_already_running() {
        let cron = cron();
        cron.run(Vec::<String>::new()).await.unwrap();

        let err = cron.run(["99:99"]).await.unwrap_err();
        assert!(matches!(err, CronError::AlreadyRunning));
        assert_eq!(cron.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_list_mode() {
        let mut cron = cron();
        cron.on_described("@hourly", "ping", Task::callback(|done| done.ok()))
            .unwrap();

        match cron.run(["list"]).await.unwrap() {
            RunOutcome::Listed(listing) => assert!(listing.contains("- ping")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(cron.state(), RunState::Completed);
    }
}
