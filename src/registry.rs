//! Append-only store of scheduled jobs and lifecycle hooks.

use std::sync::Arc;

use tracing::debug;

use crate::alias::AliasTable;
use crate::entry::Entry;
use crate::error::CronError;
use crate::schedule::ScheduleExpression;
use crate::task::Task;
use crate::Result;

const LIFECYCLE: [&str; 2] = ["start", "stop"];
const NOTIFICATIONS: [&str; 3] = ["tick", "error", "started"];

/// Whether `key` names a lifecycle hook (`start`, `stop`), ignoring case.
pub fn is_lifecycle(key: &str) -> bool {
    LIFECYCLE.iter().any(|name| name.eq_ignore_ascii_case(key))
}

/// Whether `key` names a notification channel (`tick`, `error`, `started`), ignoring case.
pub fn is_notification(key: &str) -> bool {
    NOTIFICATIONS.iter().any(|name| name.eq_ignore_ascii_case(key))
}

/// The two lifecycle hook lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Start,
    Stop,
}

impl Hook {
    fn parse(key: &str) -> Option<Hook> {
        if key.eq_ignore_ascii_case("start") {
            Some(Hook::Start)
        } else if key.eq_ignore_ascii_case("stop") {
            Some(Hook::Stop)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Start => "start",
            Hook::Stop => "stop",
        }
    }
}

#[derive(Debug, Default, Clone)]
struct JobList {
    entries: Vec<Entry>,
    descriptions: Vec<String>,
}

impl JobList {
    fn summary(&self, heading: &str, out: &mut Vec<String>) {
        let count = self.entries.len();
        out.push(format!(
            "{} ({} event{})",
            heading,
            count,
            if count == 1 { "" } else { "s" }
        ));
        out.extend(self.descriptions.iter().map(|d| format!("- {}", d)));
    }
}

/// Jobs bound to one schedule expression.
#[derive(Debug, Clone)]
pub struct ScheduledJobs {
    expression: ScheduleExpression,
    keys: Vec<String>,
    jobs: JobList,
}

impl ScheduledJobs {
    pub fn expression(&self) -> &ScheduleExpression {
        &self.expression
    }

    /// Jobs in registration order.
    pub fn entries(&self) -> &[Entry] {
        &self.jobs.entries
    }

    /// Descriptions in registration order.
    pub fn descriptions(&self) -> &[String] {
        &self.jobs.descriptions
    }
}

/// In-memory registry of every job and hook a [`Cron`](crate::Cron) knows.
///
/// Registering the same key again appends; nothing is ever replaced or removed.
#[derive(Debug, Default, Clone)]
pub struct JobRegistry {
    schedules: Vec<ScheduledJobs>,
    start: JobList,
    stop: JobList,
    next_id: usize,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry::default()
    }

    /// Registers `tasks` under `key`, in order, as one atomic call.
    ///
    /// `key` is a lifecycle hook name (`start`/`stop`, any case), an alias
    /// known to `aliases`, or a five-field schedule expression.
    ///
    /// # Errors
    ///
    /// * [`CronError::TypeMismatch`] if `key` is a notification channel.
    /// * [`CronError::Configuration`] if `tasks` is empty or the key is not a
    ///   valid schedule expression.
    ///
    /// Nothing is registered when an error is returned.
    pub fn register<I>(
        &mut self,
        aliases: &AliasTable,
        key: &str,
        description: Option<&str>,
        tasks: I,
    ) -> Result<&mut Self>
    where
        I: IntoIterator<Item = Task>,
    {
        if is_notification(key) {
            return Err(CronError::TypeMismatch(key.to_string()));
        }

        let tasks: Vec<Task> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return Err(CronError::config(format!("no tasks given for `{}`", key)));
        }

        let description_arc: Option<Arc<str>> = description.map(Arc::from);

        match Hook::parse(key) {
            Some(hook) => {
                let entries = self.entries_for(hook.as_str(), &description_arc, tasks);
                let list = match hook {
                    Hook::Start => &mut self.start,
                    Hook::Stop => &mut self.stop,
                };
                debug!(hook = hook.as_str(), count = entries.len(), "registered hooks");
                list.entries.extend(entries);
                if let Some(description) = description {
                    list.descriptions.push(description.to_string());
                }
            }
            None => {
                let expression =
                    ScheduleExpression::parse(aliases.resolve(key)).map_err(|err| match err {
                        CronError::ParseError(err) => {
                            CronError::config(format!("invalid schedule `{}`: {}", key, err))
                        }
                        other => other,
                    })?;
                let entries = self.entries_for(key, &description_arc, tasks);
                debug!(
                    key,
                    expression = %expression,
                    count = entries.len(),
                    "registered jobs"
                );

                let index = match self
                    .schedules
                    .iter()
                    .position(|s| s.expression == expression)
                {
                    Some(index) => index,
                    None => {
                        self.schedules.push(ScheduledJobs {
                            expression,
                            keys: Vec::new(),
                            jobs: JobList::default(),
                        });
                        self.schedules.len() - 1
                    }
                };

                let scheduled = &mut self.schedules[index];
                if !scheduled.keys.iter().any(|k| k == key) {
                    scheduled.keys.push(key.to_string());
                }
                scheduled.jobs.entries.extend(entries);
                if let Some(description) = description {
                    scheduled.jobs.descriptions.push(description.to_string());
                }
            }
        }

        Ok(self)
    }

    fn entries_for(
        &mut self,
        key: &str,
        description: &Option<Arc<str>>,
        tasks: Vec<Task>,
    ) -> Vec<Entry> {
        tasks
            .into_iter()
            .map(|task| {
                self.next_id += 1;
                Entry {
                    id: self.next_id,
                    key: key.to_string(),
                    description: description.clone(),
                    task,
                }
            })
            .collect()
    }

    /// Hooks bound to `hook`, in registration order.
    pub fn hooks(&self, hook: Hook) -> &[Entry] {
        match hook {
            Hook::Start => &self.start.entries,
            Hook::Stop => &self.stop.entries,
        }
    }

    /// Scheduled job groups, in order of first registration.
    pub fn schedules(&self) -> &[ScheduledJobs] {
        &self.schedules
    }

    /// Jobs registered under `key`, resolving it through `aliases` first.
    pub fn jobs_for(&self, aliases: &AliasTable, key: &str) -> &[Entry] {
        let resolved = aliases.resolve(key).trim();
        self.schedules
            .iter()
            .find(|s| s.expression.as_str() == resolved)
            .map(ScheduledJobs::entries)
            .unwrap_or(&[])
    }

    /// Total number of scheduled jobs, hooks excluded.
    pub fn len(&self) -> usize {
        self.schedules.iter().map(|s| s.jobs.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable summary: start hooks, each schedule, then stop hooks.
    pub fn list(&self) -> String {
        let mut out = Vec::new();

        if !self.start.entries.is_empty() {
            self.start.summary("start", &mut out);
            out.push(String::new());
        }

        for scheduled in &self.schedules {
            let expression = scheduled.expression.as_str();
            let aliases: Vec<&str> = scheduled
                .keys
                .iter()
                .map(String::as_str)
                .filter(|k| k.trim() != expression)
                .collect();
            let heading = if aliases.is_empty() {
                expression.to_string()
            } else {
                format!("{} [{}]", expression, aliases.join(", "))
            };
            scheduled.jobs.summary(&heading, &mut out);
            out.push(String::new());
        }

        if !self.stop.entries.is_empty() {
            self.stop.summary("stop", &mut out);
        }

        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Task {
        Task::callback(|done| done.ok())
    }

    #[test]
    fn test_register_accumulates_in_order() {
        let aliases = AliasTable::new();
        let mut registry = JobRegistry::new();

        registry
            .register(&aliases, "*/5 * * * *", None, vec![noop()])
            .unwrap()
            .register(&aliases, "*/5 * * * *", None, vec![noop(), noop()])
            .unwrap();

        let entries = registry.jobs_for(&aliases, "*/5 * * * *");
        assert_eq!(entries.len(), 3);
        let ids: Vec<usize> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(registry.schedules().len(), 1);
    }

    #[test]
    fn test_register_under_alias_stores_canonical() {
        let mut aliases = AliasTable::new();
        aliases.load(vec![("* */1 * * *", "the_hour")]).unwrap();
        let mut registry = JobRegistry::new();

        registry
            .register(&aliases, "the_hour", None, vec![noop()])
            .unwrap();

        let scheduled = &registry.schedules()[0];
        assert_eq!(scheduled.expression().as_str(), "* */1 * * *");
        assert_eq!(scheduled.entries()[0].key, "the_hour");
        assert_eq!(registry.jobs_for(&aliases, "* */1 * * *").len(), 1);
    }

    #[test]
    fn test_register_lifecycle_any_case() {
        let aliases = AliasTable::new();
        let mut registry = JobRegistry::new();

        registry
            .register(&aliases, "START", None, vec![noop()])
            .unwrap()
            .register(&aliases, "stop", Some("cleanup"), vec![noop(), noop()])
            .unwrap();

        assert_eq!(registry.hooks(Hook::Start).len(), 1);
        assert_eq!(registry.hooks(Hook::Stop).len(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.hooks(Hook::Start)[0].key, "start");
    }

    #[test]
    fn test_register_notification_is_type_mismatch() {
        let aliases = AliasTable::new();
        let mut registry = JobRegistry::new();

        let err = registry
            .register(&aliases, "tick", None, vec![noop()])
            .unwrap_err();
        assert!(matches!(err, CronError::TypeMismatch(ref k) if k == "tick"));
    }

    #[test]
    fn test_register_rejects_empty_and_invalid() {
        let aliases = AliasTable::new();
        let mut registry = JobRegistry::new();

        assert!(matches!(
            registry.register(&aliases, "* * * * *", None, Vec::new()),
            Err(CronError::Configuration(_))
        ));
        assert!(registry
            .register(&aliases, "some-timestamp", None, vec![noop()])
            .is_err());
        assert!(matches!(
            registry.register(&aliases, "61 * * * *", None, vec![noop()]),
            Err(CronError::Configuration(ref msg)) if msg.contains("61 * * * *")
        ));
        assert!(registry.schedules().is_empty());
    }

    #[test]
    fn test_list() {
        let aliases = AliasTable::builtin();
        let mut registry = JobRegistry::new();

        registry
            .register(&aliases, "start", Some("Open connections"), vec![noop()])
            .unwrap()
            .register(
                &aliases,
                "every_five_minutes",
                Some("Rebuild the list of topics"),
                vec![noop()],
            )
            .unwrap()
            .register(
                &aliases,
                "every_twenty_minutes",
                Some("Rebuild the hot feeds"),
                vec![noop(), noop()],
            )
            .unwrap()
            .register(&aliases, "* */12 * * *", None, vec![noop()])
            .unwrap()
            .register(&aliases, "stop", None, vec![noop()])
            .unwrap();

        let expected = "start (1 event)\n\
                        - Open connections\n\
                        \n\
                        */5 * * * * [every_five_minutes] (1 event)\n\
                        - Rebuild the list of topics\n\
                        \n\
                        */20 * * * * [every_twenty_minutes] (2 events)\n\
                        - Rebuild the hot feeds\n\
                        \n\
                        * */12 * * * (1 event)\n\
                        \n\
                        stop (1 event)";
        assert_eq!(registry.list(), expected);
    }

    #[test]
    fn test_list_empty() {
        assert_eq!(JobRegistry::new().list(), "");
    }
}
