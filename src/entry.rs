//! Registered job entries.
//!
//! This module defines the data structure the registry stores for every
//! registered task, whether it is bound to a schedule or a lifecycle hook.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::task::{JobResult, Task};

/// A registered unit of work.
///
/// An `Entry` pairs a [`Task`] with what it was registered under, so that
/// listings and error messages can name it.
///
/// # Note
///
/// This type is created by the registry and is not typically constructed
/// directly by user code.
#[derive(Clone)]
pub struct Entry {
    /// Registration sequence number, unique within one registry.
    pub id: usize,

    /// The key exactly as passed at registration, before alias resolution.
    ///
    /// For lifecycle hooks this is the lower-cased hook name.
    pub key: String,

    /// Description attached to the registration call, if any.
    pub description: Option<Arc<str>>,

    /// The adapted job body.
    pub task: Task,
}

impl Entry {
    /// Label used in logs and in [`CronError::JobExecution`](crate::CronError::JobExecution).
    pub fn label(&self) -> String {
        match &self.description {
            Some(description) => format!("{} ({})", description, self.key),
            None => format!("#{} ({})", self.id, self.key),
        }
    }

    /// Starts one execution of this entry's task.
    pub fn invoke(&self) -> BoxFuture<'static, JobResult> {
        self.task.invoke()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(description: Option<&str>) -> Entry {
        Entry {
            id: 1,
            key: "every_minute".to_string(),
            description: description.map(Arc::from),
            task: Task::callback(|done| done.ok()),
        }
    }

    #[test]
    fn test_entry_debug() {
        let debug_str = format!("{:?}", entry(None));
        assert!(debug_str.contains("Entry"));
        assert!(debug_str.contains("id: 1"));
    }

    #[test]
    fn test_entry_label() {
        assert_eq!(entry(None).label(), "#1 (every_minute)");
        assert_eq!(
            entry(Some("Rebuild the list of topics")).label(),
            "Rebuild the list of topics (every_minute)"
        );
    }

    #[tokio::test]
    async fn test_entry_clone_shares_task() {
        let entry = entry(None);
        let cloned = entry.clone();
        assert_eq!(cloned.id, entry.id);
        assert!(cloned.invoke().await.is_ok());
    }
}
