//! Human-friendly names for schedule expressions.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::CronError;
use crate::registry::{is_lifecycle, is_notification};
use crate::Result;

/// The aliases every new [`Cron`](crate::Cron) starts with.
const BUILTIN: &[(&str, &[&str])] = &[
    ("0 0 1 1 *", &["@yearly", "@annually"]),
    ("0 0 1 * *", &["@monthly"]),
    ("0 0 * * 0", &["@weekly", "every_week", "each_week"]),
    ("0 0 * * *", &["@daily", "every_day"]),
    ("0 * * * *", &["@hourly", "every_hour", "the_hour"]),
    ("0 */2 * * *", &["every_two_hours"]),
    ("0 */3 * * *", &["every_three_hours"]),
    ("*/1 * * * *", &["every_minute"]),
    ("*/2 * * * *", &["every_two_minutes"]),
    ("*/5 * * * *", &["every_five_minutes"]),
    ("*/10 * * * *", &["every_ten_minutes"]),
    ("*/15 * * * *", &["every_fifteen_minutes"]),
    ("*/20 * * * *", &["every_twenty_minutes"]),
    ("*/30 * * * *", &["every_thirty_minutes"]),
];

/// One alias or several aliases for the same expression.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AliasNames {
    One(String),
    Many(Vec<String>),
}

impl AliasNames {
    fn iter(&self) -> impl Iterator<Item = &str> {
        let names: &[String] = match self {
            AliasNames::One(name) => std::slice::from_ref(name),
            AliasNames::Many(names) => names,
        };
        names.iter().map(String::as_str)
    }
}

impl From<&str> for AliasNames {
    fn from(name: &str) -> Self {
        AliasNames::One(name.to_string())
    }
}

impl From<Vec<&str>> for AliasNames {
    fn from(names: Vec<&str>) -> Self {
        AliasNames::Many(names.into_iter().map(str::to_string).collect())
    }
}

/// Alias name to canonical expression lookup.
///
/// Resolution is a single lookup: an alias never points at another alias.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    /// An empty table.
    pub fn new() -> Self {
        AliasTable::default()
    }

    /// The standard alias set (`@weekly`, `every_five_minutes`, ...).
    pub fn builtin() -> Self {
        let mut table = AliasTable::new();
        for (expression, names) in BUILTIN {
            for name in names.iter() {
                table
                    .aliases
                    .insert(name.to_string(), expression.to_string());
            }
        }
        table
    }

    /// Loads a mapping of canonical expression to one or many alias names.
    ///
    /// The canonical keys are only checked for shape (five fields); their
    /// syntax is checked when a job is registered against them. The mapping
    /// is validated in full before anything is inserted.
    pub fn load<I, K, V>(&mut self, mapping: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<AliasNames>,
    {
        let mut staged = Vec::new();
        for (expression, names) in mapping {
            let expression = expression.as_ref().trim();
            if expression.split_whitespace().count() != 5 {
                return Err(CronError::config(format!(
                    "alias target `{}` is not a five-field expression",
                    expression
                )));
            }

            let names: AliasNames = names.into();
            for name in names.iter() {
                let name = name.trim();
                if name.is_empty() {
                    return Err(CronError::config(format!(
                        "empty alias name for `{}`",
                        expression
                    )));
                }
                if is_lifecycle(name) || is_notification(name) {
                    return Err(CronError::config(format!(
                        "`{}` is reserved and cannot be used as an alias",
                        name
                    )));
                }
                staged.push((name.to_string(), expression.to_string()));
            }
        }

        for (name, expression) in &staged {
            let chained = self.aliases.contains_key(expression)
                || staged.iter().any(|(name, _)| name == expression);
            if chained {
                return Err(CronError::config(format!(
                    "alias target `{}` is itself an alias",
                    expression
                )));
            }

            let shadows = self.aliases.values().any(|target| target == name)
                || staged.iter().any(|(_, target)| target == name);
            if shadows {
                return Err(CronError::config(format!(
                    "alias `{}` is already the target of another alias",
                    name
                )));
            }
        }

        for (name, expression) in staged {
            debug!(alias = %name, expression = %expression, "loaded alias");
            self.aliases.insert(name, expression);
        }
        Ok(self)
    }

    /// The canonical expression for `key`, or `key` itself when it is not an alias.
    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Whether `key` is a known alias.
    pub fn contains(&self, key: &str) -> bool {
        self.aliases.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
