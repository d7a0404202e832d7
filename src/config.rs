//! Scheduler configuration.
//!
//! Values come from, in increasing precedence: [`Default`], a TOML document
//! ([`CronConfig::from_toml`] / [`CronConfig::from_file`]), and environment
//! variables ([`CronConfig::apply_env_overrides`]):
//!
//! | Variable            | Effect                                     |
//! |---------------------|--------------------------------------------|
//! | `CRONFILE_ENV`      | `production` forbids faking the time       |
//! | `CRONFILE_LOCK_DIR` | directory holding the lock marker          |
//! | `CRONFILE_LOCKING`  | `0`/`false`/`off` disables locking         |
//!
//! ```toml
//! locking = true
//! lock_dir = "/var/run"
//! lock_name = "nightly"
//!
//! [aliases]
//! "0 3 * * *" = ["nightly", "@backup"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::alias::AliasNames;
use crate::error::CronError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// Hold the lock marker for the duration of a run.
    pub locking: bool,
    /// Directory for the lock marker. Defaults to `$CWD`, then the working directory.
    pub lock_dir: Option<PathBuf>,
    /// Marker name without extension. Defaults to the executable's name.
    pub lock_name: Option<String>,
    /// Production mode: faking the time is refused.
    pub production: bool,
    /// Extra aliases, canonical expression to name(s).
    pub aliases: BTreeMap<String, AliasNames>,
}

impl Default for CronConfig {
    fn default() -> Self {
        CronConfig {
            locking: true,
            lock_dir: None,
            lock_name: None,
            production: false,
            aliases: BTreeMap::new(),
        }
    }
}

impl CronConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = CronConfig::default();
        config.apply_env_overrides();
        config
    }

    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)
            .map_err(|e| CronError::config(format!("invalid config: {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = var("CRONFILE_ENV") {
            self.production = env.trim().eq_ignore_ascii_case("production");
        }
        if let Some(dir) = var("CRONFILE_LOCK_DIR").filter(|d| !d.trim().is_empty()) {
            self.lock_dir = Some(PathBuf::from(dir));
        }
        if let Some(locking) = var("CRONFILE_LOCKING") {
            self.locking = !matches!(
                locking.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
    }

    /// The directory the lock marker lives in.
    pub fn resolved_lock_dir(&self) -> PathBuf {
        self.lock_dir
            .clone()
            .or_else(|| std::env::var_os("CWD").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
