//! Arguments accepted by [`Cron::run`](crate::Cron::run).

use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;

use clap::Parser;

use crate::error::CronError;
use crate::Result;

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run whatever is due now.
    #[default]
    Now,
    /// Print the registered jobs and run nothing.
    List,
    /// Run every registered job once, whatever its schedule.
    Test,
    /// Run what is due at this hour and minute of the current day.
    At { hour: u32, minute: u32 },
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "list" => return Ok(RunMode::List),
            "test" => return Ok(RunMode::Test),
            _ => {}
        }

        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| format!("expected `list`, `test` or HH:MM, found `{}`", s))?;
        let hour: u32 = hour
            .parse()
            .map_err(|_| format!("invalid hour in `{}`", s))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| format!("invalid minute in `{}`", s))?;
        if hour > 23 || minute > 59 {
            return Err(format!("`{}` is not a time of day", s));
        }
        Ok(RunMode::At { hour, minute })
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Now => f.write_str("now"),
            RunMode::List => f.write_str("list"),
            RunMode::Test => f.write_str("test"),
            RunMode::At { hour, minute } => write!(f, "{:02}:{:02}", hour, minute),
        }
    }
}

/// Command-line style run arguments, without the program name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "cronfile", no_binary_name = true)]
pub struct RunArgs {
    /// `list`, `test`, or an HH:MM time to pretend it is today
    #[arg(value_parser = RunMode::from_str)]
    pub mode: Option<RunMode>,

    /// Run without the lock marker
    #[arg(long = "no-locking")]
    pub no_locking: bool,
}

impl RunArgs {
    pub fn parse_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        RunArgs::try_parse_from(args).map_err(|e| CronError::config(e.to_string()))
    }

    pub fn mode(&self) -> RunMode {
        self.mode.unwrap_or_default()
    }
}
