use std::path::PathBuf;

/// Boxed error returned by job bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
pub enum CronError {
    #[error("You cannot run the Cron library twice")]
    AlreadyRunning,
    #[error("Cron already running: lock marker {} exists", path.display())]
    LockConflict { path: PathBuf },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid cron expression: {0}")]
    ParseError(#[from] cron::error::Error),
    #[error("Job `{job}` failed: {source}")]
    JobExecution {
        job: String,
        #[source]
        source: BoxError,
    },
    #[error("Expected a listener for `{0}`, found a job")]
    TypeMismatch(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CronError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CronError::Configuration(msg.into())
    }

    pub(crate) fn job(job: impl Into<String>, source: BoxError) -> Self {
        CronError::JobExecution {
            job: job.into(),
            source,
        }
    }
}
