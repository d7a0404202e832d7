//! Advisory cross-process locking around a run.
//!
//! The default [`FileLock`] marks a run in progress by creating
//! `<dir>/<name>.lock`. The marker is created with `create_new`, so on a
//! local filesystem the existence check and the creation are one operation.
//! A marker left behind by a crashed process blocks later runs until it is
//! removed by hand.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::CronError;
use crate::Result;

const DEFAULT_LOCK_NAME: &str = "cron";

/// Cross-process mutual exclusion for a run.
pub trait LockManager: Send + Sync {
    /// Takes the lock. `due` lists the schedule expressions about to fire.
    fn acquire<'a>(&'a self, due: &'a [String]) -> BoxFuture<'a, Result<()>>;

    /// Gives the lock back. Releasing a lock that is not held succeeds.
    fn release(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether this process currently holds the lock.
    fn is_held(&self) -> bool;
}

/// Lock marker file on disk.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    held: AtomicBool,
}

impl FileLock {
    /// A lock at `<dir>/<name>.lock`.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        FileLock {
            path: dir.as_ref().join(format!("{}.lock", name)),
            held: AtomicBool::new(false),
        }
    }

    /// A lock in `dir` named after the running executable, falling back to `cron.lock`.
    pub fn for_current_exe(dir: impl AsRef<Path>) -> Self {
        let name = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCK_NAME.to_string());
        FileLock::new(dir, &name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn create_marker(&self, due: &[String]) -> Result<()> {
        if self.held.load(Ordering::SeqCst) {
            return Err(CronError::AlreadyRunning);
        }

        info!(path = %self.path.display(), due = ?due, "locking");
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(CronError::LockConflict {
                    path: self.path.clone(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        self.held.store(true, Ordering::SeqCst);

        file.write_all(b"1").await?;
        file.flush().await?;
        Ok(())
    }

    async fn remove_marker(&self) -> Result<()> {
        if !self.held.swap(false, Ordering::SeqCst) {
            debug!(path = %self.path.display(), "lock not held, nothing to release");
            return Ok(());
        }

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "released lock");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl LockManager for FileLock {
    fn acquire<'a>(&'a self, due: &'a [String]) -> BoxFuture<'a, Result<()>> {
        self.create_marker(due).boxed()
    }

    fn release(&self) -> BoxFuture<'_, Result<()>> {
        self.remove_marker().boxed()
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// A lock that never blocks and never touches the filesystem.
#[derive(Debug, Default)]
pub struct NoLock;

impl LockManager for NoLock {
    fn acquire<'a>(&'a self, _due: &'a [String]) -> BoxFuture<'a, Result<()>> {
        future::ready(Ok(())).boxed()
    }

    fn release(&self) -> BoxFuture<'_, Result<()>> {
        future::ready(Ok(())).boxed()
    }

    fn is_held(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path(), "cronfile");

        lock.acquire(&[]).await.unwrap();
        assert!(lock.is_held());
        assert_eq!(std::fs::read_to_string(lock.path()).unwrap(), "1");

        lock.release().await.unwrap();
        assert!(!lock.is_held());
        assert!(!lock.path().exists());
    }

    #[tokio::test]
    async fn test_acquire_twice_in_process() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path(), "cronfile");

        lock.acquire(&[]).await.unwrap();
        let err = lock.acquire(&[]).await.unwrap_err();
        assert!(matches!(err, CronError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_existing_marker_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let other = FileLock::new(dir.path(), "cronfile");
        let lock = FileLock::new(dir.path(), "cronfile");

        other.acquire(&[]).await.unwrap();
        let err = lock.acquire(&["* * * * *".to_string()]).await.unwrap_err();
        assert!(matches!(err, CronError::LockConflict { ref path } if path == other.path()));

        // The loser must not remove the winner's marker.
        lock.release().await.unwrap();
        assert!(other.path().exists());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path(), "cronfile");

        lock.acquire(&[]).await.unwrap();
        std::fs::remove_file(lock.path()).unwrap();
        lock.release().await.unwrap();
        lock.release().await.unwrap();
    }

    #[test]
    fn test_current_exe_name() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::for_current_exe(dir.path());
        let file_name = lock.path().file_name().unwrap().to_string_lossy();
        assert!(file_name.ends_with(".lock"));
        assert_eq!(lock.path().parent().unwrap(), dir.path());
    }

    #[tokio::test]
    async fn test_no_lock() {
        let lock = NoLock;
        lock.acquire(&[]).await.unwrap();
        assert!(!lock.is_held());
        lock.release().await.unwrap();
    }
}
