//! Job bodies and their single adapted form.
//!
//! A [`Task`] is built once, at registration, from one of three shapes:
//!
//! * [`Task::callback`]: the body receives a [`Done`] handle and signals
//!   completion through it, possibly from another thread.
//! * [`Task::future`]: the body returns a future resolving to a `Result`.
//! * [`Task::blocking`]: the body runs to completion synchronously and is
//!   moved onto tokio's blocking pool.
//!
//! Whatever the shape, invoking a task yields the same boxed future, and a
//! panic anywhere inside the body comes back as an `Err` instead of
//! unwinding into the scheduler.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::error::BoxError;

/// Outcome of a single job invocation.
pub type JobResult = std::result::Result<(), BoxError>;

type RunFn = dyn Fn() -> BoxFuture<'static, JobResult> + Send + Sync;

/// Completion handle passed to [`Task::callback`] bodies.
///
/// Every method consumes the handle, so completion is signalled at most
/// once. Dropping it without signalling counts as a failure.
pub struct Done {
    tx: oneshot::Sender<JobResult>,
}

impl Done {
    /// Signals success.
    pub fn ok(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Signals failure with `err`.
    pub fn err<E>(self, err: E)
    where
        E: Into<BoxError>,
    {
        let _ = self.tx.send(Err(err.into()));
    }

    /// Signals whatever `result` holds.
    pub fn finish<E>(self, result: std::result::Result<(), E>)
    where
        E: Into<BoxError>,
    {
        let _ = self.tx.send(result.map_err(Into::into));
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").finish_non_exhaustive()
    }
}

/// A registered job body in its adapted form.
///
/// Cloning is cheap: clones share the same wrapped body.
#[derive(Clone)]
pub struct Task {
    run: Arc<RunFn>,
}

impl Task {
    /// A body that signals completion explicitly through [`Done`].
    ///
    /// ```rust
    /// use cronfile::Task;
    ///
    /// let task = Task::callback(|done| {
    ///     std::thread::spawn(move || {
    ///         // ...
    ///         done.ok();
    ///     });
    /// });
    /// ```
    pub fn callback<F>(f: F) -> Task
    where
        F: Fn(Done) + Send + Sync + 'static,
    {
        Task {
            run: Arc::new(move || {
                let (tx, rx) = oneshot::channel();
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(Done { tx }))) {
                    return future::ready(Err(panic_error(payload))).boxed();
                }

                async move {
                    rx.await.unwrap_or_else(|_| {
                        Err("job dropped its completion handle without signalling".into())
                    })
                }
                .boxed()
            }),
        }
    }

    /// A body returning a future.
    ///
    /// ```rust
    /// use cronfile::Task;
    ///
    /// let task = Task::future(|| async {
    ///     // ...
    ///     Ok::<(), std::io::Error>(())
    /// });
    /// ```
    pub fn future<F, Fut, E>(f: F) -> Task
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Task {
            run: Arc::new(move || match panic::catch_unwind(AssertUnwindSafe(&f)) {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .map(|outcome| match outcome {
                        Ok(result) => result.map_err(Into::into),
                        Err(payload) => Err(panic_error(payload)),
                    })
                    .boxed(),
                Err(payload) => future::ready(Err(panic_error(payload))).boxed(),
            }),
        }
    }

    /// A synchronous body, run on the blocking thread pool.
    ///
    /// ```rust
    /// use cronfile::Task;
    ///
    /// let task = Task::blocking(|| {
    ///     std::fs::write("/tmp/heartbeat", b"1")
    /// });
    /// ```
    pub fn blocking<F, E>(f: F) -> Task
    where
        F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        let f = Arc::new(f);
        Task {
            run: Arc::new(move || {
                let f = Arc::clone(&f);
                async move {
                    match tokio::task::spawn_blocking(move || f().map_err(Into::into)).await {
                        Ok(result) => result,
                        Err(err) if err.is_panic() => Err(panic_error(err.into_panic())),
                        Err(err) => Err(Box::new(err) as BoxError),
                    }
                }
                .boxed()
            }),
        }
    }

    /// Starts one execution of the body.
    pub fn invoke(&self) -> BoxFuture<'static, JobResult> {
        (self.run)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> BoxError {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("job panicked: {}", message).into()
}
