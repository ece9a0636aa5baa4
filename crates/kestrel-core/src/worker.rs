//! Isolated worker runtimes
//!
//! A worker owns a fresh [`Runtime`] on its own OS thread. Nothing from the
//! spawning runtime crosses the boundary: the job receives the worker's
//! runtime and only its `Send` result comes back over a channel.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver};

use crate::error::{ObjectError, ObjectResult};
use crate::options::RuntimeOptions;
use crate::runtime::Runtime;

/// Handle to a running worker
pub struct WorkerHandle<T> {
    name: String,
    rx: Receiver<ObjectResult<T>>,
    thread: Option<JoinHandle<()>>,
}

/// Run `job` on a new thread with its own runtime
pub fn spawn_isolated<T, F>(
    name: &str,
    options: RuntimeOptions,
    job: F,
) -> ObjectResult<WorkerHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(&Runtime) -> ObjectResult<T> + Send + 'static,
{
    let (tx, rx) = channel::bounded(1);
    let thread_name = name.to_string();

    let thread = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let rt = Runtime::with_options(options)?;
                tracing::debug!(worker = %thread_name, "worker runtime started");
                job(&rt)
            }));
            let result = outcome.unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(worker = %thread_name, panic = %message, "worker panicked");
                Err(ObjectError::Worker(format!("{} panicked: {}", thread_name, message)))
            });
            // The handle may already be gone
            let _ = tx.send(result);
        })
        .map_err(|e| ObjectError::Worker(format!("failed to spawn {}: {}", name, e)))?;

    Ok(WorkerHandle {
        name: name.to_string(),
        rx,
        thread: Some(thread),
    })
}

impl<T> WorkerHandle<T> {
    /// Worker (thread) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the job's result
    pub fn join(mut self) -> ObjectResult<T> {
        let result = self
            .rx
            .recv()
            .map_err(|_| ObjectError::Worker(format!("{} exited without a result", self.name)))?;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }
}

impl<T> std::fmt::Debug for WorkerHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
