//! The execution context a promise dispatches its observers on.
//!
//! The core only needs to hand a unit of work to something that runs it
//! later. Anything implementing [`Scheduler`] will do: a [`RunLoop`] drained
//! by the owning thread, a `futures` thread pool, or a caller-supplied queue.
//!
//! [`RunLoop`]: crate::RunLoop
use futures::executor::ThreadPool;
use std::{fmt, sync::Arc};

use crate::Error;

/// A unit of work posted to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that accepts work and runs it later.
///
/// Implementations must never run `task` inline inside `enqueue`; promises
/// rely on that to keep every observer asynchronous. Tasks may run in any
/// order and in parallel: a promise serializes its own dispatch.
pub trait Scheduler: Send + Sync {
    fn enqueue(&self, task: Task);
}

impl Scheduler for ThreadPool {
    fn enqueue(&self, task: Task) {
        self.spawn_ok(async move { task() });
    }
}

/// Shared handle to a [`Scheduler`].
///
/// # Examples
///
/// ```
/// use promise_chain::{Context, Task, Scheduler};
/// use std::sync::{mpsc, Mutex};
///
/// struct Queue(Mutex<mpsc::Sender<Task>>);
///
/// impl Scheduler for Queue {
///     fn enqueue(&self, task: Task) {
///         let _ = self.0.lock().unwrap().send(task);
///     }
/// }
///
/// let (tx, rx) = mpsc::channel();
/// let context = Context::new(Queue(Mutex::new(tx)));
/// context.enqueue(|| println!("later"));
/// (rx.recv().unwrap())();
/// ```
#[derive(Clone)]
pub struct Context {
    scheduler: Arc<dyn Scheduler>,
}

impl Context {
    pub fn new<S: Scheduler + 'static>(scheduler: S) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
        }
    }

    /// A context backed by a fresh `futures` thread pool.
    pub fn thread_pool() -> Result<Self, Error> {
        Ok(Self::new(ThreadPool::new()?))
    }

    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.scheduler.enqueue(Box::new(task));
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
