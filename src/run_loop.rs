//! A serial work queue drained by the thread that owns it.
//!
//! This is the "main queue" a caller designates for promise dispatch: any
//! thread may post to its [`Context`], but tasks only run when the owner
//! calls one of the `run_*` methods.
use parking_lot::Mutex;
use std::{
    sync::{
        mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{Context, Error, Promise, Scheduler, Task};

struct Poster {
    sender: Sender<Task>,
}

impl Scheduler for Poster {
    fn enqueue(&self, task: Task) {
        // only fails once the loop itself is gone
        if self.sender.send(task).is_err() {
            log::trace!("run loop dropped, discarding task");
        }
    }
}

/// # Examples
///
/// ```
/// use promise_chain::RunLoop;
/// use std::sync::mpsc::channel;
///
/// let run_loop = RunLoop::new();
/// let (tx, rx) = channel();
/// run_loop.context().enqueue(move || tx.send("🍓").unwrap());
/// assert_eq!(run_loop.run_pending(), 1);
/// assert_eq!(rx.recv().unwrap(), "🍓");
/// ```
pub struct RunLoop {
    context: Context,
    receiver: Receiver<Task>,
}

impl RunLoop {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            context: Context::new(Poster { sender }),
            receiver,
        }
    }

    pub fn context(&self) -> Context {
        self.context.clone()
    }

    /// Runs the next queued task, if there is one. Never blocks.
    pub fn run_next(&self) -> bool {
        match self.receiver.try_recv() {
            Ok(task) => {
                log::trace!("running run loop task");
                task();
                true
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks posted by the
    /// tasks it runs. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Runs tasks as they arrive until `condition` holds.
    pub fn run_until<F>(&self, mut condition: F, timeout: Duration) -> Result<(), Error>
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if condition() {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(task) => {
                    log::trace!("running run loop task");
                    task();
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return if condition() {
                        Ok(())
                    } else {
                        Err(Error::TimedOut(timeout))
                    };
                }
            }
        }
    }

    /// Drives the loop until `promise` settles and returns its outcome.
    ///
    /// The outcome arrives through an observer, so `promise` must dispatch
    /// on this loop or on a context that is running elsewhere.
    pub fn run_until_settled<V, E>(
        &self,
        promise: &Promise<V, E>,
        timeout: Duration,
    ) -> Result<Result<V, E>, Error>
    where
        V: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let filled = slot.clone();
        promise.observe(move |outcome| *filled.lock() = Some(outcome));
        self.run_until(|| slot.lock().is_some(), timeout)?;
        let outcome = slot.lock().take();
        outcome.ok_or(Error::TimedOut(timeout))
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}
