//! A single-settlement promise for Rust.
//!
//! A [`Promise`] is built from a *producer* closure that receives a
//! [`Settle`] capability. The first outcome handed to that capability wins;
//! every observer registered with [`Promise::done`], [`Promise::catch`],
//! [`Promise::map`] or [`Promise::flat_map`] is dispatched exactly once, and
//! always asynchronously, through the promise's [`Context`].
//!
//! # Examples
//!
//! ```
//! use promise_chain::{Promise, RunLoop};
//! use std::{thread, time::Duration};
//!
//! let run_loop = RunLoop::new();
//! let context = run_loop.context();
//! let inner = context.clone();
//! let promise = Promise::<String, String>::new(&context, |settle| {
//!     thread::spawn(move || settle.resolve("foo".into()));
//! })
//! .map(|s| Ok(s.repeat(2)))
//! .flat_map(move |s| Ok(Promise::resolved(&inner, s.len())));
//!
//! let outcome = run_loop
//!     .run_until_settled(&promise, Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(outcome, Ok(6));
//! ```
use std::time::Duration;

pub mod context;
pub mod promise;
pub mod run_loop;
pub mod waiter;

pub use context::{Context, Scheduler, Task};
pub use promise::{shared_error, Promise, Settle, SharedError};
pub use run_loop::RunLoop;
pub use waiter::Waiter;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("timed out after {0:?} waiting on the run loop")]
    TimedOut(Duration),
    #[error("failed to build execution context: {0}")]
    Io(#[from] std::io::Error),
}
