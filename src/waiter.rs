//! Bridges a [`Promise`] into `async`/`.await` code.
use parking_lot::Mutex;
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll, Waker},
};

use crate::Promise;

/// Awaits the outcome of a [`Promise`].
///
/// The outcome is delivered by an observer like any other, so the
/// promise's context has to be running for the future to complete.
///
/// # Examples
///
/// ```
/// use promise_chain::{Context, Promise};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let context = Context::thread_pool().unwrap();
/// let promise = Promise::<String, String>::new(&context, |settle| {
///     thread::spawn(move || settle.resolve("🍓".into()));
/// });
/// let length = promise.map(|s| Ok(s.len()));
/// assert_eq!(block_on(async { length.await }), Ok(4));
/// ```
#[derive(Debug)]
pub struct Waiter<V, E> {
    slot: Arc<Mutex<Slot<V, E>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Taken,
}

#[derive(Debug)]
struct Slot<V, E> {
    outcome: Option<Result<V, E>>,
    waker: Result<Waker, WakerState>,
}

impl<V, E> IntoFuture for Promise<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<V, E>;
    type IntoFuture = Waiter<V, E>;

    fn into_future(self) -> Self::IntoFuture {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let filled = slot.clone();
        self.observe(move |outcome| {
            let mut slot = filled.lock();
            slot.outcome = Some(outcome);
            if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Fresh)) {
                waker.wake()
            }
        });
        Waiter { slot }
    }
}

impl<V, E> Future for Waiter<V, E> {
    type Output = Result<V, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        match slot.outcome.take() {
            Some(outcome) => {
                slot.waker = Err(WakerState::Taken);
                Poll::Ready(outcome)
            }
            None => match slot.waker {
                Err(WakerState::Taken) => panic!("`Waiter` polled after completion"),
                _ => {
                    slot.waker = Ok(cx.waker().clone());
                    Poll::Pending
                }
            },
        }
    }
}
