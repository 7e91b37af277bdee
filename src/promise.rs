use parking_lot::Mutex;
use std::{error::Error as StdError, fmt, sync::Arc};

use crate::Context;

/// Type-erased error that can be cloned into every observer and inspected
/// with `downcast_ref`.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

pub fn shared_error<E>(err: E) -> SharedError
where
    E: StdError + Send + Sync + 'static,
{
    Arc::new(err)
}

type OutcomeObserver<V, E> = Box<dyn FnOnce(Result<V, E>) + Send>;
type SuccessObserver<V> = Box<dyn FnOnce(V) + Send>;
type FailureObserver<E> = Box<dyn FnOnce(E) + Send>;

enum State<V, E> {
    Pending,
    Settled(Result<V, E>),
}

struct Inner<V, E> {
    state: State<V, E>,
    /// Links to derived promises. Run before `done`/`catch` observers.
    outcome_observers: Vec<OutcomeObserver<V, E>>,
    success_observers: Vec<SuccessObserver<V>>,
    failure_observers: Vec<FailureObserver<E>>,
    /// Set while a dispatch task is draining the queues. Other dispatch
    /// tasks back off and leave new observers to the running one.
    dispatching: bool,
}

impl<V, E> Inner<V, E> {
    fn is_settled(&self) -> bool {
        matches!(self.state, State::Settled(_))
    }

    fn has_observers(&self) -> bool {
        !(self.outcome_observers.is_empty()
            && self.success_observers.is_empty()
            && self.failure_observers.is_empty())
    }
}

struct Shared<V, E> {
    inner: Mutex<Inner<V, E>>,
    context: Context,
}

impl<V, E> Shared<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn settle(self: &Arc<Self>, outcome: Result<V, E>) {
        let mut inner = self.inner.lock();
        if inner.is_settled() {
            log::debug!("ignoring repeated settle of an already settled promise");
            return;
        }
        log::trace!("promise settled");
        inner.state = State::Settled(outcome);
        let queued = inner.has_observers();
        drop(inner);
        if queued {
            self.schedule();
        }
    }

    /// Adds observers under the lock. A settled promise gets a dispatch
    /// posted right away so late observers still fire.
    fn register<F>(self: &Arc<Self>, push: F)
    where
        F: FnOnce(&mut Inner<V, E>),
    {
        let mut inner = self.inner.lock();
        push(&mut inner);
        let settled = inner.is_settled();
        drop(inner);
        if settled {
            self.schedule();
        }
    }

    fn schedule(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        self.context.enqueue(move || shared.dispatch());
    }

    /// Drains the queues in batches until they stay empty. Only one
    /// dispatch runs per promise at a time, so observers fire in
    /// registration order even when the scheduler runs tasks in parallel.
    fn dispatch(&self) {
        let mut inner = self.inner.lock();
        if inner.dispatching {
            return;
        }
        let outcome = match &inner.state {
            State::Settled(outcome) => outcome.clone(),
            State::Pending => return,
        };
        inner.dispatching = true;
        loop {
            if !inner.has_observers() {
                inner.dispatching = false;
                return;
            }
            let outcome_observers = std::mem::take(&mut inner.outcome_observers);
            let success_observers = std::mem::take(&mut inner.success_observers);
            let failure_observers = std::mem::take(&mut inner.failure_observers);
            drop(inner);

            log::trace!(
                "dispatching {} outcome, {} success and {} failure observers",
                outcome_observers.len(),
                success_observers.len(),
                failure_observers.len()
            );
            for observer in outcome_observers {
                observer(outcome.clone());
            }
            match &outcome {
                Ok(value) => {
                    for observer in success_observers {
                        observer(value.clone());
                    }
                }
                Err(error) => {
                    for observer in failure_observers {
                        observer(error.clone());
                    }
                }
            }
            inner = self.inner.lock();
        }
    }
}

/// The capability handed to a producer. The first outcome given to any
/// clone of it settles the promise; later ones are ignored.
pub struct Settle<V, E = SharedError> {
    shared: Arc<Shared<V, E>>,
}

impl<V, E> Clone for Settle<V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, E> Settle<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn settle(&self, outcome: Result<V, E>) {
        self.shared.settle(outcome)
    }

    pub fn resolve(&self, value: V) {
        self.settle(Ok(value))
    }

    pub fn reject(&self, error: E) {
        self.settle(Err(error))
    }
}

impl<V, E> fmt::Debug for Settle<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle").finish_non_exhaustive()
    }
}

/// A value of type `V` that becomes available, or fails with `E`, exactly
/// once.
///
/// Observers never run inline with registration or settlement. Each
/// settlement posts one dispatch task to the promise's [`Context`], which
/// drains the observer queues in registration order.
///
/// # Examples
///
/// ```
/// use promise_chain::{Promise, RunLoop};
///
/// let run_loop = RunLoop::new();
/// let doubled = Promise::<i32, String>::resolved(&run_loop.context(), 21)
///     .map(|v| Ok(v * 2))
///     .done(|v| println!("got {v}"));
/// assert!(!doubled.is_settled());
/// run_loop.run_pending();
/// assert!(doubled.is_settled());
/// ```
pub struct Promise<V, E = SharedError> {
    shared: Arc<Shared<V, E>>,
}

impl<V, E> Clone for Promise<V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, E> Promise<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Runs `producer` right away, exactly once. It may settle immediately
    /// or move the [`Settle`] somewhere else and settle later, from any
    /// thread.
    pub fn new<P>(context: &Context, producer: P) -> Self
    where
        P: FnOnce(Settle<V, E>),
    {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: State::Pending,
                outcome_observers: Vec::new(),
                success_observers: Vec::new(),
                failure_observers: Vec::new(),
                dispatching: false,
            }),
            context: context.clone(),
        });
        producer(Settle {
            shared: Arc::clone(&shared),
        });
        Self { shared }
    }

    pub fn resolved(context: &Context, value: V) -> Self {
        Self::new(context, |settle| settle.resolve(value))
    }

    pub fn rejected(context: &Context, error: E) -> Self {
        Self::new(context, |settle| settle.reject(error))
    }

    /// The context this promise, and every promise derived from it,
    /// dispatches on.
    pub fn context(&self) -> &Context {
        &self.shared.context
    }

    pub fn is_settled(&self) -> bool {
        self.shared.inner.lock().is_settled()
    }

    /// Calls `on_success` with the value once this promise succeeds.
    ///
    /// The returned promise settles with this promise's outcome after
    /// `on_success` has run, so a `catch` can still follow.
    pub fn done<F>(&self, on_success: F) -> Promise<V, E>
    where
        F: FnOnce(V) + Send + 'static,
    {
        self.derive(|settle, inner| {
            let forward = settle.clone();
            inner.success_observers.push(Box::new(move |value: V| {
                on_success(value.clone());
                settle.resolve(value);
            }));
            inner
                .failure_observers
                .push(Box::new(move |error: E| forward.reject(error)));
        })
    }

    /// Calls `on_failure` with the error once this promise fails.
    ///
    /// The returned promise settles with this promise's outcome after
    /// `on_failure` has run.
    pub fn catch<F>(&self, on_failure: F) -> Promise<V, E>
    where
        F: FnOnce(E) + Send + 'static,
    {
        self.derive(|settle, inner| {
            let forward = settle.clone();
            inner.failure_observers.push(Box::new(move |error: E| {
                on_failure(error.clone());
                settle.reject(error);
            }));
            inner
                .success_observers
                .push(Box::new(move |value: V| forward.resolve(value)));
        })
    }

    /// Transforms the value. A failed source, or an `Err` from `transform`,
    /// fails the returned promise; `transform` never runs after a failure.
    pub fn map<U, F>(&self, transform: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(V) -> Result<U, E> + Send + 'static,
    {
        self.derive(|settle, inner| {
            inner
                .outcome_observers
                .push(Box::new(move |outcome: Result<V, E>| {
                    settle.settle(outcome.and_then(transform))
                }));
        })
    }

    /// Transforms the value into another promise and settles with that
    /// promise's eventual outcome.
    pub fn flat_map<U, F>(&self, transform: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(V) -> Result<Promise<U, E>, E> + Send + 'static,
    {
        self.derive(|settle, inner| {
            inner
                .outcome_observers
                .push(Box::new(move |outcome: Result<V, E>| {
                    match outcome.and_then(transform) {
                        Ok(next) => next.observe(move |outcome| settle.settle(outcome)),
                        Err(error) => settle.reject(error),
                    }
                }));
        })
    }

    /// Registers a raw outcome observer.
    pub(crate) fn observe<F>(&self, observer: F)
    where
        F: FnOnce(Result<V, E>) + Send + 'static,
    {
        self.shared
            .register(|inner| inner.outcome_observers.push(Box::new(observer)));
    }

    /// Builds a pending promise on this promise's context and lets `attach`
    /// wire its settle capability into this promise's queues. The derived
    /// promise never holds the source.
    fn derive<U, F>(&self, attach: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Settle<U, E>, &mut Inner<V, E>),
    {
        Promise::new(&self.shared.context, |settle| {
            self.shared.register(|inner| attach(settle, inner))
        })
    }
}

impl<V, E> fmt::Debug for Promise<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = self.shared.inner.lock().is_settled();
        f.debug_struct("Promise")
            .field("settled", &settled)
            .finish_non_exhaustive()
    }
}
