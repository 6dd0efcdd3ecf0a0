//! `AsyncOperation`: one pending store call plus what to do when it settles.
//!
//! An operation moves through `Pending`, then `Succeeded` or `Failed`, then `Finalized`.
//! Starting it counts it in the `OperationTracker`, which keeps a busy indicator visible while
//! anything is running. Whatever the outcome, the operation is finalized exactly once: the
//! `finally` callback runs, the counter is decremented, and the next operation of the chain,
//! if any, is started.
//!
//! ```ignore
//! let tracker = OperationTracker::new(ConsoleIndicator, LogNotifier);
//! let service = missions.clone();
//! AsyncOperation::new(PendingResult::from_future(async move { service.create(&mut mission).await }))
//!     .on_success(|created| show(created))
//!     .error_message("Could not save the mission.")
//!     .next(AsyncOperation::new(reload_list()))
//!     .start(&tracker)
//!     .await;
//! ```
//!
//! Callbacks run on the task that polls the returned `Completion`; nothing here is `Send`.
//! Store calls that should not run on that task go through `WorkerPool::submit`, whose
//! `PendingResult` is delivered back here.

mod pending;
mod tracker;

pub use pending::{PendingResult, Resolver};
pub use tracker::{
    LogNotifier, OperationTracker, RecordingNotifier, UserNotifier, CONNECTION_FAILED_MESSAGE,
    DEFAULT_INDICATOR,
};

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use pending::{Polled, Signal};
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::error::StoreError;
use crate::log::{debug, error, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperationState {
    /// Built but not started.
    Created,
    Pending,
    Succeeded,
    Failed,
    Finalized,
}

/// Observes an operation's state after it has been handed to `start`.
#[derive(Clone, Debug)]
pub struct OperationStatus(Rc<Cell<OperationState>>);

impl OperationStatus {
    fn new() -> Self {
        Self(Rc::new(Cell::new(OperationState::Created)))
    }

    #[must_use]
    pub fn get(&self) -> OperationState {
        self.0.get()
    }

    fn set(&self, state: OperationState) {
        self.0.set(state);
    }
}

type SuccessCallback<T> = Box<dyn FnOnce(Option<T>)>;
type ExceptionCallback = Box<dyn FnOnce(&StoreError)>;
type Finalizer = Box<dyn FnOnce()>;

/// Everything but the pending result: what runs once it settles.
struct Handlers<T> {
    indicator: String,
    on_success: Option<SuccessCallback<T>>,
    on_exception: Option<ExceptionCallback>,
    error_message: Option<String>,
    finalizer: Option<Finalizer>,
    mark_resolved: Vec<Resolver<()>>,
    next: Option<Box<dyn ChainLink>>,
    status: OperationStatus,
}

#[must_use]
pub struct AsyncOperation<T: 'static> {
    pending: PendingResult<T>,
    handlers: Handlers<T>,
}

impl<T: 'static> AsyncOperation<T> {
    pub fn new(pending: PendingResult<T>) -> Self {
        Self {
            pending,
            handlers: Handlers {
                indicator: DEFAULT_INDICATOR.to_string(),
                on_success: None,
                on_exception: None,
                error_message: None,
                finalizer: None,
                mark_resolved: Vec::new(),
                next: None,
                status: OperationStatus::new(),
            },
        }
    }

    /// Names the indicator shown while this operation runs.
    pub fn indicator(mut self, name: &str) -> Self {
        self.handlers.indicator = name.to_string();
        self
    }

    /// Called with the value, which is `None` when the result resolved empty.
    pub fn on_success(mut self, callback: impl FnOnce(Option<T>) + 'static) -> Self {
        self.handlers.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_exception(mut self, callback: impl FnOnce(&StoreError) + 'static) -> Self {
        self.handlers.on_exception = Some(Box::new(callback));
        self
    }

    /// Shown to the user if the operation fails with an application error.
    pub fn error_message(mut self, message: &str) -> Self {
        self.handlers.error_message = Some(message.to_string());
        self
    }

    /// Runs after every outcome, before the next operation starts.
    pub fn finally(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.handlers.finalizer = Some(Box::new(callback));
        self
    }

    /// Resolves `resolver` when this operation succeeds.
    pub fn resolve_on_success(mut self, resolver: Resolver<()>) -> Self {
        self.handlers.mark_resolved.push(resolver);
        self
    }

    /// Starts `operation` once this one is finalized. Calling `next` again appends to the end
    /// of the chain.
    pub fn next<U: 'static>(mut self, operation: AsyncOperation<U>) -> Self {
        self.append(Box::new(operation));
        self
    }

    fn append(&mut self, link: Box<dyn ChainLink>) {
        match &mut self.handlers.next {
            Some(next) => next.append_link(link),
            None => self.handlers.next = Some(link),
        }
    }

    pub fn status(&self) -> OperationStatus {
        self.handlers.status.clone()
    }

    /// Starts the operation. If the result is already known it settles before this returns;
    /// otherwise the returned `Completion` has to be polled for it to settle.
    pub fn start(self, tracker: &OperationTracker) -> Completion {
        let Self { pending, handlers } = self;
        tracker.begin(&handlers.indicator);
        handlers.status.set(OperationState::Pending);
        match pending.poll_now() {
            Polled::Ready(signal) => handlers.settle(signal, tracker),
            Polled::Waiting(future) => {
                let tracker = tracker.clone();
                Completion::waiting(
                    async move {
                        let signal = future.await;
                        handlers.settle(signal, &tracker).await;
                    }
                    .boxed_local(),
                )
            }
        }
    }

    /// Starts the operation on the current `LocalSet`, so it settles without the caller
    /// holding on to the `Completion`.
    pub fn spawn_local(self, tracker: &OperationTracker) -> tokio::task::JoinHandle<()> {
        let completion = self.start(tracker);
        tokio::task::spawn_local(completion)
    }
}

impl<T: 'static> Handlers<T> {
    fn settle(mut self, signal: Signal<T>, tracker: &OperationTracker) -> Completion {
        match signal {
            Signal::Value(value) => {
                self.status.set(OperationState::Succeeded);
                if let Some(callback) = self.on_success.take() {
                    callback(value);
                }
                for resolver in self.mark_resolved.drain(..) {
                    resolver.resolve(());
                }
            }
            Signal::Exception(error) => {
                self.status.set(OperationState::Failed);
                self.report(&error, tracker);
            }
            Signal::Removed => {
                debug!("pending result on {} was dropped before it resolved", self.indicator);
            }
        }
        self.finalize(tracker)
    }

    fn report(&mut self, error: &StoreError, tracker: &OperationTracker) {
        let handled = self.on_exception.is_some() || self.error_message.is_some();
        if let Some(callback) = self.on_exception.take() {
            callback(error);
        }
        if error.is_connectivity() || error.is_backend_failure() {
            error!("{}", error);
            tracker.notify(CONNECTION_FAILED_MESSAGE);
        } else if let Some(message) = self.error_message.take() {
            tracker.notify(&message);
        }
        if !handled {
            warn!("unhandled operation failure: {}", error);
        }
    }

    fn finalize(mut self, tracker: &OperationTracker) -> Completion {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer();
        }
        self.status.set(OperationState::Finalized);
        match self.next.take() {
            Some(next) => {
                tracker.end(true);
                next.start_link(tracker)
            }
            None => {
                tracker.end(false);
                Completion::done()
            }
        }
    }
}

/// A chained operation with its value type erased.
trait ChainLink {
    fn start_link(self: Box<Self>, tracker: &OperationTracker) -> Completion;
    fn append_link(&mut self, link: Box<dyn ChainLink>);
}

impl<T: 'static> ChainLink for AsyncOperation<T> {
    fn start_link(self: Box<Self>, tracker: &OperationTracker) -> Completion {
        (*self).start(tracker)
    }

    fn append_link(&mut self, link: Box<dyn ChainLink>) {
        self.append(link);
    }
}

/// Resolves once an operation and everything chained after it has been finalized.
#[must_use = "a started operation only settles while its completion is polled"]
pub struct Completion {
    future: Option<LocalBoxFuture<'static, ()>>,
}

impl Completion {
    fn done() -> Self {
        Self { future: None }
    }

    fn waiting(future: LocalBoxFuture<'static, ()>) -> Self {
        Self {
            future: Some(future),
        }
    }

    /// Whether the whole chain settled during `start`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.future.is_none()
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.future.as_mut() {
            None => Poll::Ready(()),
            Some(future) => {
                let poll = future.as_mut().poll(cx);
                if poll.is_ready() {
                    self.future = None;
                }
                poll
            }
        }
    }
}

/// Builds a chain of operations of different value types, run one after the other.
#[derive(Default)]
#[must_use]
pub struct OperationChain {
    head: Option<Box<dyn ChainLink>>,
    len: usize,
}

impl OperationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<T: 'static>(mut self, operation: AsyncOperation<T>) -> Self {
        match &mut self.head {
            Some(head) => head.append_link(Box::new(operation)),
            None => self.head = Some(Box::new(operation)),
        }
        self.len += 1;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn start(self, tracker: &OperationTracker) -> Completion {
        match self.head {
            Some(head) => head.start_link(tracker),
            None => Completion::done(),
        }
    }
}
