//! A result that may not have arrived yet.
//!
//! A `PendingResult` ends in one of three ways: a value (possibly empty), an error, or being
//! dropped by whoever was going to produce it. It is either resolved already, driven by a
//! future, or fed through a `Resolver` from another task or thread.

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::StoreError;

pub(crate) enum Signal<T> {
    Value(Option<T>),
    Exception(StoreError),
    /// The producer went away without resolving.
    Removed,
}

impl<T> From<Result<Option<T>, StoreError>> for Signal<T> {
    fn from(result: Result<Option<T>, StoreError>) -> Self {
        match result {
            Ok(value) => Signal::Value(value),
            Err(error) => Signal::Exception(error),
        }
    }
}

enum State<T> {
    Ready(Signal<T>),
    Future(LocalBoxFuture<'static, Signal<T>>),
    Channel(oneshot::Receiver<Signal<T>>),
}

/// What `poll_now` found.
pub(crate) enum Polled<T> {
    Ready(Signal<T>),
    Waiting(LocalBoxFuture<'static, Signal<T>>),
}

#[must_use]
pub struct PendingResult<T> {
    state: State<T>,
}

impl<T: 'static> PendingResult<T> {
    pub fn value(value: T) -> Self {
        Self {
            state: State::Ready(Signal::Value(Some(value))),
        }
    }

    pub fn empty() -> Self {
        Self {
            state: State::Ready(Signal::Value(None)),
        }
    }

    pub fn failed(error: StoreError) -> Self {
        Self {
            state: State::Ready(Signal::Exception(error)),
        }
    }

    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, StoreError>> + 'static,
    {
        Self::from_optional_future(future.map(|result| result.map(Some)))
    }

    pub fn from_optional_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<T>, StoreError>> + 'static,
    {
        Self {
            state: State::Future(future.map(Signal::from).boxed_local()),
        }
    }

    /// A pending result fed by the returned `Resolver`. Dropping the resolver without using it
    /// invalidates the result.
    pub fn channel() -> (Resolver<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            Resolver { sender },
            Self {
                state: State::Channel(receiver),
            },
        )
    }

    /// Whether the outcome is already known without waiting. A channel that has been fed or
    /// abandoned is settled on the spot.
    pub fn is_resolved(&mut self) -> bool {
        if let State::Channel(receiver) = &mut self.state {
            match receiver.try_recv() {
                Ok(signal) => self.state = State::Ready(signal),
                Err(TryRecvError::Closed) => self.state = State::Ready(Signal::Removed),
                Err(TryRecvError::Empty) => {}
            }
        }
        matches!(self.state, State::Ready(_))
    }

    pub(crate) fn poll_now(self) -> Polled<T> {
        match self.state {
            State::Ready(signal) => Polled::Ready(signal),
            State::Future(future) => Polled::Waiting(future),
            State::Channel(mut receiver) => match receiver.try_recv() {
                Ok(signal) => Polled::Ready(signal),
                Err(TryRecvError::Closed) => Polled::Ready(Signal::Removed),
                Err(TryRecvError::Empty) => Polled::Waiting(
                    async move { receiver.await.unwrap_or(Signal::Removed) }.boxed_local(),
                ),
            },
        }
    }

    /// Waits for the outcome outside of an `AsyncOperation`.
    ///
    /// # Errors
    /// The error the result failed with, or `StoreError::Invalidated` if it was dropped.
    pub async fn wait(self) -> Result<Option<T>, StoreError> {
        let signal = match self.poll_now() {
            Polled::Ready(signal) => signal,
            Polled::Waiting(future) => future.await,
        };
        match signal {
            Signal::Value(value) => Ok(value),
            Signal::Exception(error) => Err(error),
            Signal::Removed => Err(StoreError::Invalidated),
        }
    }
}

/// The producing end of `PendingResult::channel`.
pub struct Resolver<T> {
    sender: oneshot::Sender<Signal<T>>,
}

impl<T> Resolver<T> {
    fn send(self, signal: Signal<T>) {
        // A dropped receiver means nobody is interested any more.
        let _ = self.sender.send(signal);
    }

    pub fn resolve(self, value: T) {
        self.send(Signal::Value(Some(value)));
    }

    pub fn resolve_empty(self) {
        self.send(Signal::Value(None));
    }

    pub fn fail(self, error: StoreError) {
        self.send(Signal::Exception(error));
    }

    pub fn settle(self, result: Result<T, StoreError>) {
        match result {
            Ok(value) => self.resolve(value),
            Err(error) => self.fail(error),
        }
    }

    /// Whether the pending side has been dropped.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}
