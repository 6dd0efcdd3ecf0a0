//! The running-operation counter and the indicator it drives.
//!
//! Every started operation increments the counter and every finalized one decrements it. The
//! indicator is shown when the counter leaves zero and hidden when it returns there, except
//! when a finishing operation hands off to the next link of its chain: then the indicator
//! stays up, and is swapped if the next link names a different one.
//!
//! Counter and indicator change together under one lock, so concurrent chains cannot hide the
//! indicator while another operation is still running.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::log::{error, trace, warn};
use crate::progress::ProgressIndicator;

pub const DEFAULT_INDICATOR: &str = "default";

/// Shown for connectivity and backend failures whatever the caller registered.
pub const CONNECTION_FAILED_MESSAGE: &str =
    "Connection failed. Check your network connection and try again.";

/// Shows short messages to the user.
pub trait UserNotifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Sends user messages to the log.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogNotifier;

impl UserNotifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Keeps every message, for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UserNotifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

impl<N: UserNotifier + ?Sized> UserNotifier for Arc<N> {
    fn notify(&self, message: &str) {
        (**self).notify(message);
    }
}

struct TrackerState {
    running: AtomicUsize,
    visible: Mutex<Option<String>>,
    indicator: Box<dyn ProgressIndicator>,
    notifier: Box<dyn UserNotifier>,
}

/// Shared between every operation that should drive the same indicator. Cloning shares the
/// counter.
#[derive(Clone)]
pub struct OperationTracker {
    state: Arc<TrackerState>,
}

impl OperationTracker {
    #[must_use]
    pub fn new(
        indicator: impl ProgressIndicator + 'static,
        notifier: impl UserNotifier + 'static,
    ) -> Self {
        Self {
            state: Arc::new(TrackerState {
                running: AtomicUsize::new(0),
                visible: Mutex::new(None),
                indicator: Box::new(indicator),
                notifier: Box::new(notifier),
            }),
        }
    }

    /// Operations started and not yet finalized.
    #[must_use]
    pub fn running(&self) -> usize {
        self.state.running.load(Ordering::SeqCst)
    }

    /// The indicator currently shown, if any.
    #[must_use]
    pub fn visible_indicator(&self) -> Option<String> {
        self.lock_visible().clone()
    }

    fn lock_visible(&self) -> MutexGuard<'_, Option<String>> {
        self.state
            .visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn begin(&self, indicator: &str) {
        let mut visible = self.lock_visible();
        let running = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("operation started on {}, {} running", indicator, running);
        match visible.as_deref() {
            Some(current) if current == indicator => {}
            Some(current) => {
                self.state.indicator.hide(current);
                self.state.indicator.show(indicator);
                *visible = Some(indicator.to_string());
            }
            None => {
                self.state.indicator.show(indicator);
                *visible = Some(indicator.to_string());
            }
        }
    }

    /// Counts one operation as finished. `handing_off` is set when the next link of a chain
    /// is about to start, which keeps the indicator up.
    pub(crate) fn end(&self, handing_off: bool) {
        let mut visible = self.lock_visible();
        let previous = self
            .state
            .running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        let running = match previous {
            Ok(previous) => previous - 1,
            Err(_) => {
                error!("operation finalized with no operation running");
                0
            }
        };
        trace!("operation finalized, {} running", running);
        if running == 0 && !handing_off {
            if let Some(name) = visible.take() {
                self.state.indicator.hide(&name);
            }
        }
    }

    pub(crate) fn notify(&self, message: &str) {
        self.state.notifier.notify(message);
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new(crate::progress::NullIndicator, LogNotifier)
    }
}
