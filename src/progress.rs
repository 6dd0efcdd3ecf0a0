//! Busy indicators shown while store operations are in flight.
//!
//! The `OperationTracker` decides when an indicator is visible; implementations here only draw
//! it. Each indicator has a name, so a screen can keep separate spinners for separate kinds of
//! work. Only one is visible at a time.
//!
//! With the `progress_bar` feature, `ConsoleIndicator` draws a one-step bar on the terminal.
//! `NullIndicator` draws nothing and `RecordingIndicator` keeps a log of show/hide calls for
//! tests.

use std::sync::{Mutex, PoisonError};

use crate::log::trace;
#[cfg(feature = "progress_bar")]
use progress_bar::{
    finalize_progress_bar, init_progress_bar, set_progress_bar_action, set_progress_bar_progress,
    Color, Style,
};

pub trait ProgressIndicator: Send + Sync {
    fn show(&self, name: &str);
    fn hide(&self, name: &str);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NullIndicator;

impl ProgressIndicator for NullIndicator {
    fn show(&self, _name: &str) {}
    fn hide(&self, _name: &str) {}
}

/// Draws the indicator as a console progress bar labelled with its name.
#[cfg(feature = "progress_bar")]
#[derive(Copy, Clone, Debug, Default)]
pub struct ConsoleIndicator;

#[cfg(feature = "progress_bar")]
impl ProgressIndicator for ConsoleIndicator {
    fn show(&self, name: &str) {
        trace!("showing progress indicator {}", name);
        init_progress_bar(1);
        set_progress_bar_action(name, Color::Blue, Style::Bold);
    }

    fn hide(&self, name: &str) {
        trace!("hiding progress indicator {}", name);
        set_progress_bar_progress(1);
        finalize_progress_bar();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndicatorEvent {
    Shown(String),
    Hidden(String),
}

#[derive(Debug, Default)]
pub struct RecordingIndicator {
    events: Mutex<Vec<IndicatorEvent>>,
}

impl RecordingIndicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<IndicatorEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: IndicatorEvent) {
        trace!("indicator {:?}", event);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl ProgressIndicator for RecordingIndicator {
    fn show(&self, name: &str) {
        self.record(IndicatorEvent::Shown(name.to_string()));
    }

    fn hide(&self, name: &str) {
        self.record(IndicatorEvent::Hidden(name.to_string()));
    }
}

impl<P: ProgressIndicator + ?Sized> ProgressIndicator for std::sync::Arc<P> {
    fn show(&self, name: &str) {
        (**self).show(name);
    }

    fn hide(&self, name: &str) {
        (**self).hide(name);
    }
}

impl<P: ProgressIndicator + ?Sized> ProgressIndicator for Box<P> {
    fn show(&self, name: &str) {
        (**self).show(name);
    }

    fn hide(&self, name: &str) {
        (**self).hide(name);
    }
}
