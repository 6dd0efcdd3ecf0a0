//! A log line written while the busy indicator is on screen would otherwise leave the tail of the
//! progress bar behind it.

use log::Record;
use log4rs::encode::{Encode, Write};

/// Wraps another encoder and clears the current console line before each record.
#[derive(Debug)]
pub struct ProgressBarClearingEncoder {
    inner: Box<dyn Encode>,
}

impl ProgressBarClearingEncoder {
    pub fn new(inner: Box<dyn Encode>) -> Self {
        Self { inner }
    }
}

impl Encode for ProgressBarClearingEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> Result<(), anyhow::Error> {
        // Erase the whole line, cursor back to column 0.
        w.write_all("\x1B[2K\r".as_bytes())?;
        self.inner.encode(w, record)
    }
}
