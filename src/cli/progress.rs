//! Terminal progress bar for analysis runs.

use indicatif::{ProgressBar, ProgressStyle};

use crate::services::progress::{ProgressEvent, ProgressReporter};

/// Renders engine progress events on an indicatif bar (stderr).
pub struct BarProgressReporter {
    bar: ProgressBar,
}

impl BarProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for BarProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarProgressReporter {
    fn report(&self, event: ProgressEvent) {
        self.bar.set_position(event.progress as u64);
        match event.error {
            Some(error) => self.bar.abandon_with_message(error),
            None if event.done => self.bar.finish_and_clear(),
            None => self.bar.set_message(event.step),
        }
    }
}
