//! Progress reporting for long-running analysis phases.
//!
//! The engine takes an explicit reporter per run; there is no global
//! listener registry. CLI runs use an indicatif-backed reporter, library
//! callers can forward events over a channel, tests use
//! [`NoopProgressReporter`].

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// One progress update. `done` and `error` mark the terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 0 to 100.
    pub progress: u8,
    pub step: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}

/// Receives progress events. Implementations should be fire-and-forget
/// (never fail the caller) and cheap: they are called from worker threads.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for tests and callers without progress support.
pub struct NoopProgressReporter;

impl ProgressReporter for NoopProgressReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Shorthand for creating a no-op reporter.
pub fn noop_progress() -> Arc<dyn ProgressReporter> {
    Arc::new(NoopProgressReporter)
}

/// Forwards events to a tokio channel. A dropped receiver is ignored.
pub struct ChannelProgressReporter {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelProgressReporter {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

/// Per-run wrapper enforcing the channel contract: progress never moves
/// backwards and at most one terminal event (`done` or `error`) is emitted.
///
/// Reports are serialized under a lock so concurrent search workers cannot
/// deliver an older value after a newer one.
pub struct RunProgress {
    inner: Arc<dyn ProgressReporter>,
    state: Mutex<RunState>,
}

#[derive(Default)]
struct RunState {
    last: u8,
    finished: bool,
}

impl RunProgress {
    pub fn new(inner: Arc<dyn ProgressReporter>) -> Self {
        Self {
            inner,
            state: Mutex::new(RunState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Report an intermediate step. Ignored after the terminal event.
    pub fn update(&self, progress: u8, step: &str) {
        let mut state = self.state();
        if state.finished {
            return;
        }
        state.last = state.last.max(progress.min(99));
        self.inner.report(ProgressEvent {
            progress: state.last,
            step: step.to_string(),
            done: false,
            error: None,
        });
    }

    /// Report `step` of `total_steps` within the `[start, end]` percent band.
    pub fn update_within(&self, start: u8, end: u8, step: usize, total_steps: usize, msg: &str) {
        let span = end.saturating_sub(start) as f64;
        let frac = if total_steps == 0 {
            1.0
        } else {
            step as f64 / total_steps as f64
        };
        self.update(start + (span * frac).round() as u8, msg);
    }

    pub fn done(&self, step: &str) {
        let mut state = self.state();
        if state.finished {
            return;
        }
        state.finished = true;
        state.last = 100;
        self.inner.report(ProgressEvent {
            progress: 100,
            step: step.to_string(),
            done: true,
            error: None,
        });
    }

    pub fn fail(&self, error: &str) {
        let mut state = self.state();
        if state.finished {
            return;
        }
        state.finished = true;
        self.inner.report(ProgressEvent {
            progress: state.last,
            step: "failed".to_string(),
            done: false,
            error: Some(error.to_string()),
        });
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }
}
