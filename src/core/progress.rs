// ─── Progress Reporting ───
// Three-channel progress (label, value, max) written by installers and read by
// whatever front-end is listening.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Snapshot of the three progress channels.
///
/// `max == 0` means the current phase has no known size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub label: String,
    pub value: u64,
    pub max: u64,
}

/// Receiver of progress updates. Implementations must be cheap; they are called
/// once per downloaded file.
pub trait ProgressSink: Send + Sync {
    fn set_label(&self, label: &str);
    fn set_value(&self, value: u64);
    fn set_max(&self, max: u64);
}

/// Sink that discards every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_label(&self, _label: &str) {}
    fn set_value(&self, _value: u64) {}
    fn set_max(&self, _max: u64) {}
}

/// Keeps the latest snapshot and every earlier one in memory.
#[derive(Default)]
pub struct SharedProgress {
    state: Mutex<ProgressState>,
    history: Mutex<Vec<ProgressState>>,
}

impl SharedProgress {
    pub fn snapshot(&self) -> ProgressState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Every snapshot recorded so far, in emission order.
    pub fn history(&self) -> Vec<ProgressState> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    fn update(&self, apply: impl FnOnce(&mut ProgressState)) {
        if let Ok(mut state) = self.state.lock() {
            apply(&mut state);
            if let Ok(mut history) = self.history.lock() {
                history.push(state.clone());
            }
        }
    }
}

impl ProgressSink for SharedProgress {
    fn set_label(&self, label: &str) {
        self.update(|s| s.label = label.to_string());
    }

    fn set_value(&self, value: u64) {
        self.update(|s| s.value = value);
    }

    fn set_max(&self, max: u64) {
        self.update(|s| s.max = max);
    }
}

/// Counter for one phase of work.
///
/// Starting a phase resets the value before publishing the new maximum, so a
/// listener never observes `value > max`.
pub struct PhaseProgress<'a> {
    sink: &'a dyn ProgressSink,
    value: AtomicU64,
    max: u64,
}

impl<'a> PhaseProgress<'a> {
    pub fn begin(sink: &'a dyn ProgressSink, label: &str, max: u64) -> Self {
        sink.set_label(label);
        sink.set_value(0);
        sink.set_max(max);
        Self {
            sink,
            value: AtomicU64::new(0),
            max,
        }
    }

    pub fn advance(&self, units: u64) {
        let current = self.value.fetch_add(units, Ordering::SeqCst) + units;
        let clamped = if self.max > 0 {
            current.min(self.max)
        } else {
            current
        };
        self.sink.set_value(clamped);
    }

    pub fn finish(&self) {
        if self.max > 0 {
            self.value.store(self.max, Ordering::SeqCst);
            self.sink.set_value(self.max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_never_reports_value_above_max() {
        let sink = SharedProgress::default();
        {
            let phase = PhaseProgress::begin(&sink, "Downloading libraries", 3);
            for _ in 0..5 {
                phase.advance(1);
            }
        }
        {
            let phase = PhaseProgress::begin(&sink, "Downloading assets", 2);
            phase.advance(1);
            phase.finish();
        }

        for state in sink.history() {
            if state.max > 0 {
                assert!(state.value <= state.max, "{state:?}");
            }
        }
        assert_eq!(
            sink.snapshot(),
            ProgressState {
                label: "Downloading assets".into(),
                value: 2,
                max: 2,
            }
        );
    }

    #[test]
    fn indeterminate_phase_counts_freely() {
        let sink = SharedProgress::default();
        let phase = PhaseProgress::begin(&sink, "Resolving", 0);
        phase.advance(7);
        assert_eq!(sink.snapshot().value, 7);
        assert_eq!(sink.snapshot().max, 0);
    }
}
