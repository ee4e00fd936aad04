use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives `(label, percent)` progress events from a run.
pub trait ProgressSink: Sync {
    fn report(&self, label: &str, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8) + Sync,
{
    fn report(&self, label: &str, percent: u8) {
        self(label, percent)
    }
}

/// Discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _label: &str, _percent: u8) {}
}

/// Drives an indicatif bar, one bar position per percent.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}%") {
            bar.set_style(style);
        }
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgress {
    fn report(&self, label: &str, percent: u8) {
        self.bar.set_message(label.to_string());
        self.bar.set_position(percent as u64);
    }
}

/// Forwards events to a sink, keeping each label's percent monotonic and
/// dropping repeats of the previous value.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<HashMap<String, u8>>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Report `done` of `total` steps under `label`.
    pub fn update(&self, label: &str, done: usize, total: usize) {
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        self.emit(label, percent);
    }

    pub fn emit(&self, label: &str, percent: u8) {
        let percent = percent.min(100);
        {
            let Ok(mut last) = self.last.lock() else {
                return;
            };
            match last.get(label) {
                Some(&prev) if percent <= prev => return,
                _ => {
                    last.insert(label.to_string(), percent);
                }
            }
        }
        self.sink.report(label, percent);
    }
}
