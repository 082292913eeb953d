//! Progress reporting and cancellation for a running backtest.

use crate::domain::DailySnapshot;
use std::sync::atomic::{AtomicBool, Ordering};

/// Observer for per-day progress. Called from the thread running the loop.
pub trait RunProgress: Send + Sync {
    fn on_start(&self, _total_days: usize) {}

    fn on_day(&self, _day_index: usize, _total_days: usize, _snapshot: &DailySnapshot) {}
}

/// Cancellation flag and progress sink for one run.
#[derive(Clone, Copy, Default)]
pub struct RunControl<'a> {
    cancel: Option<&'a AtomicBool>,
    progress: Option<&'a dyn RunProgress>,
}

impl<'a> RunControl<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn RunProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    pub(crate) fn start(&self, total_days: usize) {
        if let Some(p) = self.progress {
            p.on_start(total_days);
        }
    }

    pub(crate) fn day(&self, day_index: usize, total_days: usize, snapshot: &DailySnapshot) {
        if let Some(p) = self.progress {
            p.on_day(day_index, total_days, snapshot);
        }
    }
}
