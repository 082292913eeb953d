//! Background run handle.
//!
//! A `RunHandle` owns one run executing on a named worker thread. The host
//! polls status, drains progress events from an `mpsc` channel, requests
//! cooperative cancellation and finally collects the outcome with `wait()`.
//! The worker checks the cancel flag once per day before the day starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use backlab_core::data::{PriceProvider, Universe};
use backlab_core::domain::DailySnapshot;
use backlab_core::engine::{RunControl, RunProgress, RunStatus};
use chrono::NaiveDate;
use tracing::warn;

use crate::config::RunConfig;
use crate::data_loader::LoadedData;
use crate::result::RunOutcome;
use crate::runner::{load_for, run_to_outcome, RunError};

/// Progress messages sent from the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        total_days: usize,
    },
    Day {
        day_index: usize,
        total_days: usize,
        date: NaiveDate,
        equity: f64,
    },
    Finished {
        status: RunStatus,
    },
}

/// Shared between the handle and the worker.
struct Shared {
    status: Mutex<RunStatus>,
}

impl Shared {
    fn set(&self, status: RunStatus) {
        if let Ok(mut s) = self.status.lock() {
            *s = status;
        }
    }

    fn get(&self) -> RunStatus {
        self.status.lock().map_or(RunStatus::Failed, |s| *s)
    }
}

/// Forwards engine progress into the channel and flips status to `Running`.
struct ChannelProgress {
    tx: Sender<RunEvent>,
    shared: Arc<Shared>,
}

impl RunProgress for ChannelProgress {
    fn on_start(&self, total_days: usize) {
        self.shared.set(RunStatus::Running);
        // Receiver gone means nobody is listening; the run continues.
        let _ = self.tx.send(RunEvent::Started { total_days });
    }

    fn on_day(&self, day_index: usize, total_days: usize, snapshot: &DailySnapshot) {
        let _ = self.tx.send(RunEvent::Day {
            day_index,
            total_days,
            date: snapshot.date,
            equity: snapshot.equity,
        });
    }
}

pub struct RunHandle {
    run_id: String,
    cancel: Arc<AtomicBool>,
    shared: Arc<Shared>,
    events: Receiver<RunEvent>,
    worker: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Start a run on prices that are already loaded.
    pub fn spawn(config: RunConfig, data: Arc<LoadedData>) -> std::io::Result<Self> {
        Self::spawn_inner(config, move || Ok(data))
    }

    /// Start a run that loads its own prices on the worker thread.
    pub fn spawn_with_provider(
        config: RunConfig,
        universe: Option<Universe>,
        provider: Arc<dyn PriceProvider>,
    ) -> std::io::Result<Self> {
        let cfg = config.clone();
        Self::spawn_inner(config, move || {
            load_for(&cfg, universe.as_ref(), provider.as_ref()).map(Arc::new)
        })
    }

    fn spawn_inner<F>(config: RunConfig, load: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> Result<Arc<LoadedData>, RunError> + Send + 'static,
    {
        let run_id = config.run_id();
        let cancel = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared {
            status: Mutex::new(RunStatus::Idle),
        });
        let (tx, events) = mpsc::channel();

        let worker = {
            let cancel = Arc::clone(&cancel);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("backlab-run-{}", &run_id[..8]))
                .spawn(move || worker_main(config, load, cancel, shared, tx))?
        };

        Ok(Self {
            run_id,
            cancel,
            shared,
            events,
            worker,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn poll_status(&self) -> RunStatus {
        self.shared.get()
    }

    /// Ask the worker to stop before its next day.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Events received so far, without blocking.
    pub fn drain_events(&self) -> Vec<RunEvent> {
        self.events.try_iter().collect()
    }

    /// Blocking access to the event stream. Ends after `Finished`.
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Block until the worker is done and take its outcome.
    pub fn wait(self) -> RunOutcome {
        match self.worker.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(run_id = %self.run_id, "run worker panicked");
                self.shared.set(RunStatus::Failed);
                RunOutcome::Failed(RunError::WorkerLost)
            }
        }
    }
}

fn worker_main<F>(
    config: RunConfig,
    load: F,
    cancel: Arc<AtomicBool>,
    shared: Arc<Shared>,
    tx: Sender<RunEvent>,
) -> RunOutcome
where
    F: FnOnce() -> Result<Arc<LoadedData>, RunError>,
{
    let outcome = match load() {
        Ok(data) => {
            let progress = ChannelProgress {
                tx: tx.clone(),
                shared: Arc::clone(&shared),
            };
            let control = RunControl::new()
                .with_cancel(&cancel)
                .with_progress(&progress);
            run_to_outcome(&config, &data, &control)
        }
        Err(e) => RunOutcome::Failed(e),
    };

    let status = outcome.status();
    shared.set(status);
    let _ = tx.send(RunEvent::Finished { status });
    outcome
}
