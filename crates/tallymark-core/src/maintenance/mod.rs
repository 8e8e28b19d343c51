//! Background maintenance scheduler
//!
//! A single thread wakes every `flush_interval_ms` (or earlier when enough
//! state is dirty), writes dirty buckets and counters in one transaction and,
//! every `reclaim_every` cycles, advances the reclamation epoch.
//!
//! State machine: `Stopped -> Running -> Stopping -> Stopped`.

/// Maintenance counters
pub mod stats;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::core::config::MaintenanceConfig;
use crate::index::CountIndex;
use crate::storage::KvStore;
use crate::types::{Error, Result};

pub use stats::{MaintenanceSnapshot, MaintenanceStats};

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// No timer thread
    Stopped = 0,
    /// Timer thread ticking
    Running = 1,
    /// Stop requested; waiting for the thread to exit
    Stopping = 2,
}

impl SchedulerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SchedulerState::Running,
            2 => SchedulerState::Stopping,
            _ => SchedulerState::Stopped,
        }
    }
}

struct Control {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Flush and reclamation scheduler for one index
pub struct MaintenanceScheduler<S: KvStore> {
    index: Arc<CountIndex<S>>,
    config: MaintenanceConfig,
    state: AtomicU8,
    stats: MaintenanceStats,
    flush_lock: Mutex<()>,
    hint_tx: Sender<()>,
    hint_rx: Receiver<()>,
    control: Mutex<Option<Control>>,
}

impl<S: KvStore> MaintenanceScheduler<S> {
    /// Create a stopped scheduler
    pub fn new(index: Arc<CountIndex<S>>, config: MaintenanceConfig) -> Arc<Self> {
        let (hint_tx, hint_rx) = channel::bounded(1);
        Arc::new(Self {
            index,
            config,
            state: AtomicU8::new(SchedulerState::Stopped as u8),
            stats: MaintenanceStats::default(),
            flush_lock: Mutex::new(()),
            hint_tx,
            hint_rx,
            control: Mutex::new(None),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Start the timer thread
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut control = self.control.lock();
        self.state
            .compare_exchange(
                SchedulerState::Stopped as u8,
                SchedulerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|raw| {
                Error::invariant(format!("cannot start maintenance while {:?}", SchedulerState::from_u8(raw)))
            })?;

        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let scheduler = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("tm-maintenance".into())
            .spawn(move || scheduler.run(shutdown_rx));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        *control = Some(Control { shutdown: shutdown_tx, handle });
        drop(control);

        crate::log_info!(
            flush_interval_ms = self.config.flush_interval_ms,
            flush_batch_size = self.config.flush_batch_size,
            reclaim_every = self.config.reclaim_every,
            "maintenance scheduler started"
        );
        Ok(())
    }

    /// Stop the timer thread and flush whatever is still dirty.
    ///
    /// No tick runs after this returns, for every caller: concurrent
    /// callers wait on the control lock until the join has finished.
    /// Stopping a stopped scheduler only performs the final flush.
    pub fn stop(&self) -> Result<()> {
        let mut control = self.control.lock();
        let was_running = self
            .state
            .compare_exchange(
                SchedulerState::Running as u8,
                SchedulerState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();

        if was_running {
            if let Some(control) = control.take() {
                // The thread may already be gone if it panicked; joining reports that.
                let _ = control.shutdown.send(());
                if control.handle.join().is_err() {
                    crate::log_error!("maintenance thread panicked");
                }
            }
            self.state.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
            crate::log_info!("maintenance scheduler stopped");
        }
        drop(control);

        self.force_flush().map(|_| ())
    }

    /// Request an early flush if `dirty` has reached the batch threshold
    pub fn notify_dirty(&self, dirty: usize) {
        if dirty >= self.config.flush_batch_size {
            // A pending hint is as good as a new one.
            let _ = self.hint_tx.try_send(());
        }
    }

    /// Flush synchronously; returns rows written.
    ///
    /// Mutually exclusive with scheduled flushes. After the last failed
    /// attempt the batch is marked dirty again and the error returned.
    pub fn force_flush(&self) -> Result<usize> {
        let _flushing = self.flush_lock.lock();
        let batch = self.index.collect_dirty();
        if batch.is_empty() {
            return Ok(0);
        }

        let mut attempt = 1;
        loop {
            match self.index.write_batch(&batch) {
                Ok(rows) => {
                    self.stats.record_written(rows);
                    crate::log_debug!(rows, attempt, "flushed dirty state");
                    return Ok(rows);
                }
                Err(e) if attempt < self.config.flush_max_attempts && e.is_retryable() => {
                    let backoff = self.config.retry_backoff(attempt);
                    crate::log_warn!(error = %e, attempt, backoff_ms = backoff.as_millis() as u64, "flush failed, retrying");
                    thread::sleep(backoff);
                    attempt += 1;
                }
                Err(e) => {
                    self.stats.record_failure();
                    crate::log_error!(error = %e, attempts = attempt, rows = batch.len(), "flush failed, requeueing");
                    self.index.requeue(batch);
                    return Err(e.into());
                }
            }
        }
    }

    /// Advance the epoch and release unobservable snapshots
    pub fn reclaim(&self) -> usize {
        let freed = self.index.domain().advance_and_reclaim();
        self.stats.record_reclaim(freed);
        crate::log_debug!(freed, epoch = self.index.domain().epoch(), "reclaimed snapshots");
        freed
    }

    /// One scheduler cycle: flush, count, maybe reclaim
    pub fn tick(&self) {
        // Failures are logged and requeued inside force_flush.
        let _ = self.force_flush();
        let cycle = self.stats.record_cycle();
        if cycle % self.config.reclaim_every == 0 {
            self.reclaim();
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> MaintenanceSnapshot {
        self.stats.snapshot()
    }

    fn run(&self, shutdown: Receiver<()>) {
        let ticker = channel::tick(self.config.flush_interval());
        let hint = &self.hint_rx;
        loop {
            crossbeam::select! {
                recv(shutdown) -> _ => break,
                recv(ticker) -> _ => self.tick(),
                recv(hint) -> _ => self.tick(),
            }
        }
    }
}

#[cfg(test)]
mod tests;
