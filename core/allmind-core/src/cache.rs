//! Reconciliation Cache: owns the current snapshot and refreshes it.
//!
//! Readers clone an `Arc<Snapshot>` under a brief read lock and never wait on
//! a scan. Writers are serialized by a single-flight guard: the check and the
//! set happen under one mutex, so two scans can never start together. A
//! refresh requested while one is running either returns immediately
//! (`refresh`) or joins the running scan (`refresh_and_wait`); it never
//! starts a second pass or cancels the first.
//!
//! Publishing is a pointer swap under the write lock, so a reader sees the
//! previous snapshot or the next one in full, never a mix.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::snapshot::SnapshotBuilder;
use crate::types::{CachedSnapshot, Snapshot};

const INITIALIZING_MESSAGE: &str = "Cache initializing, try again in a moment";

#[derive(Default)]
struct Flight {
    in_flight: bool,
    /// Scans finished so far; doubles as the last issued generation.
    completed: u64,
    /// Callers parked in `refresh_and_wait` on the running scan.
    joiners: usize,
    last: Option<Arc<Snapshot>>,
}

pub struct RepoCache {
    builder: SnapshotBuilder,
    current: RwLock<Arc<Snapshot>>,
    flight: Mutex<Flight>,
    flight_done: Condvar,
}

impl RepoCache {
    pub fn new(builder: SnapshotBuilder) -> Self {
        let placeholder = Snapshot::placeholder(builder.strap().root().display().to_string());
        Self {
            builder,
            current: RwLock::new(Arc::new(placeholder)),
            flight: Mutex::new(Flight::default()),
            flight_done: Condvar::new(),
        }
    }

    pub fn builder(&self) -> &SnapshotBuilder {
        &self.builder
    }

    /// Returns the current snapshot without I/O or waiting on a scan.
    pub fn read(&self) -> CachedSnapshot {
        // Recover from poisoning: the slot only ever holds a complete snapshot.
        let snapshot = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        annotate(snapshot)
    }

    /// Runs a scan unless one is already in flight.
    ///
    /// Returns `true` if this call performed the scan, `false` if it found
    /// one running and left it alone.
    pub fn refresh(&self) -> bool {
        let generation = {
            let mut flight = self.lock_flight();
            if flight.in_flight {
                debug!("Repo cache refresh already in progress, skipping");
                return false;
            }
            flight.in_flight = true;
            flight.completed + 1
        };
        self.run_scan(generation);
        true
    }

    /// Refreshes, then reads. Joins a running scan instead of starting one.
    pub fn refresh_and_wait(&self) -> CachedSnapshot {
        let generation = {
            let mut flight = self.lock_flight();
            if flight.in_flight {
                let target = flight.completed + 1;
                flight.joiners += 1;
                while flight.completed < target {
                    flight = self
                        .flight_done
                        .wait(flight)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                flight.joiners -= 1;
                let joined = flight.last.clone();
                drop(flight);
                debug!(target, "Joined in-flight repo cache refresh");
                return joined.map(annotate).unwrap_or_else(|| self.read());
            }
            flight.in_flight = true;
            flight.completed + 1
        };
        annotate(self.run_scan(generation))
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_flight().in_flight
    }

    /// Callers currently waiting on the in-flight scan.
    pub fn pending_joiners(&self) -> usize {
        self.lock_flight().joiners
    }

    /// Starts the fixed-cadence background refresher: one scan immediately,
    /// then one per `interval` after each scan completes.
    pub fn spawn_refresher(self: &Arc<Self>, interval: Duration) -> RefresherHandle {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let cache = Arc::clone(self);
        let join = thread::spawn(move || loop {
            cache.refresh();
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        info!(
            interval_secs = interval.as_secs_f64(),
            "Background repo refresher started"
        );
        RefresherHandle {
            stop: Some(stop_tx),
            join: Some(join),
        }
    }

    fn run_scan(&self, generation: u64) -> Arc<Snapshot> {
        let mut guard = FlightGuard {
            cache: self,
            published: None,
        };
        info!(generation, "Starting repo cache refresh");
        let snapshot = Arc::new(self.builder.build(generation));
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::clone(&snapshot);
        guard.published = Some(Arc::clone(&snapshot));
        drop(guard);
        snapshot
    }

    fn lock_flight(&self) -> MutexGuard<'_, Flight> {
        self.flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the single-flight flag and wakes joiners, even if the scan panics.
struct FlightGuard<'a> {
    cache: &'a RepoCache,
    published: Option<Arc<Snapshot>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flight = self.cache.lock_flight();
        flight.in_flight = false;
        flight.completed += 1;
        if let Some(snapshot) = self.published.take() {
            flight.last = Some(snapshot);
        }
        drop(flight);
        self.cache.flight_done.notify_all();
    }
}

fn annotate(snapshot: Arc<Snapshot>) -> CachedSnapshot {
    let cached = !snapshot.is_placeholder();
    CachedSnapshot {
        last_updated: snapshot.completed_at,
        message: (!cached).then(|| INITIALIZING_MESSAGE.to_string()),
        cached,
        snapshot,
    }
}

/// Stops the background refresher when dropped.
pub struct RefresherHandle {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl RefresherHandle {
    /// Signals the refresher and waits for any scan it is running to finish.
    pub fn stop(mut self) {
        self.stop.take();
        if let Some(join) = self.join.take() {
            log_refresher_exit(join.join());
        }
    }
}

/// Returns true if the refresher thread ended by panicking.
fn log_refresher_exit(result: thread::Result<()>) -> bool {
    match result {
        Ok(()) => {
            debug!("Background repo refresher stopped");
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|m| (*m).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(error = %message, "Background repo refresher panicked");
            true
        }
    }
}

impl Drop for RefresherHandle {
    fn drop(&mut self) {
        // Dropping the sender disconnects the channel, which ends the loop.
        self.stop.take();
    }
}
