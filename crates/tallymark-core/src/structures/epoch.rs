//! Epoch-based reclamation domain
//!
//! Readers pin the current global epoch for the duration of a cache access.
//! Superseded objects are retired with the epoch they were retired at, and
//! [`ReclamationDomain::advance_and_reclaim`] drops every retired object whose
//! retire epoch is older than both the new global epoch and every pinned
//! participant's epoch.
//!
//! Retired values are usually `Arc`s, so a reader that cloned one keeps it
//! alive regardless. The domain bounds when the engine itself lets go.

use std::cell::Cell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Marker stored in a record that is not inside a critical section
const QUIESCENT: u64 = u64::MAX;

/// Per-participant epoch marker
#[derive(Debug)]
struct EpochRecord {
    pinned: AtomicU64,
}

struct Retired<T> {
    value: T,
    epoch: u64,
}

/// Shared reclamation state, owned by one engine instance
pub struct ReclamationDomain<T> {
    global_epoch: AtomicU64,
    registry: Mutex<Vec<Arc<EpochRecord>>>,
    retired: Mutex<VecDeque<Retired<T>>>,
    stats: DomainStats,
}

/// Counters describing reclamation activity
#[derive(Debug, Default)]
struct DomainStats {
    retired_total: AtomicUsize,
    reclaimed_total: AtomicUsize,
    advances: AtomicUsize,
}

/// Point-in-time view of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainSnapshot {
    /// Current global epoch
    pub global_epoch: u64,
    /// Registered participants
    pub participants: usize,
    /// Retired objects not yet reclaimed
    pub pending: usize,
    /// Objects retired since creation
    pub retired_total: usize,
    /// Objects reclaimed since creation
    pub reclaimed_total: usize,
    /// Calls to `advance_and_reclaim`
    pub advances: usize,
}

impl<T: Send> ReclamationDomain<T> {
    /// Create an empty domain at epoch 0
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            global_epoch: AtomicU64::new(0),
            registry: Mutex::new(Vec::new()),
            retired: Mutex::new(VecDeque::new()),
            stats: DomainStats::default(),
        })
    }

    /// Register the calling thread.
    ///
    /// The returned participant is the only way to pin, and it cannot leave
    /// the thread that created it.
    pub fn register(self: &Arc<Self>) -> Participant<T> {
        let record = Arc::new(EpochRecord { pinned: AtomicU64::new(QUIESCENT) });
        self.registry.lock().push(Arc::clone(&record));
        Participant {
            domain: Arc::clone(self),
            record,
            depth: Cell::new(0),
            _not_send: PhantomData,
        }
    }

    /// Current global epoch
    pub fn epoch(&self) -> u64 {
        self.global_epoch.load(Ordering::SeqCst)
    }

    /// Defer dropping `value` until no pinned reader can still observe it
    pub fn retire(&self, value: T) {
        let epoch = self.global_epoch.load(Ordering::SeqCst);
        self.retired.lock().push_back(Retired { value, epoch });
        self.stats.retired_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Retired objects still waiting
    pub fn pending(&self) -> usize {
        self.retired.lock().len()
    }

    /// Advance the global epoch and drop every retired object that is safe.
    ///
    /// Returns the number of objects reclaimed.
    pub fn advance_and_reclaim(&self) -> usize {
        let global = self.global_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.advances.fetch_add(1, Ordering::Relaxed);

        let min_pinned = self
            .registry
            .lock()
            .iter()
            .map(|r| r.pinned.load(Ordering::SeqCst))
            .min()
            .unwrap_or(QUIESCENT);
        let horizon = min_pinned.min(global);

        let reclaimable = {
            let mut retired = self.retired.lock();
            let (free, keep): (VecDeque<_>, VecDeque<_>) =
                std::mem::take(&mut *retired).into_iter().partition(|r| r.epoch < horizon);
            *retired = keep;
            free
        };

        let count = reclaimable.len();
        // Values drop here, outside the lock.
        drop(reclaimable);
        self.stats.reclaimed_total.fetch_add(count, Ordering::Relaxed);
        count
    }

    /// Snapshot of the domain's counters
    pub fn snapshot(&self) -> DomainSnapshot {
        DomainSnapshot {
            global_epoch: self.epoch(),
            participants: self.registry.lock().len(),
            pending: self.pending(),
            retired_total: self.stats.retired_total.load(Ordering::Relaxed),
            reclaimed_total: self.stats.reclaimed_total.load(Ordering::Relaxed),
            advances: self.stats.advances.load(Ordering::Relaxed),
        }
    }

    fn unregister(&self, record: &Arc<EpochRecord>) {
        self.registry.lock().retain(|r| !Arc::ptr_eq(r, record));
    }
}

/// A registered reader. Not `Send`: it belongs to the registering thread.
pub struct Participant<T: Send> {
    domain: Arc<ReclamationDomain<T>>,
    record: Arc<EpochRecord>,
    depth: Cell<u32>,
    _not_send: PhantomData<*const ()>,
}

impl<T: Send> Participant<T> {
    /// Enter a critical section. Pins nest; the outermost guard unpins.
    pub fn pin(&self) -> Guard<'_, T> {
        let depth = self.depth.get();
        if depth == 0 {
            loop {
                let epoch = self.domain.global_epoch.load(Ordering::SeqCst);
                self.record.pinned.store(epoch, Ordering::SeqCst);
                if self.domain.global_epoch.load(Ordering::SeqCst) == epoch {
                    break;
                }
            }
        }
        self.depth.set(depth + 1);
        Guard { participant: self }
    }

    /// Whether this participant is inside a critical section
    pub fn is_pinned(&self) -> bool {
        self.depth.get() > 0
    }

    /// The domain this participant belongs to
    pub fn domain(&self) -> &Arc<ReclamationDomain<T>> {
        &self.domain
    }
}

impl<T: Send> Drop for Participant<T> {
    fn drop(&mut self) {
        self.record.pinned.store(QUIESCENT, Ordering::SeqCst);
        self.domain.unregister(&self.record);
    }
}

/// Proof that the holder is pinned. Dropping it leaves the critical section.
pub struct Guard<'a, T: Send> {
    participant: &'a Participant<T>,
}

impl<T: Send> Guard<'_, T> {
    /// Epoch observed when the outermost pin was taken
    pub fn epoch(&self) -> u64 {
        self.participant.record.pinned.load(Ordering::SeqCst)
    }

    /// Whether this guard was issued by `domain`
    pub fn belongs_to(&self, domain: &Arc<ReclamationDomain<T>>) -> bool {
        Arc::ptr_eq(&self.participant.domain, domain)
    }
}

impl<T: Send> Drop for Guard<'_, T> {
    fn drop(&mut self) {
        let depth = self.participant.depth.get() - 1;
        self.participant.depth.set(depth);
        if depth == 0 {
            self.participant.record.pinned.store(QUIESCENT, Ordering::SeqCst);
        }
    }
}
