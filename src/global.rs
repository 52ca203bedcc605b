//! Process-wide coordination state.
//!
//! Every hot counter sits in its own padded cache line; the orec table is
//! allocated once on first use. The runtime never creates threads: it
//! attaches per-thread descriptors as they arrive and tracks them in a
//! registry so algorithm switches can reach every thread's order slot.

use core::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::orec::{Orec, OREC_SHIFT, OREC_TABLE_SIZE};

/// One coordination word on its own 64-byte cache line, so the hot counters
/// never false-share. The tick-clock algorithm binds this runtime to x86-64
/// parts, whose line size is 64 bytes.
#[repr(align(64))]
pub(crate) struct PadWord {
    pub val: AtomicUsize,
}

impl PadWord {
    pub(crate) const fn new(v: usize) -> Self {
        Self {
            val: AtomicUsize::new(v),
        }
    }
}

/// The cross-thread-visible slice of a transaction descriptor. The registry
/// keeps one per live thread so an algorithm switch can reset every order.
pub(crate) struct TxShared {
    /// Registry slot; also the payload of this thread's lock word.
    pub slot: usize,
    /// Position in the commit total order; −1 when not enqueued.
    pub order: AtomicI64,
}

/// The process-wide runtime: version clocks, cohort counters, the orec
/// table, and the thread registry.
pub(crate) struct Runtime {
    /// Monotonic version clock for the counter-clock algorithms.
    pub timestamp: PadWord,
    /// High-water mark preserved across algorithm switches.
    pub timestamp_max: PadWord,
    /// Largest order whose commit is fully published.
    pub last_complete: PadWord,
    /// Cohort membership counter.
    pub started: PadWord,
    /// Cohort members that have entered the commit phase.
    pub cpending: PadWord,
    /// Cohort members whose commit has finished.
    pub committed: PadWord,
    /// Order of the last transaction in the previous cohort, plus one.
    pub last_order: PadWord,
    /// Reserved by other cohort variants.
    #[allow(dead_code)]
    pub gatekeeper: PadWord,
    /// Set while a cohort member writes in place.
    pub inplace: PadWord,
    /// Index of the live algorithm in the registry; waiting commits compare
    /// against it to observe adaptivity switches.
    pub algorithm: PadWord,
    orecs: Box<[Orec]>,
    pub threads: DashMap<usize, Arc<TxShared>>,
    next_slot: AtomicUsize,
}

static RUNTIME: Lazy<Runtime> = Lazy::new(Runtime::new);

/// The process-wide runtime, initialized on first use.
#[inline]
pub(crate) fn runtime() -> &'static Runtime {
    &RUNTIME
}

impl Runtime {
    fn new() -> Self {
        let orecs: Box<[Orec]> = (0..OREC_TABLE_SIZE).map(|_| Orec::new()).collect();
        Self {
            timestamp: PadWord::new(0),
            timestamp_max: PadWord::new(0),
            last_complete: PadWord::new(0),
            started: PadWord::new(0),
            cpending: PadWord::new(0),
            committed: PadWord::new(0),
            last_order: PadWord::new(0),
            gatekeeper: PadWord::new(0),
            inplace: PadWord::new(0),
            algorithm: PadWord::new(0),
            orecs,
            threads: DashMap::new(),
            next_slot: AtomicUsize::new(0),
        }
    }

    /// Map an address onto its ownership record. Pure; aliasing collisions
    /// are expected and harmless.
    #[inline]
    pub(crate) fn orec_for(&'static self, addr: usize) -> &'static Orec {
        &self.orecs[(addr >> OREC_SHIFT) & (OREC_TABLE_SIZE - 1)]
    }

    /// Attach a new thread, assigning its registry slot.
    pub(crate) fn register_thread(&self) -> Arc<TxShared> {
        let slot = self.next_slot.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(TxShared {
            slot,
            order: AtomicI64::new(-1),
        });
        self.threads.insert(slot, shared.clone());
        shared
    }

    pub(crate) fn unregister_thread(&self, slot: usize) {
        self.threads.remove(&slot);
    }

    #[inline]
    pub(crate) fn algorithm_index(&self) -> usize {
        self.algorithm.val.load(Ordering::SeqCst)
    }

    /// Raise the version clock to cover everything published so far and
    /// return the new base. Every on-switch-to callback starts here so the
    /// incoming algorithm's versions continue above all visible orec marks.
    pub(crate) fn clock_base(&self) -> usize {
        let base = self
            .timestamp
            .val
            .load(Ordering::SeqCst)
            .max(self.timestamp_max.val.load(Ordering::SeqCst))
            .max(self.last_complete.val.load(Ordering::SeqCst));
        self.timestamp.val.store(base, Ordering::SeqCst);
        self.timestamp_max.val.store(base, Ordering::SeqCst);
        base
    }
}
