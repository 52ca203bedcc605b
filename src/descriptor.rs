//! Per-thread transaction descriptors.
//!
//! One descriptor per OS thread, created on first transactional use and
//! dropped at thread exit. It is reused across arbitrarily many
//! transactions; the buffers keep their backing storage between them.

use std::cell::RefCell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::algs::{self, TmAlgorithm};
use crate::alloc::{AllocatorHooks, NoopAllocator};
use crate::global::{runtime, TxShared};
use crate::logs::{OrecList, RedoLog, UndoLog};
use crate::orec::{lock_word_for, Orec};

/// Dispatch state of the in-flight transaction. Stands in for the source's
/// per-mode function-pointer swap: algorithms and the access kernel branch
/// on it instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxMode {
    /// No writes yet; commit may take the read-only path.
    ReadOnly,
    /// At least one buffered write; reads consult the redo log.
    Writing,
    /// Executing with in-place writes and relaxed instrumentation.
    Turbo,
}

/// Lifetime transaction counters for one thread.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxStats {
    /// Conflict rollbacks.
    pub aborts: u64,
    /// Read-only commits.
    pub commits_ro: u64,
    /// Writing commits.
    pub commits_rw: u64,
}

pub(crate) struct TxDescriptor {
    /// Registry entry holding this thread's slot and order.
    pub shared: Arc<TxShared>,
    /// Flat nesting counter; only the outermost frame begins and commits.
    pub nesting_depth: u32,
    /// Clock value observed at begin (or at the last validation extension).
    pub start_time: usize,
    /// Upper bound on the orec versions this transaction may observe
    /// without revalidation.
    pub ts_cache: usize,
    /// This descriptor's unique lock word.
    pub my_lock: usize,
    /// Current dispatch state; begin resets it, the first write and turbo
    /// promotion advance it.
    pub mode: TxMode,
    /// Algorithm captured at begin; reads and writes dispatch through it
    /// even if the runtime switches mid-transaction.
    pub alg: &'static dyn TmAlgorithm,
    /// Registry index of `alg`, compared against the runtime's live index
    /// inside commit-time waits.
    pub alg_index: usize,
    pub r_orecs: OrecList,
    pub writes: RedoLog,
    pub undo_log: UndoLog,
    pub locks: Vec<&'static Orec>,
    pub allocator: Box<dyn AllocatorHooks>,
    pub commit_hooks: Vec<Box<dyn FnOnce()>>,
    pub rollback_hooks: Vec<Box<dyn FnOnce()>>,
    pub stats: TxStats,
}

impl TxDescriptor {
    fn new() -> Self {
        let shared = runtime().register_thread();
        let my_lock = lock_word_for(shared.slot);
        let (alg_index, alg) = algs::current();
        Self {
            shared,
            nesting_depth: 0,
            start_time: 0,
            ts_cache: 0,
            my_lock,
            mode: TxMode::ReadOnly,
            alg,
            alg_index,
            r_orecs: OrecList::new(),
            writes: RedoLog::new(),
            undo_log: UndoLog::new(),
            locks: Vec::new(),
            allocator: Box::new(NoopAllocator),
            commit_hooks: Vec::new(),
            rollback_hooks: Vec::new(),
            stats: TxStats::default(),
        }
    }

    #[inline]
    pub(crate) fn order(&self) -> i64 {
        self.shared.order.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn set_order(&self, order: i64) {
        self.shared.order.store(order, Ordering::SeqCst);
    }

    /// Logically clear every buffer, retaining storage.
    pub(crate) fn reset_buffers(&mut self) {
        self.r_orecs.clear();
        self.writes.reset();
        self.undo_log.reset();
        self.locks.clear();
    }
}

impl Drop for TxDescriptor {
    fn drop(&mut self) {
        runtime().unregister_thread(self.shared.slot);
    }
}

thread_local! {
    static TX: RefCell<TxDescriptor> = RefCell::new(TxDescriptor::new());
}

/// Run `f` against this thread's descriptor. Borrows are short: hooks and
/// user code never run inside them.
#[inline]
pub(crate) fn with_tx<R>(f: impl FnOnce(&mut TxDescriptor) -> R) -> R {
    TX.with(|cell| f(&mut cell.borrow_mut()))
}
