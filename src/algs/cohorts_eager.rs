//! Cohort batching with an in-place fast path for the last committer.
//!
//! Transactions run in batches: a new cohort cannot begin while the previous
//! one is still committing, and a member commits only after every sibling
//! has reached the commit phase. Within a cohort, commit order is drawn from
//! `cpending`; the first committer of a cohort skips validation because no
//! concurrent writeback can have happened since its begin.
//!
//! The last transaction to join a cohort could write in place and commit in
//! turbo mode; that promotion is currently disabled (see `INPLACE_WRITES`),
//! so the live behavior always buffers. The turbo write and commit paths are
//! kept for when it returns.

use core::sync::atomic::{fence, Ordering};

use crossbeam_utils::Backoff;

use super::{ResumeMode, TmAlgorithm};
use crate::descriptor::{TxDescriptor, TxMode};
use crate::error::Abort;
use crate::global::runtime;
use crate::mem;

// TODO: re-enable in-place promotion once the clobbering hazard is fixed: a
// sibling that writes back the same address after the promoted writer's
// in-place store overwrites the later-ordered value.
const INPLACE_WRITES: bool = false;

pub(crate) struct CohortsEager;

impl CohortsEager {
    /// Abort if any read orec moved past this transaction's snapshot. The
    /// failing transaction still publishes its completion so the cohort can
    /// drain without it.
    fn validate(&self, tx: &TxDescriptor) -> Result<(), Abort> {
        let g = runtime();
        for o in &tx.r_orecs {
            if o.load() > tx.ts_cache {
                g.committed.val.fetch_add(1, Ordering::SeqCst);
                fence(Ordering::SeqCst);
                g.last_complete.val.store(tx.order() as usize, Ordering::Release);
                return Err(Abort::Conflict);
            }
        }
        Ok(())
    }
}

impl TmAlgorithm for CohortsEager {
    fn name(&self) -> &'static str {
        "CohortsEager"
    }

    fn supports_turbo(&self) -> bool {
        true
    }

    fn begin(&self, tx: &mut TxDescriptor) -> ResumeMode {
        let g = runtime();
        let backoff = Backoff::new();
        loop {
            // wait until everyone from the previous cohort is committed
            while g.cpending.val.load(Ordering::SeqCst) != g.committed.val.load(Ordering::SeqCst)
            {
                backoff.snooze();
            }

            g.started.val.fetch_add(1, Ordering::SeqCst);

            // double-check: no one may be ready to commit yet, and no one
            // may be in the in-place write phase
            if g.cpending.val.load(Ordering::SeqCst) > g.committed.val.load(Ordering::SeqCst)
                || g.inplace.val.load(Ordering::SeqCst) == 1
            {
                g.started.val.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            break;
        }

        tx.allocator.on_tx_begin();
        tx.ts_cache = g.last_complete.val.load(Ordering::Acquire);
        ResumeMode::Instrumented
    }

    fn read(&self, tx: &mut TxDescriptor, addr: *const usize) -> Result<usize, Abort> {
        if tx.mode == TxMode::Turbo {
            return Ok(unsafe { mem::load_word(addr) });
        }
        // log the orec; the value is validated at commit time
        tx.r_orecs.push(runtime().orec_for(addr as usize));
        Ok(unsafe { mem::load_word(addr) })
    }

    fn write(
        &self,
        tx: &mut TxDescriptor,
        addr: *mut usize,
        val: usize,
        mask: usize,
    ) -> Result<(), Abort> {
        let g = runtime();

        if tx.mode == TxMode::Turbo {
            let o = g.orec_for(addr as usize);
            o.release(g.started.val.load(Ordering::SeqCst));
            fence(Ordering::Release);
            let old = unsafe { mem::load_word(addr) };
            tx.undo_log.record(addr, old, mask);
            unsafe { mem::store_word_masked(addr, val, mask) };
            return Ok(());
        }

        if tx.writes.is_empty() && INPLACE_WRITES {
            // if everyone else is ready to commit, write in place
            if g.cpending.val.load(Ordering::SeqCst) + 1 == g.started.val.load(Ordering::SeqCst)
                && g
                    .inplace
                    .val
                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                // double check is necessary
                if g.cpending.val.load(Ordering::SeqCst) + 1
                    == g.started.val.load(Ordering::SeqCst)
                {
                    let o = g.orec_for(addr as usize);
                    o.release(g.started.val.load(Ordering::SeqCst));
                    fence(Ordering::Release);
                    let old = unsafe { mem::load_word(addr) };
                    tx.undo_log.record(addr, old, mask);
                    unsafe { mem::store_word_masked(addr, val, mask) };
                    tx.mode = TxMode::Turbo;
                    return Ok(());
                }
                g.inplace.val.store(0, Ordering::SeqCst);
            }
            tx.writes.insert(addr, val, mask);
            return Ok(());
        }

        tx.writes.insert(addr, val, mask);
        Ok(())
    }

    fn commit(&self, tx: &mut TxDescriptor) -> Result<(), Abort> {
        let g = runtime();

        if tx.mode == TxMode::Turbo {
            // join the commit queue; the new count is this tx's order
            let order = g.cpending.val.fetch_add(1, Ordering::SeqCst) + 1;

            tx.reset_buffers();
            tx.allocator.on_tx_commit();
            tx.stats.commits_rw += 1;

            // wait for my turn
            let backoff = Backoff::new();
            while g.last_complete.val.load(Ordering::Acquire) != order - 1 {
                backoff.spin();
            }

            g.inplace.val.store(0, Ordering::SeqCst);
            g.last_complete.val.store(order, Ordering::Release);
            g.committed.val.fetch_add(1, Ordering::SeqCst);
            fence(Ordering::SeqCst);
            tx.mode = TxMode::ReadOnly;
            return Ok(());
        }

        if tx.mode == TxMode::ReadOnly {
            g.started.val.fetch_sub(1, Ordering::SeqCst);
            tx.r_orecs.clear();
            tx.allocator.on_tx_commit();
            tx.stats.commits_ro += 1;
            return Ok(());
        }

        // enter the commit queue; the new count is this tx's order
        let order = g.cpending.val.fetch_add(1, Ordering::SeqCst) + 1;
        tx.set_order(order as i64);

        // wait for my turn
        let backoff = Backoff::new();
        while g.last_complete.val.load(Ordering::Acquire) != order - 1 {
            backoff.spin();
        }

        // wait until the whole cohort is ready to commit
        while g.cpending.val.load(Ordering::SeqCst) < g.started.val.load(Ordering::SeqCst) {
            backoff.spin();
        }

        // if an in-place write occurred, everyone validates; otherwise only
        // the first committer of the cohort may skip it
        if g.inplace.val.load(Ordering::SeqCst) == 1
            || order != g.last_order.val.load(Ordering::SeqCst)
        {
            self.validate(tx)?;
        }

        for i in 0..tx.writes.len() {
            let w = tx.writes.get(i);
            let o = g.orec_for(w.addr as usize);
            o.release(order);
            fence(Ordering::Release);
            unsafe { mem::store_word_masked(w.addr, w.val, w.mask) };
        }

        g.committed.val.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        g.last_order
            .val
            .store(g.started.val.load(Ordering::SeqCst) + 1, Ordering::SeqCst);
        g.last_complete.val.store(order, Ordering::Release);

        tx.reset_buffers();
        tx.mode = TxMode::ReadOnly;
        tx.allocator.on_tx_commit();
        tx.stats.commits_rw += 1;
        Ok(())
    }

    fn rollback(&self, tx: &mut TxDescriptor) {
        // undo in-place side effects, newest first
        unsafe { tx.undo_log.undo() };
        tx.reset_buffers();
    }

    fn on_switch_to(&self) {
        // Cohort orders continue from the clock base so they land above
        // every published orec version.
        let g = runtime();
        let base = g.clock_base();
        g.last_complete.val.store(base, Ordering::SeqCst);
        g.started.val.store(base, Ordering::SeqCst);
        g.cpending.val.store(base, Ordering::SeqCst);
        g.committed.val.store(base, Ordering::SeqCst);
        g.last_order.val.store(base + 1, Ordering::SeqCst);
        g.inplace.val.store(0, Ordering::SeqCst);
    }
}
