//! Totally ordered pipeline with an in-place fast path for the oldest
//! transaction.
//!
//! Every transaction draws a position in a global total order at begin time
//! and must commit in that order; `last_complete` is the commit token. The
//! transaction whose predecessor has fully committed is the oldest and may
//! switch to turbo mode: it flushes its redo log, then reads and writes
//! shared memory directly. Orec marks use naked stores; the order itself is
//! the concurrency control.
//!
//! Aborted transactions keep their order, so retries cannot starve: the
//! retry of the oldest transaction enters turbo immediately and cannot fail.

use core::sync::atomic::{fence, Ordering};

use crossbeam_utils::Backoff;

use super::{ResumeMode, TmAlgorithm};
use crate::descriptor::{TxDescriptor, TxMode};
use crate::error::{fatal, Abort};
use crate::global::runtime;
use crate::mem;

pub(crate) struct PipelineTurbo;

impl PipelineTurbo {
    /// Revalidate the read set, then adopt `finish_cache` as the new upper
    /// bound. If that makes this transaction the oldest, flush the redo log
    /// (marking each orec first) and enter turbo mode.
    fn validate(&self, tx: &mut TxDescriptor, finish_cache: usize) -> Result<(), Abort> {
        for o in &tx.r_orecs {
            if o.load() > tx.ts_cache {
                return Err(Abort::Conflict);
            }
        }
        tx.ts_cache = finish_cache;
        if tx.ts_cache == (tx.order() - 1) as usize && !tx.writes.is_empty() {
            let order = tx.order() as usize;
            for i in 0..tx.writes.len() {
                let w = tx.writes.get(i);
                let o = runtime().orec_for(w.addr as usize);
                o.release(order);
                fence(Ordering::Release); // mark lands before the data
                unsafe { mem::store_word_masked(w.addr, w.val, w.mask) };
            }
            tx.mode = TxMode::Turbo;
        }
        Ok(())
    }

    /// Spin until this transaction is the oldest, watching for an
    /// adaptivity switch.
    fn wait_turn(&self, tx: &TxDescriptor) -> Result<(), Abort> {
        let g = runtime();
        let turn = (tx.order() - 1) as usize;
        let backoff = Backoff::new();
        while g.last_complete.val.load(Ordering::Acquire) != turn {
            if g.algorithm_index() != tx.alg_index {
                return Err(Abort::AlgorithmChanged);
            }
            backoff.spin();
        }
        Ok(())
    }
}

impl TmAlgorithm for PipelineTurbo {
    fn name(&self) -> &'static str {
        "PipelineTurbo"
    }

    fn supports_turbo(&self) -> bool {
        true
    }

    fn begin(&self, tx: &mut TxDescriptor) -> ResumeMode {
        tx.allocator.on_tx_begin();

        // only draw a new order if this is not a retry
        if tx.order() == -1 {
            let next = runtime().timestamp.val.fetch_add(1, Ordering::SeqCst) + 1;
            tx.set_order(next as i64);
        }

        tx.ts_cache = runtime().last_complete.val.load(Ordering::Acquire);
        if tx.ts_cache == (tx.order() - 1) as usize {
            tx.mode = TxMode::Turbo;
        }
        ResumeMode::Instrumented
    }

    fn read(&self, tx: &mut TxDescriptor, addr: *const usize) -> Result<usize, Abort> {
        if tx.mode == TxMode::Turbo {
            return Ok(unsafe { mem::load_word(addr) });
        }

        let tmp = unsafe { mem::load_word(addr) };
        fence(Ordering::Acquire); // value before the orec check

        let o = runtime().orec_for(addr as usize);
        if o.load() > tx.ts_cache {
            return Err(Abort::Conflict);
        }
        tx.r_orecs.push(o);

        // someone finished since we last looked: revalidate, maybe promote
        let finish = runtime().last_complete.val.load(Ordering::Acquire);
        if finish > tx.ts_cache {
            self.validate(tx, finish)?;
        }
        Ok(tmp)
    }

    fn write(
        &self,
        tx: &mut TxDescriptor,
        addr: *mut usize,
        val: usize,
        mask: usize,
    ) -> Result<(), Abort> {
        if tx.mode == TxMode::Turbo {
            let o = runtime().orec_for(addr as usize);
            o.release(tx.order() as usize);
            fence(Ordering::Release);
            unsafe { mem::store_word_masked(addr, val, mask) };
            return Ok(());
        }
        tx.writes.insert(addr, val, mask);
        Ok(())
    }

    fn commit(&self, tx: &mut TxDescriptor) -> Result<(), Abort> {
        let g = runtime();

        if tx.mode == TxMode::Turbo {
            // locks were taken eagerly via orec marks; just publish
            fence(Ordering::SeqCst);
            g.last_complete.val.store(tx.order() as usize, Ordering::Release);
            tx.set_order(-1);
            tx.mode = TxMode::ReadOnly;
            tx.reset_buffers();
            tx.allocator.on_tx_commit();
            tx.stats.commits_rw += 1;
            return Ok(());
        }

        self.wait_turn(tx)?;
        for o in &tx.r_orecs {
            if o.load() > tx.ts_cache {
                return Err(Abort::Conflict);
            }
        }

        let read_only = tx.mode == TxMode::ReadOnly;
        if !read_only {
            // mark every location in the write set, then write back;
            // nothing can abort past this point
            let order = tx.order() as usize;
            for i in 0..tx.writes.len() {
                let w = tx.writes.get(i);
                let o = g.orec_for(w.addr as usize);
                o.release(order);
                fence(Ordering::Release);
                unsafe { mem::store_word_masked(w.addr, w.val, w.mask) };
            }
        }

        g.last_complete.val.store(tx.order() as usize, Ordering::Release);
        tx.set_order(-1);
        tx.mode = TxMode::ReadOnly;
        tx.reset_buffers();
        tx.allocator.on_tx_commit();
        if read_only {
            tx.stats.commits_ro += 1;
        } else {
            tx.stats.commits_rw += 1;
        }
        Ok(())
    }

    fn rollback(&self, tx: &mut TxDescriptor) {
        if tx.mode == TxMode::Turbo {
            fatal("attempted to roll back a turbo-mode transaction");
        }
        // keep the order: the retry reuses its pipeline slot
        tx.reset_buffers();
    }

    fn on_switch_to(&self) {
        let g = runtime();
        let base = g.clock_base();
        g.last_complete.val.store(base, Ordering::SeqCst);
        for entry in g.threads.iter() {
            entry.value().order.store(-1, Ordering::SeqCst);
        }
    }
}
