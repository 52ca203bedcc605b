//! Encounter-time orec locking with a redo log.
//!
//! Writes lock their orec when first encountered; reads validate against a
//! begin-time timestamp sample and, when a location is unlocked but too new,
//! extend the sample forward by revalidating the whole read set against a
//! fresh one. Commit holds every lock already, so it validates, writes back,
//! bumps the shared clock, and releases. The one algorithm here that can
//! abort with locks held.

use core::sync::atomic::{fence, Ordering};

use super::{ResumeMode, TmAlgorithm};
use crate::descriptor::{TxDescriptor, TxMode};
use crate::error::Abort;
use crate::global::runtime;
use crate::mem;
use crate::orec::Orec;

pub(crate) struct OrecEagerRedo;

impl OrecEagerRedo {
    fn validate(&self, tx: &TxDescriptor) -> Result<(), Abort> {
        for o in &tx.r_orecs {
            let ivt = o.load();
            if ivt > tx.start_time && ivt != tx.my_lock {
                return Err(Abort::Conflict);
            }
        }
        Ok(())
    }
}

impl TmAlgorithm for OrecEagerRedo {
    fn name(&self) -> &'static str {
        "OrecEagerRedo"
    }

    fn begin(&self, tx: &mut TxDescriptor) -> ResumeMode {
        tx.allocator.on_tx_begin();
        tx.start_time = runtime().timestamp.val.load(Ordering::SeqCst);
        ResumeMode::Instrumented
    }

    fn read(&self, tx: &mut TxDescriptor, addr: *const usize) -> Result<usize, Abort> {
        let o = runtime().orec_for(addr as usize);
        loop {
            let tmp = unsafe { mem::load_word(addr) };
            fence(Ordering::Acquire);
            let ivt = o.load_relaxed();

            // common case: new read to an uncontended location
            if ivt <= tx.start_time {
                tx.r_orecs.push(o);
                return Ok(tmp);
            }

            // next best: locked by us. Full read-after-write hits were
            // already answered from the redo log; memory is current for
            // the rest.
            if ivt == tx.my_lock {
                return Ok(tmp);
            }

            // locked by another transaction
            if Orec::is_locked(ivt) {
                return Err(Abort::Conflict);
            }

            // unlocked but too new: scale the timestamp forward and retry
            let newts = runtime().timestamp.val.load(Ordering::SeqCst);
            self.validate(tx)?;
            tx.start_time = newts;
        }
    }

    fn write(
        &self,
        tx: &mut TxDescriptor,
        addr: *mut usize,
        val: usize,
        mask: usize,
    ) -> Result<(), Abort> {
        tx.writes.insert(addr, val, mask);

        let o = runtime().orec_for(addr as usize);
        loop {
            let ivt = o.load();

            // common case: uncontended location, lock it
            if ivt <= tx.start_time {
                if !o.try_acquire(ivt, tx.my_lock) {
                    return Err(Abort::Conflict);
                }
                tx.locks.push(o);
                return Ok(());
            }

            // next best: we already hold the lock
            if ivt == tx.my_lock {
                return Ok(());
            }

            if Orec::is_locked(ivt) {
                return Err(Abort::Conflict);
            }

            // unlocked but too new: scale forward and try again
            let newts = runtime().timestamp.val.load(Ordering::SeqCst);
            self.validate(tx)?;
            tx.start_time = newts;
        }
    }

    fn commit(&self, tx: &mut TxDescriptor) -> Result<(), Abort> {
        if tx.mode == TxMode::ReadOnly {
            tx.r_orecs.clear();
            tx.allocator.on_tx_commit();
            tx.stats.commits_ro += 1;
            return Ok(());
        }

        // we hold all locks, so validate
        self.validate(tx)?;

        // run the redo log
        unsafe { tx.writes.writeback() };

        // we're a writer, so bump the global timestamp
        let end_time = runtime().timestamp.val.fetch_add(1, Ordering::SeqCst) + 1;

        // release locks
        fence(Ordering::Release);
        for o in &tx.locks {
            o.release(end_time);
        }

        tx.reset_buffers();
        tx.mode = TxMode::ReadOnly;
        tx.allocator.on_tx_commit();
        tx.stats.commits_rw += 1;
        Ok(())
    }

    fn rollback(&self, tx: &mut TxDescriptor) {
        // release the locks and restore version numbers
        for o in &tx.locks {
            o.release(o.saved());
        }
        tx.reset_buffers();
    }

    fn on_switch_to(&self) {
        runtime().clock_base();
    }
}
