//! Lazy-acquire orec STM on the hardware tick clock.
//!
//! Close to the GV1 variant of TL2: reads are check-twice validated against
//! the begin-time tick, writes buffer into the redo log, and commit acquires
//! every covering orec, samples the tick again, validates the read set, and
//! writes back. Using the tick counter as the clock means writers never
//! contend on a shared timestamp word. There is no in-flight validation: a
//! version newer than the begin-time sample aborts on the spot.

use core::sync::atomic::{fence, Ordering};

use super::{ResumeMode, TmAlgorithm};
use crate::clock;
use crate::descriptor::{TxDescriptor, TxMode};
use crate::error::Abort;
use crate::global::runtime;
use crate::mem;

pub(crate) struct LltAmd64;

impl LltAmd64 {
    /// Abort unless every read orec is still at or below the begin-time
    /// sample, or held by this transaction.
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

impl TmAlgorithm for LltAmd64 {
    fn name(&self) -> &'static str {
        "LLTAMD64"
    }

    fn begin(&self, tx: &mut TxDescriptor) -> ResumeMode {
        tx.allocator.on_tx_begin();
        tx.start_time = clock::tick();
        ResumeMode::Instrumented
    }

    fn read(&self, tx: &mut TxDescriptor, addr: *const usize) -> Result<usize, Abort> {
        let o = runtime().orec_for(addr as usize);

        // check twice: orec, value, orec
        let ivt = o.load();
        let tmp = unsafe { mem::load_word(addr) };
        fence(Ordering::Acquire);
        let ivt2 = o.load_relaxed();

        // if the orec never changed and isn't too new, the read is valid
        if ivt <= tx.start_time && ivt == ivt2 {
            tx.r_orecs.push(o);
            return Ok(tmp);
        }
        Err(Abort::Conflict)
    }

    fn write(
        &self,
        tx: &mut TxDescriptor,
        addr: *mut usize,
        val: usize,
        mask: usize,
    ) -> Result<(), Abort> {
        tx.writes.insert(addr, val, mask);
        Ok(())
    }

    fn commit(&self, tx: &mut TxDescriptor) -> Result<(), Abort> {
        if tx.mode == TxMode::ReadOnly {
            tx.r_orecs.clear();
            tx.allocator.on_tx_commit();
            tx.stats.commits_ro += 1;
            return Ok(());
        }

        // 1. Acquire every orec covering the write set.
        for i in 0..tx.writes.len() {
            let w = tx.writes.get(i);
            let o = runtime().orec_for(w.addr as usize);
            let ivt = o.load();
            if ivt <= tx.start_time {
                if !o.try_acquire(ivt, tx.my_lock) {
                    return Err(Abort::Conflict);
                }
                tx.locks.push(o);
            } else if ivt != tx.my_lock {
                return Err(Abort::Conflict);
            }
        }

        // 2. Sample the commit time.
        let end_time = clock::tick();

        // 3. Validate the read set.
        self.validate(tx)?;

        // 4. Run the redo log.
        unsafe { tx.writes.writeback() };

        // 5. Release the locks at the commit time.
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
        // restore the saved version on every held lock
        for o in &tx.locks {
            o.release(o.saved());
        }
        tx.reset_buffers();
    }

    fn on_switch_to(&self) {
        // Tick values exceed any counter-published orec version; the shared
        // clock needs no raising to stay monotonic.
    }
}
