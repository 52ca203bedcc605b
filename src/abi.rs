//! The transaction ABI consumed by instrumented user code.
//!
//! Everything here operates on the calling thread's descriptor. `begin` and
//! `commit` maintain the flat nesting counter; only the outermost frame
//! runs the algorithm's protocol. Conflicts surface as `Err(Abort)` and must
//! propagate to whoever drove `begin`; [`crate::atomically`] is the built-in
//! driver that rolls back and retries.
//!
//! The typed accessors share the word kernel: each width computes its word
//! address and byte mask and goes through the same read/write path. Accesses
//! must be naturally aligned (they may not cross a word boundary).

use crate::alloc::AllocatorHooks;
use crate::descriptor::{with_tx, TxMode, TxStats};
use crate::error::{fatal, Abort};
use crate::mem;
use crate::{algs, ResumeMode};

/// Begin (or nest into) a transaction on this thread.
///
/// The returned mode tells the caller which version of the critical section
/// to run. Cohort-based algorithms may block here until their gate opens.
pub fn begin() -> ResumeMode {
    with_tx(|tx| {
        tx.nesting_depth += 1;
        if tx.nesting_depth > 1 {
            return ResumeMode::Instrumented;
        }
        let (idx, alg) = algs::current();
        tx.alg_index = idx;
        tx.alg = alg;
        alg.begin(tx)
    })
}

/// Commit the current transaction. Nested frames just unwind the counter;
/// the outermost frame runs the algorithm's commit protocol and, on
/// success, the registered commit callbacks.
pub fn commit() -> Result<(), Abort> {
    let hooks = with_tx(|tx| {
        if tx.nesting_depth > 1 {
            tx.nesting_depth -= 1;
            return Ok(None);
        }
        let alg = tx.alg;
        alg.commit(tx)?;
        tx.nesting_depth = 0;
        tx.rollback_hooks.clear();
        Ok(Some(std::mem::take(&mut tx.commit_hooks)))
    })?;
    if let Some(hooks) = hooks {
        for hook in hooks {
            hook();
        }
    }
    Ok(())
}

/// Roll back the current transaction and run the registered rollback
/// callbacks.
///
/// If `exception` is non-null, buffered writes that land inside
/// `[exception, exception + len)` are materialized first, so the in-flight
/// exception object carries the transaction's writes out of the rollback.
///
/// # Safety
/// When non-null, `exception..exception + len` must be valid writable
/// memory.
pub unsafe fn rollback(exception: *mut u8, len: usize) {
    let hooks = with_tx(|tx| {
        if tx.nesting_depth == 0 {
            return Vec::new();
        }
        if !exception.is_null() && len > 0 {
            tx.writes.writeback_range(exception, len);
        }
        tx.stats.aborts += 1;
        let alg = tx.alg;
        alg.rollback(tx);
        tx.allocator.on_tx_abort();
        tx.mode = TxMode::ReadOnly;
        tx.nesting_depth = 0;
        tx.commit_hooks.clear();
        std::mem::take(&mut tx.rollback_hooks)
    });
    for hook in hooks {
        hook();
    }
}

/// Whether the current transaction runs irrevocably. None of the registered
/// algorithms support irrevocability, so this is always false.
pub fn is_irrevocable() -> bool {
    with_tx(|tx| {
        let alg = tx.alg;
        alg.is_irrevocable(tx)
    })
}

/// Request irrevocable execution. Unsupported by every registered
/// algorithm: terminates the process.
pub fn become_irrevocable() -> ! {
    fatal("irrevocability is not supported by the active algorithm")
}

/// Schedule a side effect to run only after the outermost commit succeeds,
/// after all internal cleanup.
pub fn on_commit(f: impl FnOnce() + 'static) {
    with_tx(|tx| tx.commit_hooks.push(Box::new(f)))
}

/// Schedule a side effect to run only if the transaction rolls back, after
/// all internal cleanup.
pub fn on_rollback(f: impl FnOnce() + 'static) {
    with_tx(|tx| tx.rollback_hooks.push(Box::new(f)))
}

/// Install this thread's allocator bridge.
pub fn set_allocator(hooks: Box<dyn AllocatorHooks>) {
    with_tx(|tx| tx.allocator = hooks)
}

/// This thread's lifetime transaction counters.
pub fn thread_stats() -> TxStats {
    with_tx(|tx| tx.stats)
}

fn read_kernel(addr: *const usize, mask: usize) -> Result<usize, Abort> {
    with_tx(|tx| {
        let alg = tx.alg;

        // turbo transactions read memory directly; their writes are already
        // in place, so the redo log may be stale
        if tx.mode == TxMode::Turbo {
            return alg.read(tx, addr);
        }

        // read-after-write: consult the redo log first
        if tx.mode == TxMode::Writing {
            if let Some(w) = tx.writes.find(addr) {
                if w.mask & mask == mask {
                    // full hit: answer from the buffer without the protocol
                    // read. Sound for the registered algorithms: a written
                    // address is either re-validated at commit-time acquire
                    // or published under the commit total order, so the
                    // skipped orec append cannot hide a conflict.
                    return Ok(w.val);
                }
                // partial hit: read through the protocol, then lay the
                // buffered bytes over the result
                let tmp = alg.read(tx, addr)?;
                return Ok((tmp & !w.mask) | (w.val & w.mask));
            }
        }

        alg.read(tx, addr)
    })
}

fn write_kernel(addr: *mut usize, val: usize, mask: usize) -> Result<(), Abort> {
    with_tx(|tx| {
        let alg = tx.alg;
        alg.write(tx, addr, val, mask)?;
        // first write moves dispatch off the read-only path
        if tx.mode == TxMode::ReadOnly {
            tx.mode = TxMode::Writing;
        }
        Ok(())
    })
}

/// Transactional load of one pointer-sized word.
///
/// # Safety
/// `addr` must be word-aligned and valid for the duration of the
/// transaction.
pub unsafe fn read_word(addr: *const usize) -> Result<usize, Abort> {
    read_kernel(addr, mem::FULL_MASK)
}

/// Transactional store of one pointer-sized word.
///
/// # Safety
/// Same contract as [`read_word`].
pub unsafe fn write_word(addr: *mut usize, val: usize) -> Result<(), Abort> {
    write_kernel(addr, val, mem::FULL_MASK)
}

#[inline]
fn value_mask(size: usize) -> usize {
    if size == mem::WORD_BYTES {
        mem::FULL_MASK
    } else {
        (1usize << (size * 8)) - 1
    }
}

unsafe fn read_sub(addr: usize, size: usize) -> Result<usize, Abort> {
    debug_assert!(addr % size == 0, "transactional access must be aligned");
    let base = addr & !(mem::WORD_BYTES - 1);
    let shift = (addr - base) * 8;
    let vmask = value_mask(size);
    let word = read_kernel(base as *const usize, vmask << shift)?;
    Ok((word >> shift) & vmask)
}

unsafe fn write_sub(addr: usize, size: usize, val: usize) -> Result<(), Abort> {
    debug_assert!(addr % size == 0, "transactional access must be aligned");
    let base = addr & !(mem::WORD_BYTES - 1);
    let shift = (addr - base) * 8;
    let vmask = value_mask(size);
    write_kernel(base as *mut usize, (val & vmask) << shift, vmask << shift)
}

macro_rules! typed_int_access {
    ($read:ident, $write:ident, $ty:ty) => {
        /// Transactional load of one naturally aligned value.
        ///
        /// # Safety
        /// `addr` must be aligned and valid for the duration of the
        /// transaction.
        pub unsafe fn $read(addr: *const $ty) -> Result<$ty, Abort> {
            read_sub(addr as usize, core::mem::size_of::<$ty>()).map(|v| v as $ty)
        }

        /// Transactional store of one naturally aligned value.
        ///
        /// # Safety
        /// Same contract as the matching read.
        pub unsafe fn $write(addr: *mut $ty, val: $ty) -> Result<(), Abort> {
            write_sub(addr as usize, core::mem::size_of::<$ty>(), val as usize)
        }
    };
}

typed_int_access!(read_u8, write_u8, u8);
typed_int_access!(read_u16, write_u16, u16);
typed_int_access!(read_u32, write_u32, u32);
#[cfg(target_pointer_width = "64")]
typed_int_access!(read_u64, write_u64, u64);

/// Transactional load of an `f32` through its bit pattern.
///
/// # Safety
/// Same contract as [`read_u32`].
pub unsafe fn read_f32(addr: *const f32) -> Result<f32, Abort> {
    read_u32(addr as *const u32).map(f32::from_bits)
}

/// Transactional store of an `f32` through its bit pattern.
///
/// # Safety
/// Same contract as [`write_u32`].
pub unsafe fn write_f32(addr: *mut f32, val: f32) -> Result<(), Abort> {
    write_u32(addr as *mut u32, val.to_bits())
}

/// Transactional load of an `f64` through its bit pattern.
///
/// # Safety
/// Same contract as [`read_u64`].
#[cfg(target_pointer_width = "64")]
pub unsafe fn read_f64(addr: *const f64) -> Result<f64, Abort> {
    read_u64(addr as *const u64).map(f64::from_bits)
}

/// Transactional store of an `f64` through its bit pattern.
///
/// # Safety
/// Same contract as [`write_u64`].
#[cfg(target_pointer_width = "64")]
pub unsafe fn write_f64(addr: *mut f64, val: f64) -> Result<(), Abort> {
    write_u64(addr as *mut u64, val.to_bits())
}

/// Transactional byte copy between non-overlapping regions.
///
/// # Safety
/// Both regions must be valid for the duration of the transaction.
pub unsafe fn memcpy(dest: *mut u8, src: *const u8, n: usize) -> Result<(), Abort> {
    for i in 0..n {
        let b = read_u8(src.add(i))?;
        write_u8(dest.add(i), b)?;
    }
    Ok(())
}

/// Transactional byte copy tolerating overlap.
///
/// # Safety
/// Same contract as [`memcpy`].
pub unsafe fn memmove(dest: *mut u8, src: *const u8, n: usize) -> Result<(), Abort> {
    if (dest as usize) <= (src as usize) || (src as usize) + n <= dest as usize {
        return memcpy(dest, src, n);
    }
    // overlapping with dest above src: copy backwards
    for i in (0..n).rev() {
        let b = read_u8(src.add(i))?;
        write_u8(dest.add(i), b)?;
    }
    Ok(())
}

/// Transactional byte fill.
///
/// # Safety
/// The region must be valid for the duration of the transaction.
pub unsafe fn memset(dest: *mut u8, val: u8, n: usize) -> Result<(), Abort> {
    for i in 0..n {
        write_u8(dest.add(i), val)?;
    }
    Ok(())
}

/// Used by the retry driver to detect frames left open by a panic.
pub(crate) fn nesting_depth() -> u32 {
    with_tx(|tx| tx.nesting_depth)
}
