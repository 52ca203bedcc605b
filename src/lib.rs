//! Petek: a software transactional memory runtime.
//!
//! Application threads execute speculative critical sections against shared
//! memory with serializable semantics. Concurrency control is built on
//! ownership records (orecs): versioned lock words that a stable hash
//! associates with stripes of addresses. Four commit protocols ship in the
//! registry, selectable at runtime:
//!
//! - **LLTAMD64**: lazy-acquire orecs with the hardware tick counter as the
//!   version clock; check-twice reads, commit-time locking.
//! - **PipelineTurbo**: transactions commit in begin order; the oldest one
//!   switches to in-place execution.
//! - **CohortsEager**: transactions run in batches that begin and commit
//!   together, with validation skipped for the first committer of a cohort.
//! - **OrecEagerRedo**: encounter-time locking with a redo log and
//!   timestamp extension.
//!
//! # Example
//!
//! ```
//! use petek::{abi, atomically};
//!
//! let mut cell = 0usize;
//! let addr = &mut cell as *mut usize;
//!
//! atomically(|| unsafe {
//!     let v = abi::read_word(addr)?;
//!     abi::write_word(addr, v + 1)?;
//!     Ok(())
//! });
//! assert_eq!(cell, 1);
//! ```
//!
//! The `abi` module is the surface instrumented user code calls: word and
//! typed accessors, memcpy/memmove/memset bridges, begin/commit/rollback,
//! and the allocator and callback hooks. `atomically` is the built-in retry
//! driver around it.
//!
//! DANGER AHEAD: don't run I/O inside a transaction. The closure may be
//! retried any number of times; use `abi::on_commit` for side effects.

mod algs;
mod clock;
mod descriptor;
mod error;
mod global;
mod logs;
mod mem;
mod orec;

pub mod abi;
pub mod alloc;

pub use algs::{current_algorithm, set_algorithm, ResumeMode};
pub use descriptor::TxStats;
pub use error::{Abort, RuntimeError};

use crossbeam_utils::Backoff;

/// Rolls the transaction back if the frame unwinds without committing, so a
/// panic inside the closure cannot leave locks held or counters hanging.
struct TxGuard {
    armed: bool,
}

impl TxGuard {
    fn new() -> Self {
        Self { armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TxGuard {
    fn drop(&mut self) {
        if self.armed && abi::nesting_depth() > 0 {
            unsafe { abi::rollback(core::ptr::null_mut(), 0) };
        }
    }
}

/// Execute a closure atomically under the live algorithm, retrying on
/// conflict until it commits.
///
/// The closure observes a consistent snapshot through the `abi` accessors
/// and signals internal conflicts by propagating their `Err(Abort)` with
/// `?`. This is the outermost frame: compose nested logic with ordinary
/// closures inside one transaction rather than calling `atomically` again.
///
/// # Example
///
/// ```
/// use petek::{abi, atomically};
///
/// let mut balance = 100usize;
/// let addr = &mut balance as *mut usize;
///
/// let before = atomically(|| unsafe {
///     let v = abi::read_word(addr)?;
///     abi::write_word(addr, v - 10)?;
///     Ok(v)
/// });
/// assert_eq!(before, 100);
/// assert_eq!(balance, 90);
/// ```
pub fn atomically<T, F>(mut f: F) -> T
where
    F: FnMut() -> Result<T, Abort>,
{
    assert_eq!(
        abi::nesting_depth(),
        0,
        "atomically cannot nest; compose closures inside one transaction"
    );

    let backoff = Backoff::new();
    loop {
        let guard = TxGuard::new();
        abi::begin();

        match f().and_then(|v| abi::commit().map(|()| v)) {
            Ok(v) => {
                guard.disarm();
                return v;
            }
            Err(reason) => {
                guard.disarm();
                unsafe { abi::rollback(core::ptr::null_mut(), 0) };
                tracing::trace!(target: "petek", %reason, "transaction rolled back, retrying");
                backoff.snooze();
            }
        }
    }
}
