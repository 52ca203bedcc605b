//! Logical clock sources.
//!
//! The orec-based algorithms need a monotonic version clock. Counter-clock
//! algorithms bump the shared `timestamp` word with fetch-add; the
//! tick-clock algorithm reads the hardware timestamp counter instead, which
//! removes the commit-time contention on the shared word entirely.

#[cfg(not(target_arch = "x86_64"))]
use core::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(target_arch = "x86_64"))]
static FALLBACK_TICK: AtomicUsize = AtomicUsize::new(0);

/// Sample the tick clock.
///
/// On x86_64 this is the timestamp counter; the algorithms that use it
/// assume an invariant TSC (constant-rate, synchronized across cores), which
/// holds on every AMD64 part of the last two decades. Elsewhere a process
/// global counter stands in.
#[inline]
pub(crate) fn tick() -> usize {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc() as usize
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        FALLBACK_TICK.fetch_add(1, Ordering::SeqCst) + 1
    }
}
