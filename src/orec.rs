//! Ownership records.
//!
//! An orec is a versioned lock word covering a stripe of addresses. The live
//! word `v` is either a version number (unlocked) or the owner's lock word
//! (locked, high bit set). `p` holds the version saved when the lock was
//! acquired so rollback can restore it.
//!
//! Multiple addresses alias onto one orec; false sharing of a record forces
//! serialization between their transactions but never breaks correctness.

use core::sync::atomic::{AtomicUsize, Ordering};

/// High bit of an orec word tags it as a lock owner id rather than a
/// version. Version sources (counters and the tick clock) never reach it.
pub(crate) const LOCK_TAG: usize = 1 << (usize::BITS - 1);

/// Number of ownership records in the table. Power of two.
pub(crate) const OREC_TABLE_SIZE: usize = 1 << 16;

/// Low address bits that fall inside one orec stripe (one word per stripe).
pub(crate) const OREC_SHIFT: usize = 3;

/// One ownership record, padded to its own cache line.
#[repr(align(64))]
pub(crate) struct Orec {
    /// Version when unlocked, owner lock word when locked.
    v: AtomicUsize,
    /// Version saved by the owner at acquire time.
    p: AtomicUsize,
}

impl Orec {
    pub(crate) const fn new() -> Self {
        Self {
            v: AtomicUsize::new(0),
            p: AtomicUsize::new(0),
        }
    }

    /// Read the live word for validation.
    #[inline]
    pub(crate) fn load(&self) -> usize {
        self.v.load(Ordering::Acquire)
    }

    /// Re-read the live word inside a check-twice sequence; the fence before
    /// this read carries the ordering.
    #[inline]
    pub(crate) fn load_relaxed(&self) -> usize {
        self.v.load(Ordering::Relaxed)
    }

    /// CAS the live word from an observed version to `lock_word`, saving the
    /// version for release. Returns false when the CAS loses.
    #[inline]
    pub(crate) fn try_acquire(&self, observed: usize, lock_word: usize) -> bool {
        if self
            .v
            .compare_exchange(observed, lock_word, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.p.store(observed, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Publish a version (or an in-place writer's order mark).
    #[inline]
    pub(crate) fn release(&self, version: usize) {
        self.v.store(version, Ordering::Release)
    }

    /// The version saved at acquire time.
    #[inline]
    pub(crate) fn saved(&self) -> usize {
        self.p.load(Ordering::Relaxed)
    }

    /// Whether a live word is a lock owner id.
    #[inline]
    pub(crate) fn is_locked(word: usize) -> bool {
        word & LOCK_TAG != 0
    }
}

/// Lock word for the descriptor occupying `slot`.
#[inline]
pub(crate) fn lock_word_for(slot: usize) -> usize {
    LOCK_TAG | slot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_words_are_tagged() {
        assert!(Orec::is_locked(lock_word_for(0)));
        assert!(Orec::is_locked(lock_word_for(117)));
        assert!(!Orec::is_locked(42));
    }

    #[test]
    fn acquire_saves_and_release_restores() {
        let o = Orec::new();
        o.release(9);
        let lock = lock_word_for(3);

        assert!(o.try_acquire(9, lock));
        assert_eq!(o.load(), lock);
        assert_eq!(o.saved(), 9);

        // a second acquirer observing the stale version loses
        assert!(!o.try_acquire(9, lock_word_for(4)));

        o.release(o.saved());
        assert_eq!(o.load(), 9);
    }
}
