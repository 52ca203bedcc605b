//! Allocator bridge.
//!
//! The memory allocator that defers frees until commit and retracts
//! speculative allocations on abort lives outside the runtime; it observes
//! transaction boundaries through these hooks, installed per thread with
//! [`crate::abi::set_allocator`].

/// Hooks called at the boundaries of every outermost transaction.
pub trait AllocatorHooks: 'static {
    /// The thread is entering an outermost transaction.
    fn on_tx_begin(&mut self) {}
    /// The transaction committed; deferred frees may be performed.
    fn on_tx_commit(&mut self) {}
    /// The transaction rolled back; speculative allocations must be
    /// retracted.
    fn on_tx_abort(&mut self) {}
}

/// Default hooks for callers without a transactional allocator.
pub struct NoopAllocator;

impl AllocatorHooks for NoopAllocator {}
