//! Algorithm registry and dispatch.
//!
//! Each algorithm exposes its name, whether it can run a turbo fast path,
//! and the begin/read/write/commit/rollback protocol. The adaptivity layer
//! picks one at a time for the whole process; waiting commits observe a
//! switch through the runtime's algorithm index and surface it as an abort
//! so the retry re-dispatches through the new algorithm.

mod cohorts_eager;
mod llt_amd64;
mod orec_eager_redo;
mod pipeline_turbo;

use core::sync::atomic::Ordering;

use crate::descriptor::TxDescriptor;
use crate::error::{Abort, RuntimeError};
use crate::global::runtime;

pub(crate) use cohorts_eager::CohortsEager;
pub(crate) use llt_amd64::LltAmd64;
pub(crate) use orec_eager_redo::OrecEagerRedo;
pub(crate) use pipeline_turbo::PipelineTurbo;

/// How the caller should run the critical section after `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Run the instrumented version of the critical section.
    Instrumented,
    /// Run the uninstrumented version. Reserved for serial and irrevocable
    /// modes; none of the registered algorithms return it.
    Uninstrumented,
}

/// One STM algorithm's protocol. Implementations are stateless; all state
/// lives in the descriptor and the runtime.
pub(crate) trait TmAlgorithm: Sync {
    fn name(&self) -> &'static str;

    fn supports_turbo(&self) -> bool {
        false
    }

    /// Initialize descriptor state for an outermost transaction. May block
    /// on coordination (cohort gates) but cannot fail.
    fn begin(&self, tx: &mut TxDescriptor) -> ResumeMode;

    /// Transactional load of one word. Read-after-write resolution against
    /// the redo log happens in the caller kernel before this is reached.
    fn read(&self, tx: &mut TxDescriptor, addr: *const usize) -> Result<usize, Abort>;

    /// Transactional masked store of one word.
    fn write(
        &self,
        tx: &mut TxDescriptor,
        addr: *mut usize,
        val: usize,
        mask: usize,
    ) -> Result<(), Abort>;

    /// Run the commit protocol. On `Err` the caller rolls back and retries.
    fn commit(&self, tx: &mut TxDescriptor) -> Result<(), Abort>;

    /// Undo algorithm-specific transaction state: release or restore locks,
    /// undo in-place writes, reset buffers. Counters, allocator hooks, and
    /// user callbacks are handled by the caller.
    fn rollback(&self, tx: &mut TxDescriptor);

    fn is_irrevocable(&self, _tx: &TxDescriptor) -> bool {
        false
    }

    /// Prepare global state for this algorithm becoming live. Called at a
    /// quiescent point, with no transaction in flight anywhere.
    fn on_switch_to(&self);
}

/// The algorithms this runtime ships, in registry order. Index 0 is the
/// process default.
pub(crate) static REGISTRY: [&'static dyn TmAlgorithm; 4] =
    [&LltAmd64, &PipelineTurbo, &CohortsEager, &OrecEagerRedo];

/// The live algorithm and its registry index.
#[inline]
pub(crate) fn current() -> (usize, &'static dyn TmAlgorithm) {
    let idx = runtime().algorithm_index();
    (idx, REGISTRY[idx])
}

/// Name of the live algorithm.
pub fn current_algorithm() -> &'static str {
    current().1.name()
}

/// Make `name` the live algorithm and run its switch callback.
///
/// The caller must guarantee quiescence: no thread may be inside a
/// transaction while the switch happens. Transactions that were spinning on
/// commit-order waits observe the switch and abort themselves.
pub fn set_algorithm(name: &str) -> Result<(), RuntimeError> {
    let idx = REGISTRY
        .iter()
        .position(|alg| alg.name() == name)
        .ok_or_else(|| RuntimeError::UnknownAlgorithm(name.to_string()))?;
    runtime().algorithm.val.store(idx, Ordering::SeqCst);
    tracing::info!(
        target: "petek",
        algorithm = name,
        turbo = REGISTRY[idx].supports_turbo(),
        "switched transactional memory algorithm"
    );
    REGISTRY[idx].on_switch_to();
    Ok(())
}
