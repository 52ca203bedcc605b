use core::fmt;

/// Reasons a transaction must unwind to its begin frame.
///
/// Conflict aborts are internal control flow: the retry driver rolls the
/// transaction back and re-enters it. They are never surfaced to user code
/// beyond the rollback callbacks and the abort counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    /// An orec version moved, an acquisition CAS lost, or read-set
    /// validation failed.
    Conflict,
    /// The runtime switched algorithms while this transaction was waiting;
    /// the retry must re-dispatch through the new algorithm.
    AlgorithmChanged,
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::Conflict => write!(f, "transaction conflict, rollback required"),
            Abort::AlgorithmChanged => {
                write!(f, "algorithm switched mid-transaction, rollback required")
            }
        }
    }
}

impl std::error::Error for Abort {}

/// Errors from the runtime surface itself, outside any transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The requested algorithm is not in the registry.
    UnknownAlgorithm(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::UnknownAlgorithm(name) => {
                write!(f, "unknown transactional memory algorithm '{}'", name)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Emit one diagnostic and terminate the process.
///
/// Used for operations the active algorithm cannot recover from, such as
/// rolling back a turbo-mode transaction that has already written in place.
pub(crate) fn fatal(msg: &str) -> ! {
    tracing::error!(target: "petek", "{}", msg);
    std::process::abort();
}
