use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The requested lock is held in an incompatible mode by another
    /// transaction. Expected and frequent under contention; the caller aborts
    /// and retries rather than waiting.
    #[error("lock conflict")]
    LockConflict,
    /// Commit/abort named a transaction this node has no record of.
    #[error("unknown transaction")]
    UnknownTransaction,
}
