use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A node denied a lock for one of this transaction's operations. Not
    /// fatal: abort the transaction, back off, and retry it from the top.
    #[error("lock failed")]
    LockConflict,
    #[error("cannot begin transaction: already in transaction")]
    AlreadyActive,
    #[error("no active transaction")]
    NoActiveTransaction,
    /// A participant failed or rejected the commit. Participants earlier in
    /// first-touch order may already have committed; the caller only learns
    /// that the transaction did not commit everywhere.
    #[error("commit failed")]
    CommitFailed,
    #[error(transparent)]
    Node(#[from] kvclient::Error),
}
