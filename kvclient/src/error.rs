use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The node denied the lock for this operation. The transaction as a
    /// whole should be aborted and retried by the caller.
    #[error("lock failed")]
    LockConflict,
    #[error("connect failed: {0}")]
    Connect(#[from] tonic::transport::Error),
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
}
