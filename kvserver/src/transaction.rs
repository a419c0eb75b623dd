use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

/// Per-node bookkeeping for one transaction. There is no explicit begin on
/// the wire: the record is materialized lazily by the first get/put naming
/// the id, and removed from the node when the transaction commits or aborts.
#[derive(Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub read_set: HashSet<String>,
    /// Pending writes, staged here until commit installs them into the store.
    pub write_set: HashMap<String, String>,
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn new(id: impl Into<String>) -> Transaction {
        Transaction {
            id: id.into(),
            read_set: HashSet::new(),
            write_set: HashMap::new(),
            status: TransactionStatus::Active,
        }
    }
}
