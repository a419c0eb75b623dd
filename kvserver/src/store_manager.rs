use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Error;
use crate::lock_table::LockTable;
use crate::stats::Stats;
use crate::store::Store;
use crate::transaction::{Transaction, TransactionStatus};

struct NodeState {
    store: Store,
    transactions: HashMap<String, Transaction>,
    locks: LockTable,
    stats: Stats,
}

/// Owns this node's partition: the committed store, the transaction table and
/// the lock table, all mutated only under one exclusive mutex.
///
/// Every operation takes the mutex for its whole duration and never suspends
/// while holding it. That serialization is the source of the no-wait
/// guarantee: each lock acquisition is a decision made on the spot, so there
/// is nothing for a request to ever block on.
pub struct StoreManager {
    state: Mutex<NodeState>,
}

impl StoreManager {
    pub fn new() -> StoreManager {
        StoreManager {
            state: Mutex::new(NodeState {
                store: Store::new(),
                transactions: HashMap::new(),
                locks: LockTable::new(),
                stats: Stats::default(),
            }),
        }
    }

    /// Reads `key` on behalf of `tx_id`, materializing the transaction record
    /// if this is its first touch of this node.
    ///
    /// A granted read adds the key to the read set and sees the transaction's
    /// own pending write first, then the committed store, then the empty
    /// string: reading a never-written key is a successful read of "", not an
    /// error. A denied lock leaves the read set and lock table untouched.
    pub fn get(&self, tx_id: &str, key: &str) -> Result<String, Error> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.stats.gets += 1;
        let tx = state
            .transactions
            .entry(tx_id.to_string())
            .or_insert_with(|| Transaction::new(tx_id));
        if !state.locks.try_acquire_read(key, tx_id) {
            return Err(Error::LockConflict);
        }
        tx.read_set.insert(key.to_string());
        if let Some(pending) = tx.write_set.get(key) {
            return Ok(pending.clone());
        }
        Ok(state.store.get(key).unwrap_or("").to_string())
    }

    /// Stages `value` for `key` in the transaction's write set. Nothing
    /// reaches the store until commit.
    pub fn put(&self, tx_id: &str, key: &str, value: &str) -> Result<(), Error> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.stats.puts += 1;
        let tx = state
            .transactions
            .entry(tx_id.to_string())
            .or_insert_with(|| Transaction::new(tx_id));
        if !state.locks.try_acquire_write(key, tx_id) {
            return Err(Error::LockConflict);
        }
        tx.write_set.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Installs the transaction's write set into the store, releases its
    /// locks and retires the record. The install happens under the node mutex
    /// and is therefore atomic with respect to every other RPC: no reader can
    /// observe a partial apply.
    pub fn commit(&self, tx_id: &str, lead: bool) -> Result<Transaction, Error> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(mut tx) = state.transactions.remove(tx_id) else {
            return Err(Error::UnknownTransaction);
        };
        let writes = std::mem::take(&mut tx.write_set);
        state.store.apply(writes);
        state.locks.release_all(tx_id);
        tx.status = TransactionStatus::Committed;
        if lead {
            state.stats.commits += 1;
        }
        Ok(tx)
    }

    /// Discards the transaction's pending writes, releases its locks and
    /// retires the record. The staged writes were never applied, so there is
    /// nothing to undo in the store.
    pub fn abort(&self, tx_id: &str, lead: bool) -> Result<Transaction, Error> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(mut tx) = state.transactions.remove(tx_id) else {
            return Err(Error::UnknownTransaction);
        };
        tx.write_set.clear();
        state.locks.release_all(tx_id);
        tx.status = TransactionStatus::Aborted;
        if lead {
            state.stats.aborts += 1;
        }
        Ok(tx)
    }

    /// Copies the counters out under the mutex; formatting and reporting
    /// happen after release.
    pub fn stats(&self) -> Stats {
        self.state.lock().unwrap().stats
    }
}

impl Default for StoreManager {
    fn default() -> Self {
        Self::new()
    }
}
