use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct LockInfo {
    readers: HashSet<String>,
    writer: Option<String>,
}

// Per-key multi-reader/single-writer lock table under no-wait two-phase
// locking: an incompatible request is denied immediately, never queued. The
// caller aborts the whole transaction and retries, which is what keeps the
// scheme deadlock-free.
//
// Entries are created lazily on first acquisition and removed as soon as they
// hold no readers and no writer.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: HashMap<String, LockInfo>,
}

impl LockTable {
    pub fn new() -> LockTable {
        LockTable {
            locks: HashMap::new(),
        }
    }

    /// Attempts to take a read lock on `key` for `tx_id`. Grants are
    /// idempotent, and holding the write lock already implies read access.
    pub fn try_acquire_read(&mut self, key: &str, tx_id: &str) -> bool {
        let info = self.locks.entry(key.to_string()).or_default();
        if info.readers.contains(tx_id) {
            return true;
        }
        if info.writer.as_deref() == Some(tx_id) {
            return true;
        }
        if info.writer.is_none() {
            info.readers.insert(tx_id.to_string());
            return true;
        }
        false
    }

    /// Attempts to take the write lock on `key` for `tx_id`. A sole reader
    /// may upgrade; with any other reader present the upgrade is refused,
    /// since two coexisting readers both wishing to upgrade would deadlock.
    pub fn try_acquire_write(&mut self, key: &str, tx_id: &str) -> bool {
        let info = self.locks.entry(key.to_string()).or_default();
        if info.writer.as_deref() == Some(tx_id) {
            return true;
        }
        if info.writer.is_some() {
            return false;
        }
        if info.readers.is_empty() {
            info.writer = Some(tx_id.to_string());
            return true;
        }
        if info.readers.len() == 1 && info.readers.contains(tx_id) {
            info.readers.clear();
            info.writer = Some(tx_id.to_string());
            return true;
        }
        false
    }

    /// Releases every lock `tx_id` holds, dropping entries that become empty.
    /// The writer must be cleared before the emptiness check so a writer-only
    /// entry is not skipped by the scan.
    pub fn release_all(&mut self, tx_id: &str) {
        self.locks.retain(|_, info| {
            info.readers.remove(tx_id);
            if info.writer.as_deref() == Some(tx_id) {
                info.writer = None;
            }
            !(info.readers.is_empty() && info.writer.is_none())
        });
    }
}
