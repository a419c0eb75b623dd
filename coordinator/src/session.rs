use std::collections::hash_map::Entry;
use std::collections::HashMap;

use common::config::HostPort;
use common::routing;
use common::transaction_id::TransactionIdAllocator;
use kvclient::NodeClient;
use tracing::warn;

use crate::error::Error;
use crate::transaction::Transaction;

/// One logical client of the store, driving at most one transaction at a
/// time and acting as the 2PC coordinator for it.
///
/// A session routes every key to its owning node, accumulates the set of
/// participants as the transaction touches them, and fans commit/abort out to
/// all of them. Connections are cached per node for the life of the session.
/// Sessions are single-owner: run several independent sessions for
/// concurrency rather than sharing one.
pub struct Session {
    hosts: Vec<HostPort>,
    ids: TransactionIdAllocator,
    connections: HashMap<HostPort, NodeClient>,
    active: Option<Transaction>,
}

impl Session {
    /// Creates a session over the given nodes. An empty list means the
    /// single-node default endpoint.
    pub fn new(hosts: Vec<HostPort>) -> Session {
        let hosts = if hosts.is_empty() {
            vec![HostPort::default_local()]
        } else {
            hosts
        };
        Session {
            hosts,
            ids: TransactionIdAllocator::new(),
            connections: HashMap::new(),
            active: None,
        }
    }

    /// Starts a new transaction. Purely client-local: nodes learn about the
    /// transaction from its first get/put.
    pub fn begin(&mut self) -> Result<(), Error> {
        if self.active.is_some() {
            return Err(Error::AlreadyActive);
        }
        let id = self.ids.allocate().to_string();
        self.active = Some(Transaction::new(id));
        Ok(())
    }

    /// Reads `key` within the active transaction. A key this transaction has
    /// written is served from the local write buffer without an RPC.
    pub async fn get(&mut self, key: &str) -> Result<String, Error> {
        let tx = self.active.as_ref().ok_or(Error::NoActiveTransaction)?;
        if let Some(value) = tx.write_set.get(key) {
            return Ok(value.clone());
        }
        let tx_id = tx.id.clone();
        let host = routing::owner_for_key(key, &self.hosts).clone();
        let conn = self.connection(&host).await?;
        let result = conn.get(&tx_id, key).await;
        // Dialed successfully, so the node must see the commit/abort
        // broadcast even when this operation is denied or fails in flight.
        let tx = self.active.as_mut().ok_or(Error::NoActiveTransaction)?;
        tx.record_participant(&host);
        match result {
            Ok(value) => Ok(value),
            Err(kvclient::Error::LockConflict) => Err(Error::LockConflict),
            Err(e) => Err(Error::Node(e)),
        }
    }

    /// Writes `key` within the active transaction. The value is buffered
    /// locally before the node acknowledges, so the transaction's own reads
    /// see it immediately; a denied lock is followed by the caller's abort,
    /// which discards the buffer.
    pub async fn put(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let tx = self.active.as_mut().ok_or(Error::NoActiveTransaction)?;
        tx.write_set
            .insert(key.to_string(), value.to_string());
        let tx_id = tx.id.clone();
        let host = routing::owner_for_key(key, &self.hosts).clone();
        let conn = self.connection(&host).await?;
        let result = conn.put(&tx_id, key, value).await;
        let tx = self.active.as_mut().ok_or(Error::NoActiveTransaction)?;
        tx.record_participant(&host);
        match result {
            Ok(()) => Ok(()),
            Err(kvclient::Error::LockConflict) => Err(Error::LockConflict),
            Err(e) => Err(Error::Node(e)),
        }
    }

    /// Commits the active transaction on every participant, lead first. The
    /// locks held since the operation phase stand in for a prepare round: any
    /// conflicting transaction has already been turned away, so commit is a
    /// single round that installs writes and releases locks.
    ///
    /// # Panics
    ///
    /// Panics when there is no active transaction; committing outside a
    /// transaction is a programming error, not a runtime condition.
    pub async fn commit(&mut self) -> Result<(), Error> {
        let Some(tx) = self.active.take() else {
            panic!("cannot commit: no active transaction");
        };
        let mut success = true;
        for (i, host) in tx.participants.iter().enumerate() {
            let outcome = match self.connections.get_mut(host) {
                Some(conn) => conn.commit(&tx.id, i == 0).await,
                None => Ok(false),
            };
            match outcome {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    success = false;
                    break;
                }
            }
        }
        if success {
            Ok(())
        } else {
            Err(Error::CommitFailed)
        }
    }

    /// Aborts the active transaction on every participant, ignoring
    /// per-participant failures: abort is best-effort cleanup. Calling it
    /// with no active transaction is a harmless no-op that warns.
    pub async fn abort(&mut self) -> Result<(), Error> {
        let Some(tx) = self.active.take() else {
            warn!("abort called with no active transaction");
            return Err(Error::NoActiveTransaction);
        };
        for (i, host) in tx.participants.iter().enumerate() {
            if let Some(conn) = self.connections.get_mut(host) {
                let _ = conn.abort(&tx.id, i == 0).await;
            }
        }
        Ok(())
    }

    async fn connection(&mut self, host: &HostPort) -> Result<&mut NodeClient, Error> {
        match self.connections.entry(host.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let client = NodeClient::connect(host).await?;
                Ok(entry.insert(client))
            }
        }
    }
}
