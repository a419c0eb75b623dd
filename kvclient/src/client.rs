use common::config::HostPort;
use proto::kvstore::kv_store_client::KvStoreClient;
use proto::kvstore::{AbortRequest, CommitRequest, GetRequest, PutRequest};
use tonic::transport::Channel;

use crate::error::Error;

/// Typed RPC client for one storage node. Lock denials surface as
/// [`Error::LockConflict`] so callers never inspect raw response flags.
pub struct NodeClient {
    host: HostPort,
    inner: KvStoreClient<Channel>,
}

impl NodeClient {
    pub async fn connect(host: &HostPort) -> Result<NodeClient, Error> {
        let inner = KvStoreClient::connect(format!("http://{host}")).await?;
        Ok(NodeClient {
            host: host.clone(),
            inner,
        })
    }

    pub fn host(&self) -> &HostPort {
        &self.host
    }

    pub async fn get(&mut self, transaction_id: &str, key: &str) -> Result<String, Error> {
        let response = self
            .inner
            .get(GetRequest {
                key: key.to_string(),
                transaction_id: transaction_id.to_string(),
            })
            .await?
            .into_inner();
        if response.lock_fail {
            return Err(Error::LockConflict);
        }
        Ok(response.value)
    }

    pub async fn put(
        &mut self,
        transaction_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let response = self
            .inner
            .put(PutRequest {
                key: key.to_string(),
                value: value.to_string(),
                transaction_id: transaction_id.to_string(),
            })
            .await?
            .into_inner();
        if response.lock_fail {
            return Err(Error::LockConflict);
        }
        Ok(())
    }

    /// Returns whether the node accepted the commit. `false` means the node
    /// had no record of the transaction, which the protocol treats as a
    /// normal outcome rather than an error.
    pub async fn commit(&mut self, transaction_id: &str, lead: bool) -> Result<bool, Error> {
        let response = self
            .inner
            .commit(CommitRequest {
                transaction_id: transaction_id.to_string(),
                lead,
            })
            .await?
            .into_inner();
        Ok(response.success)
    }

    pub async fn abort(&mut self, transaction_id: &str, lead: bool) -> Result<bool, Error> {
        let response = self
            .inner
            .abort(AbortRequest {
                transaction_id: transaction_id.to_string(),
                lead,
            })
            .await?
            .into_inner();
        Ok(response.success)
    }
}
