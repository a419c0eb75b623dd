use std::sync::Arc;
use std::time::{Duration, Instant};

use proto::kvstore::kv_store_server::{KvStore, KvStoreServer};
use proto::kvstore::{
    AbortRequest, AbortResponse, CommitRequest, CommitResponse, GetRequest, GetResponse,
    PutRequest, PutResponse,
};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use crate::error::Error;
use crate::store_manager::StoreManager;

/// gRPC surface of one storage node. All transaction semantics live in
/// [`StoreManager`]; this layer only translates between wire messages and the
/// manager's typed results.
pub struct KvService {
    manager: Arc<StoreManager>,
}

impl KvService {
    pub fn new(manager: Arc<StoreManager>) -> KvService {
        KvService { manager }
    }
}

#[tonic::async_trait]
impl KvStore for KvService {
    #[instrument(skip(self, request))]
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        let response = match self.manager.get(&req.transaction_id, &req.key) {
            Ok(value) => GetResponse {
                value,
                success: true,
                lock_fail: false,
            },
            Err(Error::LockConflict) => GetResponse {
                value: String::new(),
                success: false,
                lock_fail: true,
            },
            Err(e) => return Err(Status::internal(e.to_string())),
        };
        Ok(Response::new(response))
    }

    #[instrument(skip(self, request))]
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = request.into_inner();
        let response = match self.manager.put(&req.transaction_id, &req.key, &req.value) {
            Ok(()) => PutResponse {
                success: true,
                lock_fail: false,
            },
            Err(Error::LockConflict) => PutResponse {
                success: false,
                lock_fail: true,
            },
            Err(e) => return Err(Status::internal(e.to_string())),
        };
        Ok(Response::new(response))
    }

    #[instrument(skip(self, request))]
    async fn commit(
        &self,
        request: Request<CommitRequest>,
    ) -> Result<Response<CommitResponse>, Status> {
        let req = request.into_inner();
        // An unknown transaction id is reported as success=false, not as an
        // RPC error: commit of a transaction this node never saw is a normal
        // protocol outcome.
        let success = match self.manager.commit(&req.transaction_id, req.lead) {
            Ok(_) => true,
            Err(Error::UnknownTransaction) => false,
            Err(e) => return Err(Status::internal(e.to_string())),
        };
        Ok(Response::new(CommitResponse { success }))
    }

    #[instrument(skip(self, request))]
    async fn abort(
        &self,
        request: Request<AbortRequest>,
    ) -> Result<Response<AbortResponse>, Status> {
        let req = request.into_inner();
        let success = match self.manager.abort(&req.transaction_id, req.lead) {
            Ok(_) => true,
            Err(Error::UnknownTransaction) => false,
            Err(e) => return Err(Status::internal(e.to_string())),
        };
        Ok(Response::new(AbortResponse { success }))
    }
}

/// Serves the node on `listener` until the token is cancelled, reporting
/// per-second request rates in the background.
pub async fn run_kv_server(
    listener: TcpListener,
    cancellation_token: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manager = Arc::new(StoreManager::new());
    spawn_stats_reporter(manager.clone(), cancellation_token.clone());

    let addr = listener.local_addr()?;
    info!("KvStore server listening on {}", addr);

    tonic::transport::Server::builder()
        .add_service(KvStoreServer::new(KvService::new(manager)))
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            cancellation_token.cancelled_owned(),
        )
        .await?;
    Ok(())
}

fn spawn_stats_reporter(manager: Arc<StoreManager>, cancellation_token: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        // The first tick completes immediately; consume it so the first
        // report covers a real interval.
        interval.tick().await;
        let mut prev = manager.stats();
        let mut last_report = Instant::now();
        loop {
            tokio::select! {
                () = cancellation_token.cancelled() => return,
                _ = interval.tick() => {}
            }
            let now = Instant::now();
            let current = manager.stats();
            let diff = current.delta(&prev);
            let secs = now.duration_since(last_report).as_secs_f64();
            info!(
                "get/s {:.2} put/s {:.2} ops/s {:.2} commit/s {:.2} abort/s {:.2}",
                diff.gets as f64 / secs,
                diff.puts as f64 / secs,
                (diff.gets + diff.puts) as f64 / secs,
                diff.commits as f64 / secs,
                diff.aborts as f64 / secs,
            );
            prev = current;
            last_report = now;
        }
    });
}
