use common::config::HostPort;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TestNode {
    pub host: HostPort,
    pub cancellation_token: CancellationToken,
}

/// Starts a storage node on an ephemeral local port. The node serves until
/// the returned token is cancelled.
pub async fn start_node() -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = HostPort::from_socket_addr(listener.local_addr().unwrap());
    let cancellation_token = CancellationToken::new();
    let token = cancellation_token.clone();
    tokio::spawn(async move {
        crate::server::run_kv_server(listener, token).await.unwrap();
    });
    TestNode {
        host,
        cancellation_token,
    }
}
