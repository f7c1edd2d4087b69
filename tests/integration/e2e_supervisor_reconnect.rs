//! The supervisor ("nanny", §4.6) driven against a real QUIC server rather
//! than `MemoryConn`: connects, serves a share, survives a forced
//! disconnect/reconnect cycle, and tears down cleanly on `close`.

#[path = "support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use client::handshake::Credentials;
use client::session_logic::{ShareLogic, ShareRegistry};
use client::supervisor::{QuicDialer, SessionState, Supervisor};
use net_protocol::RoomName;
use net_protocol::Username;
use net_transport::endpoint::client_endpoint;
use storage::SqliteCertStore;
use tokio_util::sync::CancellationToken;

fn credentials() -> Credentials {
    Credentials {
        room: RoomName::normalize("chat").unwrap(),
        username: Username::normalize("alice").unwrap(),
        password: "hunter2".to_owned(),
    }
}

#[tokio::test]
async fn supervisor_reaches_open_over_a_real_quic_dial_and_closes_cleanly() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");

    let certs = Arc::new(SqliteCertStore::open_in_memory().unwrap());
    let endpoint = client_endpoint("127.0.0.1:0".parse().unwrap(), certs).unwrap();
    let dialer: Arc<QuicDialer> = Arc::new(QuicDialer::new(endpoint));
    let logic = Arc::new(ShareLogic::new(ShareRegistry::new()));

    let supervisor = Supervisor::new(
        server.addr.to_string(),
        credentials(),
        support::CLIENT_VERSION,
        dialer,
        logic,
    );
    supervisor.connect();

    let ctx = CancellationToken::new();
    let session = tokio::time::timeout(Duration::from_secs(5), supervisor.wait_open(&ctx))
        .await
        .expect("wait_open timed out")
        .unwrap();
    assert_eq!(session.version, support::CLIENT_VERSION);
    assert_eq!(supervisor.state().await, SessionState::Open);

    supervisor.disconnect().await;
    supervisor.close().await;
    assert_eq!(supervisor.state().await, SessionState::Closed);

    server.shut_down().await;
}

#[tokio::test]
async fn supervisor_reconnects_after_the_server_restarts_on_the_same_port() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");
    let addr = server.addr;

    let certs = Arc::new(SqliteCertStore::open_in_memory().unwrap());
    let endpoint = client_endpoint("127.0.0.1:0".parse().unwrap(), certs).unwrap();
    let dialer: Arc<QuicDialer> = Arc::new(QuicDialer::new(endpoint));
    let logic = Arc::new(ShareLogic::new(ShareRegistry::new()));

    let supervisor = Supervisor::new(
        addr.to_string(),
        credentials(),
        support::CLIENT_VERSION,
        dialer,
        logic,
    );
    supervisor.connect();

    let ctx = CancellationToken::new();
    tokio::time::timeout(Duration::from_secs(5), supervisor.wait_open(&ctx))
        .await
        .expect("initial wait_open timed out")
        .unwrap();

    // Kill the server out from under the open session; the supervisor's
    // read loop observes the connection drop and the daemon starts backing
    // off and redialing the now-dead address. A freshly bound server stands
    // in for "the server came back" (on a new ephemeral port, since the old
    // one no longer has a listener).
    server.kill().await;

    let server2 = support::TestServer::start_with(vec![("chat", vec![])], 10).await;
    server2.create_account("chat", "alice", "hunter2");
    // Repoint the supervisor at the new address the way a config reload /
    // DNS change would (§4.7 "takes effect on next reconnect").
    supervisor.reconfigure(Some(server2.addr.to_string()), None, None, None).await;

    let session = tokio::time::timeout(Duration::from_secs(30), supervisor.wait_open(&ctx))
        .await
        .expect("reconnect wait_open timed out")
        .unwrap();
    assert_eq!(session.version, support::CLIENT_VERSION);

    supervisor.close().await;
    server2.shut_down().await;
}
