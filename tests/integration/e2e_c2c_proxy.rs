//! Full client-to-client proxy relay (§4.4, §4.5, §9 "interface
//! polymorphism"): two real peers connected to the same server, one serving
//! a share, the other reading it entirely through `OPEN_OUTBOUND_PROXY` /
//! `INBOUND_PROXY` relay rather than a direct connection.

#[path = "support/mod.rs"]
mod support;

use std::sync::Arc;

use client::handshake::{run_handshake, Credentials};
use client::session_logic::{RequestClient, ShareLogic, ShareRegistry};
use net_protocol::{RoomName, Share, Username};
use net_transport::ProtoConn;
use tokio_util::sync::CancellationToken;

/// Runs bob's serve loop for exactly one incoming bidi, the way
/// `client::supervisor::run_serve_loop_until_ended` would for a supervised
/// session, without pulling in the whole supervisor for a one-shot test.
async fn serve_one(conn: Arc<dyn ProtoConn>, logic: Arc<ShareLogic>) {
    let ctx = CancellationToken::new();
    let bidi = conn.wait_for_incoming_bidi(&ctx).await.unwrap();
    logic.handle_incoming_bidi(bidi).await;
}

#[tokio::test]
async fn alice_reads_bobs_share_entirely_through_the_servers_proxy_relay() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"hello from bob").unwrap();

    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");
    server.create_account("chat", "bob", "hunter2");

    let alice_conn: Arc<dyn ProtoConn> = Arc::new(support::dial(server.addr).await);
    run_handshake(
        &*alice_conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("alice").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();

    let bob_conn: Arc<dyn ProtoConn> = Arc::new(support::dial(server.addr).await);
    run_handshake(
        &*bob_conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("bob").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();

    let mut bob_shares: ShareRegistry = ShareRegistry::new();
    bob_shares.insert(
        "docs".to_owned(),
        Arc::new(share_fs::LocalFsShare::new(dir.path())) as Arc<dyn Share>,
    );
    let bob_logic = Arc::new(ShareLogic::new(bob_shares));

    let serve = tokio::spawn(serve_one(bob_conn.clone(), bob_logic.clone()));

    let bob = Username::normalize("bob").unwrap();
    let via_bob = RequestClient::via_peer(alice_conn.clone(), bob);
    let request_client = RequestClient::new(&via_bob);

    let meta = request_client.get_file_meta("/docs/hello.txt").await.unwrap();
    assert_eq!(meta.size_bytes, 14);
    assert!(!meta.is_dir);

    serve.await.unwrap();
    server.shut_down().await;
}

#[tokio::test]
async fn alice_streams_a_range_read_from_bobs_share_through_the_relay() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("six.bin"), b"abcdef").unwrap();

    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");
    server.create_account("chat", "bob", "hunter2");

    let alice_conn: Arc<dyn ProtoConn> = Arc::new(support::dial(server.addr).await);
    run_handshake(
        &*alice_conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("alice").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();

    let bob_conn: Arc<dyn ProtoConn> = Arc::new(support::dial(server.addr).await);
    run_handshake(
        &*bob_conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("bob").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();

    let mut bob_shares: ShareRegistry = ShareRegistry::new();
    bob_shares.insert(
        "docs".to_owned(),
        Arc::new(share_fs::LocalFsShare::new(dir.path())) as Arc<dyn Share>,
    );
    let bob_logic = Arc::new(ShareLogic::new(bob_shares));
    let serve = tokio::spawn(serve_one(bob_conn.clone(), bob_logic.clone()));

    let bob = Username::normalize("bob").unwrap();
    let via_bob = RequestClient::via_peer(alice_conn.clone(), bob);
    let (meta, mut bidi) = RequestClient::new(&via_bob).get_file("/docs/six.bin", 2, 3).await.unwrap();
    assert_eq!(meta.size_bytes, 6);
    let mut buf = Vec::new();
    bidi.copy_to_writer(&mut buf, 3).await.unwrap();
    assert_eq!(buf, b"cde");

    serve.await.unwrap();
    server.shut_down().await;
}
