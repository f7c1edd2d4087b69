//! §8 scenario 3: opening a proxy tunnel to a peer that isn't (or is no
//! longer) online surfaces as `peer_unreachable` (stream code 101) to the
//! requester, rather than hanging or tearing down the requester's session.

#[path = "support/mod.rs"]
mod support;

use client::handshake::{run_handshake, Credentials};
use client::session_logic::RequestClient;
use net_protocol::error::ProtocolError;
use net_protocol::{RoomName, Username};

#[tokio::test]
async fn proxying_to_an_offline_username_is_peer_unreachable() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");

    let alice_conn = support::dial(server.addr).await;
    run_handshake(
        &alice_conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("alice").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();

    let bob = Username::normalize("bob").unwrap();
    let via_bob = RequestClient::via_peer(std::sync::Arc::new(alice_conn), bob);
    let err = RequestClient::new(&via_bob).ping(1).await.unwrap_err();
    assert!(matches!(err, ProtocolError::PeerUnreachable));

    server.shut_down().await;
}

#[tokio::test]
async fn proxying_with_an_invalid_target_username_is_also_peer_unreachable() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");

    let alice_conn = support::dial(server.addr).await;
    run_handshake(
        &alice_conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("alice").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();

    let mut bidi = client::session_logic::open_outbound_proxy(
        &alice_conn,
        &Username::normalize("whoever").unwrap(),
    )
    .await
    .unwrap();
    // The target is online-but-wrong here; exercise the actually-offline
    // path by never onboarding anyone named "whoever" and reading the
    // reply frame directly — the bidi is cancelled, not answered.
    let err = bidi.read_message().await.unwrap_err();
    assert!(matches!(err, ProtocolError::PeerUnreachable));

    server.shut_down().await;
}
