//! §8 scenario 2: a second login for an already-connected username is
//! rejected with `already_connected`, and the first session is left intact.

#[path = "support/mod.rs"]
mod support;

use client::handshake::{run_handshake, Credentials, HandshakeError};
use client::session_logic::RequestClient;
use net_protocol::message::AuthRejectedReason;
use net_protocol::RoomName;
use net_protocol::Username;

#[tokio::test]
async fn second_login_for_the_same_username_is_rejected_and_first_stays_connected() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");

    let credentials = Credentials {
        room: RoomName::normalize("chat").unwrap(),
        username: Username::normalize("alice").unwrap(),
        password: "hunter2".to_owned(),
    };

    let first = support::dial(server.addr).await;
    run_handshake(&first, support::CLIENT_VERSION, &credentials)
        .await
        .expect("first login should succeed");

    let second = support::dial(server.addr).await;
    let err = run_handshake(&second, support::CLIENT_VERSION, &credentials)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HandshakeError::AuthRejected(AuthRejectedReason::AlreadyConnected)
    ));

    // The first session is unaffected: it can still make requests.
    let users = RequestClient::new(&first).get_online_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].as_str(), "alice");

    server.shut_down().await;
}
