//! Account lifecycle (§4.4): duplicate creation is rejected, and deleting
//! an account kicks its online session so a subsequent request on that
//! connection observes the peer gone.

#[path = "support/mod.rs"]
mod support;

use client::handshake::{run_handshake, Credentials};
use net_protocol::password::PasswordHasher as _;
use net_protocol::RoomName;
use net_protocol::Username;
use password::Argon2PasswordHasher;
use storage::AccountError;

#[tokio::test]
async fn duplicate_account_creation_is_rejected() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    let room = RoomName::normalize("chat").unwrap();
    let username = Username::normalize("alice").unwrap();
    let hasher = Argon2PasswordHasher::default();
    let hash = hasher.hash("hunter2").unwrap();

    let room_handle = server.app.room(&room).unwrap();
    room_handle.create_account(&username, &hash).unwrap();
    let err = room_handle.create_account(&username, &hash).unwrap_err();
    assert!(matches!(err, AccountError::AccountExists));

    server.shut_down().await;
}

#[tokio::test]
async fn deleting_an_account_kicks_its_online_session() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    server.create_account("chat", "alice", "hunter2");

    let conn = support::dial(server.addr).await;
    run_handshake(
        &conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("alice").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();

    let room = RoomName::normalize("chat").unwrap();
    let username = Username::normalize("alice").unwrap();
    server.app.room(&room).unwrap().delete_account(&username).await.unwrap();

    // The connection was closed by the server as part of the kick; a fresh
    // request on it observes the closed connection rather than succeeding.
    let result = client::session_logic::RequestClient::new(&conn).ping(1).await;
    assert!(result.is_err());

    server.shut_down().await;
}
