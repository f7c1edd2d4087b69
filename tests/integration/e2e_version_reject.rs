//! §8 scenario 1: a client speaking an incompatible protocol version is
//! rejected during the lobby handshake, before any credentials are sent.

#[path = "support/mod.rs"]
mod support;

use client::handshake::{run_handshake, Credentials, HandshakeError};
use net_protocol::{ProtocolVersion, RoomName, Username, VersionRejectedReason};

#[tokio::test]
async fn too_old_client_version_is_rejected_without_a_round_trip_on_credentials() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    let conn = support::dial(server.addr).await;

    let credentials = Credentials {
        room: RoomName::normalize("chat").unwrap(),
        username: Username::normalize("alice").unwrap(),
        password: "hunter2".to_owned(),
    };

    // The server speaks 1.0.0 (`server::app::SERVER_VERSION`); 0.9.0 has an
    // older minor and is rejected as too_old.
    let err = run_handshake(&conn, ProtocolVersion::new(0, 9, 0), &credentials)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HandshakeError::VersionRejected(VersionRejectedReason::TooOld)
    ));

    server.shut_down().await;
}

#[tokio::test]
async fn too_new_client_version_is_rejected() {
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    let conn = support::dial(server.addr).await;

    let credentials = Credentials {
        room: RoomName::normalize("chat").unwrap(),
        username: Username::normalize("alice").unwrap(),
        password: "hunter2".to_owned(),
    };

    let err = run_handshake(&conn, ProtocolVersion::new(2, 0, 0), &credentials)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HandshakeError::VersionRejected(VersionRejectedReason::TooNew)
    ));

    server.shut_down().await;
}
