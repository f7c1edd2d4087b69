//! Client-side half of the lobby state machine (§4.3): open the lobby bidi
//! with `VERSION`, read the server's verdict, then send `AUTHENTICATE` and
//! read its verdict. Mirrors `server::lobby` from the other side of the
//! wire, the way `UplinkSession::connect` mirrors the server's
//! hello/heartbeat handshake.

use net_protocol::error::ProtocolError;
use net_protocol::message::{
    AuthAcceptedMsg, AuthRejectedMsg, AuthRejectedReason, AuthenticateMsg, VersionAcceptedMsg,
    VersionMsg, VersionRejectedMsg,
};
use net_protocol::{Message, ProtocolVersion, RoomName, Username};
use net_transport::ProtoConn;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("server rejected our protocol version: {0:?}")]
    VersionRejected(net_protocol::VersionRejectedReason),
    #[error("server rejected our credentials: {0:?}")]
    AuthRejected(AuthRejectedReason),
    #[error("protocol error during handshake: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Clone)]
pub struct Credentials {
    pub room: RoomName,
    pub username: Username,
    pub password: String,
}

/// Run `VERSION` → `AUTHENTICATE` against `conn` and return the server's
/// negotiated version on success. `conn` is ready for steady-state use
/// (online-user queries, file requests, incoming proxy bidis) afterward.
pub async fn run_handshake(
    conn: &dyn ProtoConn,
    client_version: ProtocolVersion,
    credentials: &Credentials,
) -> Result<ProtocolVersion, HandshakeError> {
    let mut bidi = conn
        .open_bidi_with_msg(Message::Version(VersionMsg {
            version: client_version,
        }))
        .await?;

    let negotiated = match bidi.read_message().await? {
        Message::VersionAccepted(VersionAcceptedMsg { version }) => version,
        Message::VersionRejected(VersionRejectedMsg { reason, .. }) => {
            bidi.close().await;
            return Err(HandshakeError::VersionRejected(reason));
        }
        other => {
            bidi.close().await;
            return Err(HandshakeError::Protocol(ProtocolError::UnexpectedType {
                expected: net_protocol::MessageType::VersionAccepted,
                actual: other.message_type(),
            }));
        }
    };

    bidi.write_message(&Message::Authenticate(AuthenticateMsg {
        room: credentials.room.as_str().to_owned(),
        username: credentials.username.as_str().to_owned(),
        password: credentials.password.clone(),
    }))
    .await?;

    match bidi.read_message().await? {
        Message::AuthAccepted(AuthAcceptedMsg {}) => {
            bidi.close().await;
            Ok(negotiated)
        }
        Message::AuthRejected(AuthRejectedMsg { reason, .. }) => {
            bidi.close().await;
            Err(HandshakeError::AuthRejected(reason))
        }
        other => {
            bidi.close().await;
            Err(HandshakeError::Protocol(ProtocolError::UnexpectedType {
                expected: net_protocol::MessageType::AuthAccepted,
                actual: other.message_type(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_protocol::message::{AuthAcceptedMsg, VersionAcceptedMsg};
    use net_protocol::FrameCodec;
    use net_test_utils::MemoryConn;
    use net_transport::ProtoConn as _;
    use tokio_util::sync::CancellationToken;

    fn codec() -> FrameCodec {
        FrameCodec::new(net_protocol::DEFAULT_MAX_PAYLOAD)
    }

    fn credentials() -> Credentials {
        Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("alice").unwrap(),
            password: "hunter2".to_owned(),
        }
    }

    #[tokio::test]
    async fn accepted_version_and_credentials_yields_the_negotiated_version() {
        let (client, server) = MemoryConn::pair(codec());
        let ctx = CancellationToken::new();

        let server_task = tokio::spawn(async move {
            let mut bidi = server.wait_for_incoming_bidi(&ctx).await.unwrap();
            bidi.read_message().await.unwrap();
            bidi.write_message(&Message::VersionAccepted(VersionAcceptedMsg {
                version: ProtocolVersion::new(1, 0, 0),
            }))
            .await
            .unwrap();
            bidi.read_message().await.unwrap();
            bidi.write_message(&Message::AuthAccepted(AuthAcceptedMsg {}))
                .await
                .unwrap();
        });

        let negotiated = run_handshake(&client, ProtocolVersion::new(1, 0, 3), &credentials())
            .await
            .unwrap();
        assert_eq!(negotiated, ProtocolVersion::new(1, 0, 0));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_version_surfaces_as_an_error_without_sending_credentials() {
        let (client, server) = MemoryConn::pair(codec());
        let ctx = CancellationToken::new();

        tokio::spawn(async move {
            let mut bidi = server.wait_for_incoming_bidi(&ctx).await.unwrap();
            bidi.read_message().await.unwrap();
            bidi.write_message(&Message::VersionRejected(VersionRejectedMsg {
                version: ProtocolVersion::new(1, 0, 0),
                reason: net_protocol::VersionRejectedReason::TooOld,
                message: None,
            }))
            .await
            .unwrap();
        });

        let err = run_handshake(&client, ProtocolVersion::new(0, 9, 0), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::VersionRejected(net_protocol::VersionRejectedReason::TooOld)
        ));
    }

    #[tokio::test]
    async fn rejected_credentials_surfaces_as_an_error() {
        let (client, server) = MemoryConn::pair(codec());
        let ctx = CancellationToken::new();

        tokio::spawn(async move {
            let mut bidi = server.wait_for_incoming_bidi(&ctx).await.unwrap();
            bidi.read_message().await.unwrap();
            bidi.write_message(&Message::VersionAccepted(VersionAcceptedMsg {
                version: ProtocolVersion::new(1, 0, 0),
            }))
            .await
            .unwrap();
            bidi.read_message().await.unwrap();
            bidi.write_message(&Message::AuthRejected(AuthRejectedMsg {
                reason: AuthRejectedReason::AlreadyConnected,
                message: Some("username already connected".to_owned()),
            }))
            .await
            .unwrap();
        });

        let err = run_handshake(&client, ProtocolVersion::new(1, 0, 0), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::AuthRejected(AuthRejectedReason::AlreadyConnected)
        ));
    }
}
