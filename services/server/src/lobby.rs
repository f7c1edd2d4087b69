//! Handshake (lobby) state machine (§4.3): version negotiation then
//! authentication, over the first bidi a freshly accepted connection opens.
//!
//! The lobby never writes `AUTH_ACCEPTED` itself — on successful credential
//! verification it hands the still-open bidi back to the caller, which
//! passes it to [`crate::room::Room::onboard`] so a duplicate-login refusal
//! can still be reported on the same stream (§4.3).

use std::sync::Arc;
use std::time::Duration;

use net_protocol::error::ProtocolError;
use net_protocol::message::{
    AuthRejectedMsg, AuthRejectedReason, AuthenticateMsg, VersionMsg, VersionRejectedMsg,
};
use net_protocol::password::{PasswordHasher, VerifyOutcome};
use net_protocol::{Message, MessageType, ProtocolVersion, RoomName, Username};
use net_transport::ProtoBidi;
use storage::AccountStore;

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("client rejected our version: {0:?}")]
    VersionRejected(net_protocol::VersionRejectedReason),
    #[error("authentication rejected: {0:?}")]
    AuthRejected(AuthRejectedReason),
    #[error("handshake did not complete within the budget")]
    Timeout,
    #[error("protocol error during handshake: {0}")]
    Protocol(#[from] ProtocolError),
}

/// What the lobby hands off to the room on success.
pub struct LobbyOutcome {
    pub version: ProtocolVersion,
    pub room: RoomName,
    pub username: Username,
}

/// Run the version → authenticate sequence on `bidi`, bounded by `budget`
/// (§4.3 default 10s). Returns the still-open bidi plus the outcome on
/// success so the caller can hand both to the room.
pub async fn run_handshake<H: PasswordHasher>(
    bidi: ProtoBidi,
    budget: Duration,
    server_version: ProtocolVersion,
    accounts: Arc<AccountStore>,
    hasher: Arc<H>,
) -> Result<(ProtoBidi, LobbyOutcome), LobbyError> {
    tokio::time::timeout(
        budget,
        run_handshake_inner(bidi, server_version, accounts, hasher),
    )
    .await
    .map_err(|_| LobbyError::Timeout)?
}

async fn run_handshake_inner<H: PasswordHasher>(
    mut bidi: ProtoBidi,
    server_version: ProtocolVersion,
    accounts: Arc<AccountStore>,
    hasher: Arc<H>,
) -> Result<(ProtoBidi, LobbyOutcome), LobbyError> {
    let client_version = negotiate_version(&mut bidi, server_version).await?;
    let (room, username, password) = read_credentials(&mut bidi).await?;
    verify_credentials(&mut bidi, &accounts, &hasher, &room, &username, &password).await?;

    Ok((
        bidi,
        LobbyOutcome {
            version: client_version,
            room,
            username,
        },
    ))
}

async fn negotiate_version(
    bidi: &mut ProtoBidi,
    server_version: ProtocolVersion,
) -> Result<ProtocolVersion, LobbyError> {
    let msg = bidi.read_expecting(MessageType::Version).await?;
    let Message::Version(VersionMsg { version: client_version }) = msg else {
        unreachable!("read_expecting guarantees the Version variant")
    };

    match ProtocolVersion::negotiate(&server_version, &client_version) {
        None => {
            bidi.write_message(&Message::VersionAccepted(
                net_protocol::message::VersionAcceptedMsg {
                    version: server_version,
                },
            ))
            .await?;
            Ok(client_version)
        }
        Some(reason) => {
            bidi.write_message(&Message::VersionRejected(VersionRejectedMsg {
                version: server_version,
                reason,
                message: None,
            }))
            .await?;
            bidi.close().await;
            Err(LobbyError::VersionRejected(reason))
        }
    }
}

async fn read_credentials(
    bidi: &mut ProtoBidi,
) -> Result<(RoomName, Username, String), LobbyError> {
    let msg = bidi.read_expecting(MessageType::Authenticate).await?;
    let Message::Authenticate(AuthenticateMsg {
        room,
        username,
        password,
    }) = msg
    else {
        unreachable!("read_expecting guarantees the Authenticate variant")
    };

    let normalized_room = RoomName::normalize(&room);
    let normalized_user = Username::normalize(&username);
    match (normalized_room, normalized_user) {
        (Ok(r), Ok(u)) => Ok((r, u, password)),
        _ => {
            reject_auth(bidi, AuthRejectedReason::InvalidCredentials).await;
            Err(LobbyError::AuthRejected(AuthRejectedReason::InvalidCredentials))
        }
    }
}

async fn verify_credentials<H: PasswordHasher>(
    bidi: &mut ProtoBidi,
    accounts: &Arc<AccountStore>,
    hasher: &H,
    room: &RoomName,
    username: &Username,
    password: &str,
) -> Result<(), LobbyError> {
    let Ok(Some(record)) = accounts.get_account(room, username) else {
        reject_auth(bidi, AuthRejectedReason::InvalidCredentials).await;
        return Err(LobbyError::AuthRejected(AuthRejectedReason::InvalidCredentials));
    };

    let Ok(VerifyOutcome { matches, needs_rehash }) = hasher.verify(password, &record.password_hash)
    else {
        reject_auth(bidi, AuthRejectedReason::InvalidCredentials).await;
        return Err(LobbyError::AuthRejected(AuthRejectedReason::InvalidCredentials));
    };

    if !matches {
        reject_auth(bidi, AuthRejectedReason::InvalidCredentials).await;
        return Err(LobbyError::AuthRejected(AuthRejectedReason::InvalidCredentials));
    }

    if needs_rehash {
        if let Ok(new_hash) = hasher.hash(password) {
            // Computed inline (CPU-bound, not worth deferring); the write
            // itself is spawned off so a slow disk never delays
            // AUTH_ACCEPTED. A failed write just means we re-hash again
            // next login.
            let accounts = accounts.clone();
            let room = room.clone();
            let username = username.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = accounts.update_password_hash(&room, &username, &new_hash) {
                    tracing::warn!(error = %e, room = %room, username = %username, "failed to persist rehashed password");
                }
            });
        }
    }

    Ok(())
}

async fn reject_auth(bidi: &mut ProtoBidi, reason: AuthRejectedReason) {
    let _ = bidi
        .write_message(&Message::AuthRejected(AuthRejectedMsg {
            reason,
            message: Some(match reason {
                AuthRejectedReason::InvalidCredentials => "invalid credentials".to_owned(),
                AuthRejectedReason::AlreadyConnected => "username already connected".to_owned(),
                AuthRejectedReason::Unspecified => "rejected".to_owned(),
            }),
        }))
        .await;
    bidi.close().await;
}
