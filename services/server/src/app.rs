//! Wiring from a loaded [`crate::config::ServerConfig`] to a running
//! accept loop (§5, §4.4): one [`Room`] per configured room, each backed
//! by the shared account store and its own share registry.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use net_protocol::message::{AuthRejectedMsg, AuthRejectedReason};
use net_protocol::{FrameCodec, Message, ProtocolVersion, RoomName, Share};
use net_transport::endpoint::{server_endpoint, EndpointError};
use net_transport::{ProtoBidi, ProtoConn, QuicConn};
use password::Argon2PasswordHasher;
use share_fs::LocalFsShare;
use storage::AccountStore;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::lobby::{self, LobbyError};
use crate::room::{OnboardRejection, Room, ShareRegistry};

/// Current protocol version this binary speaks (§3).
pub const SERVER_VERSION: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

pub struct App {
    rooms: HashMap<RoomName, Arc<Room>>,
    accounts: Arc<AccountStore>,
    hasher: Arc<Argon2PasswordHasher>,
    handshake_budget: Duration,
    max_payload_bytes: u32,
}

impl App {
    /// Build one `Room` per configured `[[rooms]]` entry, sharing a single
    /// accounts database across all of them (accounts are scoped per-room
    /// at the storage layer, not per-database).
    pub fn from_config(config: &ServerConfig) -> Result<Arc<Self>, std::io::Error> {
        let accounts = Arc::new(
            AccountStore::open(&config.accounts_db_path)
                .map_err(|e| std::io::Error::other(e.to_string()))?,
        );
        let keepalive_interval = Duration::from_secs(config.keepalive_interval_secs);

        let mut rooms = HashMap::new();
        for room_cfg in &config.rooms {
            let name = RoomName::normalize(&room_cfg.name)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let mut shares: ShareRegistry = HashMap::new();
            for share_cfg in &room_cfg.shares {
                shares.insert(
                    share_cfg.name.clone(),
                    Arc::new(LocalFsShare::new(share_cfg.root.clone())) as Arc<dyn Share>,
                );
            }
            rooms.insert(
                name.clone(),
                Room::new(name, accounts.clone(), shares, keepalive_interval),
            );
        }

        Ok(Arc::new(Self {
            rooms,
            accounts,
            hasher: Arc::new(Argon2PasswordHasher::default()),
            handshake_budget: Duration::from_secs(config.handshake_budget_secs),
            max_payload_bytes: config.max_payload_bytes,
        }))
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    pub fn room(&self, name: &RoomName) -> Option<&Arc<Room>> {
        self.rooms.get(name)
    }

    /// Bind the QUIC endpoint and accept connections until `shutdown` fires.
    pub async fn run(
        self: &Arc<Self>,
        bind_addr: SocketAddr,
        hostnames: Vec<String>,
        shutdown: CancellationToken,
    ) -> Result<(), EndpointError> {
        let (endpoint, cert_der) = server_endpoint(bind_addr, hostnames)?;
        tracing::info!(
            addr = %bind_addr,
            cert_fingerprint = %hex_fingerprint(&cert_der),
            "friendnet server listening"
        );
        self.serve(endpoint, shutdown).await
    }

    /// Bind without serving, so a caller (e.g. a test harness) can learn the
    /// actual bound address before handing the endpoint to [`Self::serve`] —
    /// `bind_addr`'s port may be `0`.
    pub fn bind(bind_addr: SocketAddr, hostnames: Vec<String>) -> Result<(quinn::Endpoint, SocketAddr), EndpointError> {
        let (endpoint, _cert_der) = server_endpoint(bind_addr, hostnames)?;
        let local_addr = endpoint.local_addr()?;
        Ok((endpoint, local_addr))
    }

    /// Accept connections on an already-bound `endpoint` until `shutdown` fires.
    pub async fn serve(self: &Arc<Self>, endpoint: quinn::Endpoint, shutdown: CancellationToken) -> Result<(), EndpointError> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                incoming = endpoint.accept() => {
                    let Some(incoming) = incoming else { break };
                    let app = self.clone();
                    tokio::spawn(async move {
                        if let Err(panic) = tokio::spawn(async move {
                            app.handle_incoming(incoming).await;
                        })
                        .await
                        {
                            tracing::error!(?panic, "connection handler panicked; isolated by its supervisor");
                        }
                    });
                }
            }
        }

        endpoint.wait_idle().await;
        Ok(())
    }

    async fn handle_incoming(self: Arc<Self>, incoming: quinn::Incoming) {
        let connection = match incoming.await {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "incoming connection failed the QUIC handshake");
                return;
            }
        };
        let remote = connection.remote_address();
        let codec = FrameCodec::new(self.max_payload_bytes);
        let conn: Arc<dyn ProtoConn> = Arc::new(QuicConn::new(connection, codec));

        let auth_bidi = match conn.wait_for_incoming_bidi(&CancellationToken::new()).await {
            Ok(bidi) => bidi,
            Err(e) => {
                tracing::debug!(%remote, error = %e, "connection closed before opening its lobby bidi");
                return;
            }
        };

        self.run_lobby_and_onboard(conn, auth_bidi, remote).await;
    }

    async fn run_lobby_and_onboard(
        &self,
        conn: Arc<dyn ProtoConn>,
        auth_bidi: ProtoBidi,
        remote: SocketAddr,
    ) {
        let outcome = lobby::run_handshake(
            auth_bidi,
            self.handshake_budget,
            SERVER_VERSION,
            self.accounts.clone(),
            self.hasher.clone(),
        )
        .await;

        let (mut bidi, outcome) = match outcome {
            Ok(pair) => pair,
            Err(e) => {
                log_lobby_failure(&remote, &e);
                conn.close_with_reason("handshake failed").await;
                return;
            }
        };

        let Some(room) = self.rooms.get(&outcome.room) else {
            write_auth_rejected(&mut bidi, AuthRejectedReason::Unspecified, "no such room").await;
            conn.close_with_reason("no such room").await;
            return;
        };

        match room
            .onboard(bidi, conn.clone(), outcome.version, outcome.username.clone())
            .await
        {
            Ok(()) => {
                tracing::info!(%remote, room = %room.name, username = %outcome.username, "client onboarded");
            }
            Err((rejection, mut bidi)) => {
                let (reason, message) = match rejection {
                    OnboardRejection::AlreadyConnected => {
                        (AuthRejectedReason::AlreadyConnected, "username already connected")
                    }
                    OnboardRejection::RoomClosed => (AuthRejectedReason::Unspecified, "room closed"),
                };
                write_auth_rejected(&mut bidi, reason, message).await;
                conn.close_with_reason(message).await;
            }
        }
    }
}

async fn write_auth_rejected(bidi: &mut ProtoBidi, reason: AuthRejectedReason, reason_text: &str) {
    let _ = bidi
        .write_message(&Message::AuthRejected(AuthRejectedMsg {
            reason,
            message: Some(reason_text.to_owned()),
        }))
        .await;
    bidi.close().await;
}

fn log_lobby_failure(remote: &SocketAddr, e: &LobbyError) {
    match e {
        LobbyError::Timeout => tracing::debug!(%remote, "handshake timed out"),
        LobbyError::VersionRejected(reason) => {
            tracing::debug!(%remote, ?reason, "rejected client's protocol version")
        }
        LobbyError::AuthRejected(reason) => {
            tracing::debug!(%remote, ?reason, "rejected client's credentials")
        }
        LobbyError::Protocol(e) => tracing::debug!(%remote, error = %e, "handshake protocol error"),
    }
}

fn hex_fingerprint(der: &[u8]) -> String {
    use std::fmt::Write;
    der.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
