//! Shared harness for the end-to-end suites (§8): spins up a real
//! [`server::App`] on loopback QUIC and dials real [`net_transport::QuicConn`]
//! clients against it, preferring an in-process server and a real client
//! connection over mocking the wire.

use std::net::SocketAddr;
use std::sync::Arc;

use net_protocol::password::PasswordHasher as _;
use net_protocol::{ProtocolVersion, RoomName, Username};
use net_transport::QuicConn;
use password::Argon2PasswordHasher;
use server::config::{RoomConfig, ServerConfig, ShareConfig};
use server::App;
use storage::SqliteCertStore;
use tokio_util::sync::CancellationToken;

/// Protocol version every test dials with; matches [`server::app::SERVER_VERSION`].
pub const CLIENT_VERSION: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

/// A running server bound to an ephemeral loopback port, torn down on
/// [`TestServer::shut_down`] (or, if forgotten, left for the process to reap
/// at test-binary exit — acceptable for a short-lived test process).
pub struct TestServer {
    pub addr: SocketAddr,
    pub app: Arc<App>,
    endpoint: quinn::Endpoint,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    _accounts_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a server with the given `[[rooms]]`, each a `(name, shares)`
    /// pair where `shares` is `(share_name, filesystem_root)`.
    pub async fn start(rooms: Vec<(&str, Vec<(&str, &std::path::Path)>)>) -> Self {
        Self::start_with(rooms, 10).await
    }

    /// Like [`Self::start`] but with a configurable keepalive period, for
    /// tests that exercise the keepalive-miss teardown policy.
    pub async fn start_with(rooms: Vec<(&str, Vec<(&str, &std::path::Path)>)>, keepalive_interval_secs: u64) -> Self {
        let accounts_dir = tempfile::tempdir().expect("tempdir");
        let accounts_db_path = accounts_dir
            .path()
            .join("accounts.sqlite3")
            .to_str()
            .expect("utf8 path")
            .to_owned();

        let room_configs = rooms
            .into_iter()
            .map(|(name, shares)| RoomConfig {
                name: name.to_owned(),
                shares: shares
                    .into_iter()
                    .map(|(share_name, root)| ShareConfig {
                        name: share_name.to_owned(),
                        root: root.to_string_lossy().into_owned(),
                    })
                    .collect(),
            })
            .collect();

        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            hostnames: vec!["localhost".to_owned()],
            accounts_db_path,
            handshake_budget_secs: 10,
            keepalive_interval_secs,
            max_payload_bytes: net_protocol::DEFAULT_MAX_PAYLOAD,
            rooms: room_configs,
        };

        let app = App::from_config(&config).expect("failed to initialize server state");
        let (endpoint, addr) =
            App::bind("127.0.0.1:0".parse().unwrap(), config.hostnames.clone()).expect("failed to bind quic endpoint");

        let shutdown = CancellationToken::new();
        let serve_app = app.clone();
        let serve_shutdown = shutdown.clone();
        let endpoint_handle = endpoint.clone();
        let task = tokio::spawn(async move {
            let _ = serve_app.serve(endpoint, serve_shutdown).await;
        });

        Self {
            addr,
            app,
            endpoint: endpoint_handle,
            shutdown,
            task,
            _accounts_dir: accounts_dir,
        }
    }

    /// Graceful teardown: stop accepting new connections and wait for every
    /// already-open one to close on its own (the client side closes first).
    pub async fn shut_down(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }

    /// Simulate a server crash: force-close every open connection instead of
    /// waiting for clients to hang up, so a supervised client observes a
    /// dropped session rather than a graceful close (§4.6 reconnect path).
    pub async fn kill(self) {
        self.shutdown.cancel();
        self.endpoint.close(quinn::VarInt::from_u32(1), b"killed");
        let _ = self.task.await;
    }

    /// Hash `password` and insert an account record directly, bypassing the
    /// wire (account creation/admin is an out-of-scope external collaborator
    /// surface per §1 — tests seed accounts the way that surface would).
    pub fn create_account(&self, room: &str, username: &str, password: &str) {
        let room = RoomName::normalize(room).expect("valid room name");
        let username = Username::normalize(username).expect("valid username");
        let hasher = Argon2PasswordHasher::default();
        let hash = hasher.hash(password).expect("hash");
        self.app
            .accounts()
            .create_account(&room, &username, &hash)
            .expect("create_account");
    }
}

/// Dial a fresh `QuicConn` against `addr` with its own TOFU cert cache (one
/// per dial, so every test client pins independently).
pub async fn dial(addr: SocketAddr) -> QuicConn {
    let certs = Arc::new(SqliteCertStore::open_in_memory().expect("in-memory cert store"));
    let endpoint =
        net_transport::client_endpoint("127.0.0.1:0".parse().unwrap(), certs).expect("client endpoint");
    net_transport::connect(&endpoint, addr, "localhost")
        .await
        .expect("quic connect")
}
