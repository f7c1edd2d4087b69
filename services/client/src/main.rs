use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use client::config;
use client::session_logic::{ShareLogic, ShareRegistry};
use client::supervisor::QuicDialer;
use client::MultiClient;
use net_protocol::{ProtocolVersion, Share};
use net_transport::endpoint::client_endpoint;
use share_fs::LocalFsShare;
use storage::{ServerStore, SqliteCertStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Current protocol version this binary speaks (§3).
pub const CLIENT_VERSION: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let cfg = match env::var("FRIENDNET_CONFIG") {
        Ok(path) => config::load_config_from_path(Path::new(&path)),
        Err(_) => config::load_config(),
    }
    .expect("failed to load client config");

    let bind_addr: SocketAddr = cfg.bind_addr.parse().expect("bind_addr must be a valid socket address");

    let certs = Arc::new(SqliteCertStore::open(&cfg.certs_db_path).expect("failed to open cert store"));
    let endpoint = client_endpoint(bind_addr, certs).expect("failed to build client QUIC endpoint");
    let dialer: Arc<QuicDialer> = Arc::new(QuicDialer::new(endpoint));

    let servers = Arc::new(ServerStore::open(&cfg.servers_db_path).expect("failed to open server store"));

    let shares: ShareRegistry = cfg
        .shares
        .iter()
        .map(|s| {
            let share: Arc<dyn Share> = Arc::new(LocalFsShare::new(s.root.clone()));
            (s.name.clone(), share)
        })
        .collect();

    let logic_factory = Arc::new(move || {
        Arc::new(ShareLogic::new(shares.clone())) as Arc<dyn client::session_logic::ClientLogic>
    });

    let registry = MultiClient::load(servers, dialer, CLIENT_VERSION, logic_factory)
        .await
        .expect("failed to load saved servers");

    for (id, supervisor) in registry.list().await {
        info!(%id, "connecting to saved server");
        supervisor.connect();
    }

    wait_for_shutdown_signal().await;
    info!("shutting down, closing every supervised session");
    registry.close().await;
    info!("client shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
