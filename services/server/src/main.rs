use std::env;
use std::path::Path;

use server::config;
use server::App;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = match env::var("FRIENDNET_CONFIG") {
        Ok(path) => config::load_config_from_path(Path::new(&path)),
        Err(_) => config::load_config(),
    }
    .expect("failed to load server config");

    let bind_addr = config
        .bind_addr
        .parse()
        .expect("bind_addr must be a valid socket address");
    let hostnames = config.hostnames.clone();

    let app = App::from_config(&config).expect("failed to initialize server state");
    info!(rooms = config.rooms.len(), "server state initialized");

    let shutdown = CancellationToken::new();
    let shutdown_watcher = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_watcher.cancel();
    });

    app.run(bind_addr, hostnames, shutdown)
        .await
        .expect("server error");
    info!("server shut down gracefully");
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
