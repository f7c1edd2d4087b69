//! QUIC endpoint construction: client endpoint wired to [`crate::tls::TofuVerifier`],
//! server endpoint wired to a self-signed leaf (rcgen), both with the fixed
//! ALPN token (§6).

use std::net::SocketAddr;
use std::sync::Arc;

use net_protocol::FrameCodec;
use quinn::{ClientConfig, Endpoint, ServerConfig, TransportConfig};
use thiserror::Error;

use crate::conn::QuicConn;
use crate::tls::{CertStore, TofuVerifier};

/// ALPN token advertised by every FriendNet endpoint (§6).
pub const ALPN: &[u8] = b"friendnet/1";

/// Keepalive period the transport is configured with by default (§6).
pub const DEFAULT_KEEPALIVE: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("quic endpoint setup failed: {0}")]
    Quic(#[from] std::io::Error),
    #[error("connect failed: {0}")]
    Connect(String),
}

fn transport_config() -> TransportConfig {
    let mut cfg = TransportConfig::default();
    cfg.keep_alive_interval(Some(DEFAULT_KEEPALIVE));
    cfg
}

/// Build a client `Endpoint` whose certificate trust is TOFU-pinned against `store`.
pub fn client_endpoint<S: CertStore + std::fmt::Debug + 'static>(
    bind_addr: SocketAddr,
    store: Arc<S>,
) -> Result<Endpoint, EndpointError> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut tls = rustls::ClientConfig::builder()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    tls.dangerous()
        .set_certificate_verifier(Arc::new(TofuVerifier::new(store)));
    tls.alpn_protocols = vec![ALPN.to_vec()];

    let quic_tls = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
        .map_err(|e| EndpointError::Tls(e.to_string()))?;
    let mut client_config = ClientConfig::new(Arc::new(quic_tls));
    client_config.transport_config(Arc::new(transport_config()));

    let mut endpoint = Endpoint::client(bind_addr)?;
    endpoint.set_default_client_config(client_config);
    Ok(endpoint)
}

/// Build a server `Endpoint` with a freshly minted self-signed leaf for
/// `hostnames`. Returns the endpoint and the leaf's DER (so operators can
/// show users the fingerprint out of band, since no CA vouches for it).
pub fn server_endpoint(
    bind_addr: SocketAddr,
    hostnames: Vec<String>,
) -> Result<(Endpoint, Vec<u8>), EndpointError> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert = rcgen::generate_simple_self_signed(hostnames)
        .map_err(|e| EndpointError::Tls(e.to_string()))?;
    let cert_der = cert.cert.der().to_vec();
    let priv_key = rustls::pki_types::PrivateKeyDer::Pkcs8(cert.key_pair.serialize_der().into());

    let mut tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.cert.der().clone()], priv_key)
        .map_err(|e| EndpointError::Tls(e.to_string()))?;
    tls.alpn_protocols = vec![ALPN.to_vec()];

    let quic_tls =
        quinn::crypto::rustls::QuicServerConfig::try_from(tls).map_err(|e| EndpointError::Tls(e.to_string()))?;
    let mut server_config = ServerConfig::with_crypto(Arc::new(quic_tls));
    server_config.transport_config(Arc::new(transport_config()));

    let endpoint = Endpoint::server(server_config, bind_addr)?;
    Ok((endpoint, cert_der))
}

/// Dial `addr` and wrap the resulting `quinn::Connection` in a [`QuicConn`].
pub async fn connect(
    endpoint: &Endpoint,
    addr: SocketAddr,
    server_name: &str,
) -> Result<QuicConn, EndpointError> {
    let connecting = endpoint
        .connect(addr, server_name)
        .map_err(|e| EndpointError::Connect(e.to_string()))?;
    let connection = connecting
        .await
        .map_err(|e| EndpointError::Connect(e.to_string()))?;
    Ok(QuicConn::new(connection, FrameCodec::default()))
}
