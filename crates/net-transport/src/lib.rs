//! Transport-agnostic connection abstraction (§4.2) plus the real QUIC
//! wiring and TOFU TLS (§6).

pub mod conn;
pub mod endpoint;
pub mod tls;
pub mod virtual_conn;

pub use conn::{ProtoBidi, ProtoBidiReader, ProtoBidiWriter, ProtoConn, QuicConn, StreamResetError};
pub use endpoint::{client_endpoint, connect, server_endpoint, EndpointError, ALPN};
pub use tls::{CertStore, TofuError, TofuVerifier};
pub use virtual_conn::VirtualC2cConn;
