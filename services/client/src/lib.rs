//! FriendNet client: lobby handshake, auto-reconnecting supervised
//! sessions, the per-server registry, and the inbound share-serving side
//! of peer-to-peer file sharing.

pub mod config;
pub mod handshake;
pub mod registry;
pub mod session_logic;
pub mod supervisor;

pub use config::ClientConfig;
pub use registry::MultiClient;
pub use supervisor::Supervisor;
