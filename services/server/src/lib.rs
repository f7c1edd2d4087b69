//! FriendNet room server: version/auth handshake, room runtime, proxy
//! relay, and the filesystem shares a room exposes.

pub mod app;
pub mod config;
pub mod lobby;
pub mod proxy;
pub mod room;

pub use app::App;
pub use config::ServerConfig;
