//! Server configuration loading.
//!
//! TOML is the sole config source. Default path: `/etc/friendnet/server.toml`.
//!
//! # Required fields
//! - `bind_addr`
//! - At least one `[[rooms]]` entry

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub hostnames: Vec<String>,
    pub accounts_db_path: String,
    pub handshake_budget_secs: u64,
    pub keepalive_interval_secs: u64,
    pub max_payload_bytes: u32,
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub name: String,
    pub shares: Vec<ShareConfig>,
}

#[derive(Debug, Clone)]
pub struct ShareConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    bind_addr: Option<String>,
    hostnames: Option<Vec<String>>,
    accounts_db_path: Option<String>,
    handshake_budget_secs: Option<u64>,
    keepalive_interval_secs: Option<u64>,
    max_payload_bytes: Option<u32>,
    rooms: Option<Vec<RawRoomConfig>>,
}

#[derive(Debug, Deserialize)]
struct RawRoomConfig {
    name: Option<String>,
    shares: Option<Vec<RawShareConfig>>,
}

#[derive(Debug, Deserialize)]
struct RawShareConfig {
    name: Option<String>,
    root: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required field: {0}")]
    MissingField(String),
}

pub fn load_config_from_path(path: &Path) -> Result<ServerConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<ServerConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/friendnet/server.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<ServerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let bind_addr = raw
        .bind_addr
        .ok_or_else(|| ConfigError::MissingField("bind_addr".to_owned()))?;

    let raw_rooms = raw
        .rooms
        .ok_or_else(|| ConfigError::MissingField("rooms".to_owned()))?;
    if raw_rooms.is_empty() {
        return Err(ConfigError::MissingField(
            "at least one [[rooms]] entry is required".to_owned(),
        ));
    }
    let mut rooms = Vec::with_capacity(raw_rooms.len());
    for (i, r) in raw_rooms.into_iter().enumerate() {
        let name = r
            .name
            .ok_or_else(|| ConfigError::MissingField(format!("rooms[{i}].name")))?;
        let mut shares = Vec::new();
        for (j, s) in r.shares.unwrap_or_default().into_iter().enumerate() {
            shares.push(ShareConfig {
                name: s
                    .name
                    .ok_or_else(|| ConfigError::MissingField(format!("rooms[{i}].shares[{j}].name")))?,
                root: s
                    .root
                    .ok_or_else(|| ConfigError::MissingField(format!("rooms[{i}].shares[{j}].root")))?,
            });
        }
        rooms.push(RoomConfig { name, shares });
    }

    Ok(ServerConfig {
        bind_addr,
        hostnames: raw.hostnames.unwrap_or_else(|| vec!["localhost".to_owned()]),
        accounts_db_path: raw
            .accounts_db_path
            .unwrap_or_else(|| "/var/lib/friendnet/accounts.sqlite3".to_owned()),
        handshake_budget_secs: raw.handshake_budget_secs.unwrap_or(10),
        keepalive_interval_secs: raw.keepalive_interval_secs.unwrap_or(10),
        max_payload_bytes: raw.max_payload_bytes.unwrap_or(net_protocol::DEFAULT_MAX_PAYLOAD),
        rooms,
    })
}
