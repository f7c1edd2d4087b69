//! Client configuration loading.
//!
//! TOML is the sole config source. Default path: `/etc/friendnet/client.toml`.
//!
//! # Required fields
//! - none: a client with zero `[[shares]]` and zero saved servers still
//!   starts, just with nothing to serve and nothing to reconnect to.

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub bind_addr: String,
    pub servers_db_path: String,
    pub certs_db_path: String,
    pub reconnect_backoff_ceiling_secs: u64,
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
    servers_db_path: Option<String>,
    certs_db_path: Option<String>,
    reconnect_backoff_ceiling_secs: Option<u64>,
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

pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/friendnet/client.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<ClientConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let mut shares = Vec::new();
    for (i, s) in raw.shares.unwrap_or_default().into_iter().enumerate() {
        shares.push(ShareConfig {
            name: s.name.ok_or_else(|| ConfigError::MissingField(format!("shares[{i}].name")))?,
            root: s.root.ok_or_else(|| ConfigError::MissingField(format!("shares[{i}].root")))?,
        });
    }

    Ok(ClientConfig {
        bind_addr: raw.bind_addr.unwrap_or_else(|| "0.0.0.0:0".to_owned()),
        servers_db_path: raw
            .servers_db_path
            .unwrap_or_else(|| "/var/lib/friendnet/client-servers.sqlite3".to_owned()),
        certs_db_path: raw
            .certs_db_path
            .unwrap_or_else(|| "/var/lib/friendnet/client-certs.sqlite3".to_owned()),
        reconnect_backoff_ceiling_secs: raw.reconnect_backoff_ceiling_secs.unwrap_or(30),
        shares,
    })
}
