//! Sqlite-backed `CertStore` (§6): TOFU certificate cache, keyed
//! case-insensitively on hostname, mirrored into memory for the synchronous
//! `rustls` verifier callback.

use std::collections::HashMap;
use std::sync::RwLock;

use net_transport::CertStore;
use rusqlite::{params, Connection};

#[derive(Debug)]
pub struct SqliteCertStore {
    conn: std::sync::Mutex<Connection>,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl SqliteCertStore {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS certs (host TEXT PRIMARY KEY, der BLOB NOT NULL);",
        )?;
        let mut cache = HashMap::new();
        {
            let mut stmt = conn.prepare("SELECT host, der FROM certs")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (host, der) = row?;
                cache.insert(host, der);
            }
        }
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            cache: RwLock::new(cache),
        })
    }
}

impl CertStore for SqliteCertStore {
    fn get(&self, host: &str) -> Option<Vec<u8>> {
        self.cache.read().unwrap().get(&host.to_lowercase()).cloned()
    }

    fn put(&self, host: &str, der: &[u8]) {
        let key = host.to_lowercase();
        self.cache.write().unwrap().insert(key.clone(), der.to_vec());
        let conn = self.conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO certs (host, der) VALUES (?1, ?2)",
            params![key, der],
        ) {
            tracing::warn!(error = %e, host = %key, "failed to persist pinned certificate");
        }
    }
}
