//! Per-server record storage (§4.7 "multi-client" registry persistence).

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub room: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Clone)]
pub struct ServerUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub room: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Error)]
pub enum ServerStoreError {
    #[error("no such server record")]
    NotFound,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct ServerStore {
    conn: Mutex<Connection>,
}

impl ServerStore {
    pub fn open(path: &str) -> Result<Self, ServerStoreError> {
        let conn = Connection::open(path)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, ServerStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), ServerStoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS servers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                address TEXT NOT NULL,
                room TEXT NOT NULL,
                username TEXT NOT NULL,
                password TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn list_servers(&self) -> Result<Vec<ServerRecord>, ServerStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, address, room, username, password FROM servers")?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_server(&self, id: Uuid) -> Result<Option<ServerRecord>, ServerStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, address, room, username, password FROM servers WHERE id = ?1",
            params![id.to_string()],
            Self::row_to_record,
        )
        .optional()
        .map_err(Into::into)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServerRecord> {
        let id_str: String = row.get(0)?;
        Ok(ServerRecord {
            id: id_str.parse().unwrap_or_else(|_| Uuid::nil()),
            name: row.get(1)?,
            address: row.get(2)?,
            room: row.get(3)?,
            username: row.get(4)?,
            password: row.get(5)?,
        })
    }

    pub fn create(
        &self,
        name: &str,
        address: &str,
        room: &str,
        username: &str,
        password: &str,
    ) -> Result<ServerRecord, ServerStoreError> {
        let id = Uuid::new_v4();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO servers (id, name, address, room, username, password) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id.to_string(), name, address, room, username, password],
        )?;
        Ok(ServerRecord {
            id,
            name: name.to_owned(),
            address: address.to_owned(),
            room: room.to_owned(),
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    /// Best-effort cleanup of a record that failed to spawn a supervisor after
    /// being persisted (§4.7 "on failure after persistence, best-effort delete").
    pub fn delete_best_effort(&self, id: Uuid) {
        if let Err(e) = self.delete(id) {
            tracing::warn!(error = %e, %id, "best-effort delete of server record failed");
        }
    }

    pub fn update(&self, id: Uuid, update: ServerUpdate) -> Result<ServerRecord, ServerStoreError> {
        let existing = self.get_server(id)?.ok_or(ServerStoreError::NotFound)?;
        let merged = ServerRecord {
            id,
            name: update.name.unwrap_or(existing.name),
            address: update.address.unwrap_or(existing.address),
            room: update.room.unwrap_or(existing.room),
            username: update.username.unwrap_or(existing.username),
            password: update.password.unwrap_or(existing.password),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE servers SET name = ?1, address = ?2, room = ?3, username = ?4, password = ?5 WHERE id = ?6",
            params![
                merged.name,
                merged.address,
                merged.room,
                merged.username,
                merged.password,
                id.to_string()
            ],
        )?;
        Ok(merged)
    }

    pub fn delete(&self, id: Uuid) -> Result<(), ServerStoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM servers WHERE id = ?1", params![id.to_string()])?;
        if deleted == 0 {
            return Err(ServerStoreError::NotFound);
        }
        Ok(())
    }
}
