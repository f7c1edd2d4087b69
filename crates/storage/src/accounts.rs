//! Account storage (§6 collaborator contract; §4.4 account lifecycle).

use std::sync::Mutex;

use net_protocol::{RoomName, Username};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub room: String,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account already exists")]
    AccountExists,
    #[error("no such account")]
    NoSuchAccount,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct AccountStore {
    conn: Mutex<Connection>,
}

impl AccountStore {
    pub fn open(path: &str) -> Result<Self, AccountError> {
        let conn = Connection::open(path)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, AccountError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), AccountError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                room TEXT NOT NULL,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                PRIMARY KEY (room, username)
            );",
        )?;
        Ok(())
    }

    pub fn get_account(
        &self,
        room: &RoomName,
        username: &Username,
    ) -> Result<Option<AccountRecord>, AccountError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT room, username, password_hash FROM accounts WHERE room = ?1 AND username = ?2",
            params![room.as_str(), username.as_str()],
            |row| {
                Ok(AccountRecord {
                    room: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(AccountError::from)
    }

    pub fn create_account(
        &self,
        room: &RoomName,
        username: &Username,
        password_hash: &str,
    ) -> Result<(), AccountError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO accounts (room, username, password_hash) VALUES (?1, ?2, ?3)",
            params![room.as_str(), username.as_str(), password_hash],
        )?;
        if inserted == 0 {
            return Err(AccountError::AccountExists);
        }
        Ok(())
    }

    pub fn update_password_hash(
        &self,
        room: &RoomName,
        username: &Username,
        new_hash: &str,
    ) -> Result<(), AccountError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE accounts SET password_hash = ?1 WHERE room = ?2 AND username = ?3",
            params![new_hash, room.as_str(), username.as_str()],
        )?;
        if updated == 0 {
            return Err(AccountError::NoSuchAccount);
        }
        Ok(())
    }

    pub fn delete_account(&self, room: &RoomName, username: &Username) -> Result<(), AccountError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM accounts WHERE room = ?1 AND username = ?2",
            params![room.as_str(), username.as_str()],
        )?;
        if deleted == 0 {
            return Err(AccountError::NoSuchAccount);
        }
        Ok(())
    }
}
