//! Sqlite-backed persistence for the external collaborators named in §6:
//! account records, per-server records, and the TOFU certificate cache.

pub mod accounts;
pub mod certs;
pub mod servers;

pub use accounts::{AccountError, AccountRecord, AccountStore};
pub use certs::SqliteCertStore;
pub use servers::{ServerRecord, ServerStore, ServerStoreError, ServerUpdate};
