//! Per-server registry ("multi-client", §4.7): one [`Supervisor`] per saved
//! server record, CRUD against [`storage::ServerStore`], each supervisor
//! owned directly by the registry rather than forwarded to over REST.

use std::collections::HashMap;
use std::sync::Arc;

use net_protocol::{ProtocolVersion, RoomName, Username};
use storage::servers::{ServerRecord, ServerStore, ServerStoreError, ServerUpdate};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::handshake::Credentials;
use crate::session_logic::ClientLogic;
use crate::supervisor::{Dialer, Supervisor};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] ServerStoreError),
    #[error("server record has an invalid room name: {0}")]
    InvalidRoom(net_protocol::IdentifierError),
    #[error("server record has an invalid username: {0}")]
    InvalidUsername(net_protocol::IdentifierError),
}

/// Every saved server, each with its own auto-reconnecting [`Supervisor`]
/// (§4.7). Constructing one loads every record from `store` and spawns a
/// supervisor for it; callers still decide when to `connect()` them.
pub struct MultiClient {
    store: Arc<ServerStore>,
    dialer: Arc<dyn Dialer>,
    logic_factory: Arc<dyn Fn() -> Arc<dyn ClientLogic> + Send + Sync>,
    client_version: ProtocolVersion,
    supervisors: RwLock<HashMap<Uuid, Arc<Supervisor>>>,
}

impl MultiClient {
    /// `logic_factory` is called once per supervisor, so every server gets
    /// its own [`ClientLogic`] instance (e.g. its own share set) even though
    /// they share one registry.
    pub async fn load(
        store: Arc<ServerStore>,
        dialer: Arc<dyn Dialer>,
        client_version: ProtocolVersion,
        logic_factory: Arc<dyn Fn() -> Arc<dyn ClientLogic> + Send + Sync>,
    ) -> Result<Arc<Self>, RegistryError> {
        let records = store.list_servers()?;
        let registry = Arc::new(Self {
            store,
            dialer,
            logic_factory,
            client_version,
            supervisors: RwLock::new(HashMap::new()),
        });
        let mut supervisors = registry.supervisors.write().await;
        for record in records {
            let supervisor = registry.build_supervisor(&record)?;
            supervisors.insert(record.id, supervisor);
        }
        drop(supervisors);
        Ok(registry)
    }

    fn build_supervisor(&self, record: &ServerRecord) -> Result<Arc<Supervisor>, RegistryError> {
        let credentials = Credentials {
            room: RoomName::normalize(&record.room).map_err(RegistryError::InvalidRoom)?,
            username: Username::normalize(&record.username).map_err(RegistryError::InvalidUsername)?,
            password: record.password.clone(),
        };
        let logic = (self.logic_factory)();
        Ok(Supervisor::new(
            record.address.clone(),
            credentials,
            self.client_version,
            self.dialer.clone(),
            logic,
        ))
    }

    pub async fn supervisor(&self, id: Uuid) -> Option<Arc<Supervisor>> {
        self.supervisors.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<(Uuid, Arc<Supervisor>)> {
        self.supervisors
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect()
    }

    /// Persist a new server record and spawn its supervisor (§4.7). The
    /// record is deleted best-effort if the supervisor can't be built from
    /// it (e.g. an unnormalizable room/username snuck past validation
    /// upstream).
    pub async fn create(
        &self,
        name: &str,
        address: &str,
        room: &str,
        username: &str,
        password: &str,
    ) -> Result<Uuid, RegistryError> {
        let record = self.store.create(name, address, room, username, password)?;
        let supervisor = match self.build_supervisor(&record) {
            Ok(s) => s,
            Err(e) => {
                self.store.delete_best_effort(record.id);
                return Err(e);
            }
        };
        self.supervisors.write().await.insert(record.id, supervisor);
        Ok(record.id)
    }

    /// Persist changes and apply them to the live supervisor without
    /// interrupting its current session; they take effect on the next
    /// reconnect (§4.7).
    pub async fn update(&self, id: Uuid, update: ServerUpdate) -> Result<(), RegistryError> {
        let merged = self.store.update(id, update)?;
        if let Some(supervisor) = self.supervisors.read().await.get(&id) {
            let room = RoomName::normalize(&merged.room).map_err(RegistryError::InvalidRoom)?;
            let username = Username::normalize(&merged.username).map_err(RegistryError::InvalidUsername)?;
            supervisor
                .reconfigure(Some(merged.address), Some(room), Some(username), Some(merged.password))
                .await;
        }
        Ok(())
    }

    /// Remove the record and close its supervisor (§4.7).
    pub async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        self.store.delete(id)?;
        if let Some(supervisor) = self.supervisors.write().await.remove(&id) {
            supervisor.close().await;
        }
        Ok(())
    }

    /// Close every supervisor in parallel; does not touch the underlying
    /// store (§4.7 "registry shutdown").
    pub async fn close(&self) {
        let supervisors: Vec<_> = self.supervisors.read().await.values().cloned().collect();
        let closes = supervisors.iter().map(|s| s.close());
        futures_util::future::join_all(closes).await;
    }
}
