//! Room runtime (§4.4): admission, the per-username client registry, the
//! read loop + keepalive loop pair spawned per onboarded client, the
//! dispatch table for a client's request streams, the proxy path, and
//! account lifecycle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use net_protocol::error::{ErrorKind, PEER_UNREACHABLE_STREAM_CODE};
use net_protocol::message::{
    DirFilesMsg, FileMetaEntry, FileMetaMsg, GetDirFilesMsg, GetFileMetaMsg, GetFileMsg,
    InboundProxyMsg, OnlineUserStatus, OnlineUsersMsg, OpenOutboundProxyMsg, PingMsg, PongMsg,
};
use net_protocol::{
    FileMeta, Message, ProtocolVersion, ProtoPath, RoomName, Share, ShareError, Username, PAGE_SIZE,
};
use net_transport::{ProtoBidi, ProtoConn};
use storage::{AccountError, AccountStore};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::proxy;

pub type ShareRegistry = HashMap<String, Arc<dyn Share>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OnboardRejection {
    #[error("room is closed")]
    RoomClosed,
    #[error("username already connected")]
    AlreadyConnected,
}

struct ClientSession {
    id: u64,
    #[allow(dead_code)]
    version: ProtocolVersion,
    conn: Arc<dyn ProtoConn>,
}

/// A namespace owned by a server: accounts, registered shares, and the
/// live set of connected peers (§4.4, Glossary "Room").
pub struct Room {
    pub name: RoomName,
    clients: RwLock<HashMap<Username, ClientSession>>,
    accounts: Arc<AccountStore>,
    shares: ShareRegistry,
    cancellation: CancellationToken,
    closed: AtomicBool,
    next_session_id: AtomicU64,
    keepalive_interval: Duration,
}

impl Room {
    pub fn new(
        name: RoomName,
        accounts: Arc<AccountStore>,
        shares: ShareRegistry,
        keepalive_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            clients: RwLock::new(HashMap::new()),
            accounts,
            shares,
            cancellation: CancellationToken::new(),
            closed: AtomicBool::new(false),
            next_session_id: AtomicU64::new(1),
            keepalive_interval,
        })
    }

    /// Permanently close the room: new onboards fail, and every currently
    /// running read/keepalive loop observes its cancellation scope.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancellation.cancel();
    }

    pub async fn online_usernames(&self) -> Vec<Username> {
        self.clients.read().await.keys().cloned().collect()
    }

    /// Admit a newly authenticated connection (§4.4 steps 1-5). `auth_bidi`
    /// is the still-open bidi the lobby's `AUTHENTICATE` arrived on; on
    /// success this writes `AUTH_ACCEPTED` and closes it here, then spawns
    /// the read loop and keepalive loop. On rejection the bidi is handed
    /// back unchanged so the caller can write `AUTH_REJECTED` on it.
    pub async fn onboard(
        self: &Arc<Self>,
        mut auth_bidi: ProtoBidi,
        conn: Arc<dyn ProtoConn>,
        version: ProtocolVersion,
        username: Username,
    ) -> Result<(), (OnboardRejection, ProtoBidi)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err((OnboardRejection::RoomClosed, auth_bidi));
        }

        let session_id = {
            let mut clients = self.clients.write().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err((OnboardRejection::RoomClosed, auth_bidi));
            }
            if clients.contains_key(&username) {
                return Err((OnboardRejection::AlreadyConnected, auth_bidi));
            }
            let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
            clients.insert(
                username.clone(),
                ClientSession {
                    id,
                    version,
                    conn: conn.clone(),
                },
            );
            id
        };

        let _ = auth_bidi
            .write_message(&Message::AuthAccepted(net_protocol::message::AuthAcceptedMsg {}))
            .await;
        auth_bidi.close().await;

        let room = self.clone();
        let read_loop_username = username.clone();
        let read_loop_conn = conn.clone();
        spawn_isolated(async move {
            run_read_loop(room, read_loop_conn, read_loop_username, session_id).await;
        });

        let room = self.clone();
        let keepalive_username = username.clone();
        let keepalive_conn = conn;
        spawn_isolated(async move {
            run_keepalive_loop(room, keepalive_conn, keepalive_username, session_id).await;
        });

        Ok(())
    }

    /// Idempotent: a second call against a stale `session_id` (from an
    /// already-replaced client) is a no-op (§4.4, §9 "cyclic ownership").
    async fn disconnect(&self, username: &Username, session_id: u64) {
        let mut clients = self.clients.write().await;
        if let Some(existing) = clients.get(username) {
            if existing.id == session_id {
                clients.remove(username);
            }
        }
    }

    // -- Account lifecycle (§4.4) -------------------------------------------

    pub fn create_account(&self, username: &Username, password_hash: &str) -> Result<(), AccountError> {
        self.accounts.create_account(&self.name, username, password_hash)
    }

    pub fn update_account_password(
        &self,
        username: &Username,
        new_hash: &str,
    ) -> Result<(), AccountError> {
        self.accounts.update_password_hash(&self.name, username, new_hash)
    }

    /// Kicks any online session for `username` before deleting the record,
    /// so a disconnect (or subsequent re-auth) observes "no such account".
    pub async fn delete_account(&self, username: &Username) -> Result<(), AccountError> {
        self.kick(username).await;
        self.accounts.delete_account(&self.name, username)
    }

    async fn kick(&self, username: &Username) {
        let conn = {
            let mut clients = self.clients.write().await;
            clients.remove(username).map(|c| c.conn)
        };
        if let Some(conn) = conn {
            conn.close_with_reason("account deleted").await;
        }
    }
}

/// Catch a panic in `f` at the task boundary and log it instead of letting
/// it silently fail the (otherwise unobserved) `JoinHandle` (§7, §9).
fn spawn_isolated<F>(f: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(panic) = tokio::spawn(f).await {
            tracing::error!(?panic, "task panicked; isolated by its supervisor");
        }
    });
}

/// Repeatedly accept an incoming bidi and spawn a one-shot handler for it
/// (§4.4). Exits on cancellation, idle timeout, or connection close — all
/// three are normal termination, not errors.
async fn run_read_loop(room: Arc<Room>, conn: Arc<dyn ProtoConn>, username: Username, session_id: u64) {
    loop {
        match conn.wait_for_incoming_bidi(&room.cancellation).await {
            Ok(bidi) => {
                let room = room.clone();
                let username = username.clone();
                spawn_isolated(async move {
                    handle_first_message(room, username, bidi).await;
                });
            }
            Err(_) => break,
        }
        if room.cancellation.is_cancelled() {
            break;
        }
    }
    room.disconnect(&username, session_id).await;
}

/// Every 10s (configurable), PING and await PONG (§4.4). Three consecutive
/// misses tears the session down proactively (§9 open question, resolved
/// in DESIGN.md); any other non-idle error is logged but not itself fatal.
async fn run_keepalive_loop(room: Arc<Room>, conn: Arc<dyn ProtoConn>, username: Username, session_id: u64) {
    const MAX_CONSECUTIVE_MISSES: u32 = 3;
    let mut consecutive_misses = 0u32;
    let mut interval = tokio::time::interval(room.keepalive_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = room.cancellation.cancelled() => break,
            _ = interval.tick() => {}
        }

        let sent_ts_ms = now_ms();
        match conn
            .send_and_receive(Message::Ping(PingMsg { sent_ts_ms }))
            .await
        {
            Ok(Message::Pong(PongMsg { .. })) => {
                consecutive_misses = 0;
            }
            Ok(_) | Err(_) => {
                consecutive_misses += 1;
                if consecutive_misses >= MAX_CONSECUTIVE_MISSES {
                    tracing::warn!(%username, "closing session after repeated missed keepalives");
                    conn.close_with_reason("keepalive timeout").await;
                    break;
                }
            }
        }
    }
    room.disconnect(&username, session_id).await;
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Read exactly one frame off a freshly opened bidi, dispatch it, and
/// close the bidi on return (§4.4).
async fn handle_first_message(room: Arc<Room>, origin_username: Username, mut bidi: ProtoBidi) {
    let msg = match bidi.read_message().await {
        Ok(msg) => msg,
        Err(_) => {
            bidi.close().await;
            return;
        }
    };

    match msg {
        Message::Ping(PingMsg { sent_ts_ms }) => {
            let _ = bidi.write_message(&Message::Pong(PongMsg { sent_ts_ms })).await;
            bidi.close().await;
        }
        Message::OpenOutboundProxy(m) => {
            handle_open_outbound_proxy(&room, &origin_username, bidi, m).await;
        }
        Message::GetOnlineUsers(_) => {
            handle_get_online_users(&room, &mut bidi).await;
            bidi.close().await;
        }
        Message::GetDirFiles(m) => {
            handle_get_dir_files(&room, &mut bidi, m).await;
            bidi.close().await;
        }
        Message::GetFileMeta(m) => {
            handle_get_file_meta(&room, &mut bidi, m).await;
            bidi.close().await;
        }
        Message::GetFile(m) => {
            handle_get_file(&room, &mut bidi, m).await;
            bidi.close().await;
        }
        other => {
            let _ = bidi.unimplemented(other.message_type()).await;
            bidi.close().await;
        }
    }
}

/// Construct the proxy tunnel to `target_username` and block this handler
/// task until it completes (§4.4, §4.5). `bidi` is the origin side, already
/// past its `OPEN_OUTBOUND_PROXY` first frame.
async fn handle_open_outbound_proxy(
    room: &Arc<Room>,
    origin_username: &Username,
    mut bidi: ProtoBidi,
    msg: OpenOutboundProxyMsg,
) {
    let Ok(target) = Username::normalize(&msg.target_username) else {
        bidi.cancel(PEER_UNREACHABLE_STREAM_CODE);
        return;
    };

    let target_conn = {
        let clients = room.clients.read().await;
        clients.get(&target).map(|c| c.conn.clone())
    };
    let Some(target_conn) = target_conn else {
        bidi.cancel(PEER_UNREACHABLE_STREAM_CODE);
        return;
    };

    let target_bidi = target_conn
        .open_bidi_with_msg(Message::InboundProxy(InboundProxyMsg {
            origin_username: origin_username.as_str().to_owned(),
        }))
        .await;
    let target_bidi = match target_bidi {
        Ok(b) => b,
        Err(_) => {
            bidi.cancel(PEER_UNREACHABLE_STREAM_CODE);
            return;
        }
    };

    if let Err(e) = proxy::relay(bidi, target_bidi).await {
        tracing::debug!(error = %e, "proxy relay ended with an error");
    }
}

async fn handle_get_online_users(room: &Room, bidi: &mut ProtoBidi) {
    let usernames = room.online_usernames().await;
    let mut last_page_was_full = true;
    for page in usernames.chunks(PAGE_SIZE) {
        let users = page
            .iter()
            .map(|u| OnlineUserStatus {
                username: u.as_str().to_owned(),
            })
            .collect();
        last_page_was_full = page.len() == PAGE_SIZE;
        if bidi.write_message(&Message::OnlineUsers(OnlineUsersMsg { users })).await.is_err() {
            return;
        }
    }
    // Every page so far was a full PAGE_SIZE (including the zero-page case of
    // an empty listing): write an empty terminator so the client's "short
    // page ends the list" rule has something short to see.
    if last_page_was_full {
        let _ = bidi
            .write_message(&Message::OnlineUsers(OnlineUsersMsg { users: Vec::new() }))
            .await;
    }
}

/// Split a validated path into its share and the share-relative tail,
/// looking the share up in the room's registry (§4.4 "share dispatch
/// wiring"). `None` means the share name itself is unregistered.
fn resolve_share<'a>(room: &'a Room, path: &ProtoPath) -> Option<&'a Arc<dyn Share>> {
    let name = path.share_name()?;
    room.shares.get(name)
}

async fn handle_get_dir_files(room: &Room, bidi: &mut ProtoBidi, msg: GetDirFilesMsg) {
    let path = match net_protocol::validate_path(msg.path.as_bytes()) {
        Ok(p) => p,
        Err(e) => {
            let _ = bidi
                .error(ErrorKind::InvalidFields, Some(e.to_string()))
                .await;
            return;
        }
    };
    let Some(share) = resolve_share(room, &path) else {
        let _ = bidi.file_not_exist(path.as_str()).await;
        return;
    };

    let mut page = 0u32;
    loop {
        match share.dir_files(&path, page).await {
            Ok(entries) => {
                // A short page (including an empty one, whether from an
                // empty directory or an exact-multiple-of-PAGE_SIZE total)
                // is the terminator the client's pagination loop watches
                // for; always write it rather than breaking silently.
                let last_page = entries.len() < PAGE_SIZE;
                let files = entries
                    .into_iter()
                    .map(|e| FileMetaEntry {
                        name: e.name,
                        is_dir: e.is_dir,
                        size_bytes: e.size_bytes,
                    })
                    .collect();
                if bidi.write_message(&Message::DirFiles(DirFilesMsg { files })).await.is_err() {
                    return;
                }
                if last_page {
                    break;
                }
                page += 1;
            }
            Err(e) => {
                write_share_error(bidi, e).await;
                return;
            }
        }
    }
}

async fn handle_get_file_meta(room: &Room, bidi: &mut ProtoBidi, msg: GetFileMetaMsg) {
    let path = match net_protocol::validate_path(msg.path.as_bytes()) {
        Ok(p) => p,
        Err(e) => {
            let _ = bidi.error(ErrorKind::InvalidFields, Some(e.to_string())).await;
            return;
        }
    };
    let Some(share) = resolve_share(room, &path) else {
        let _ = bidi.file_not_exist(path.as_str()).await;
        return;
    };
    match share.get_file_meta(&path).await {
        Ok(FileMeta { name, is_dir, size_bytes }) => {
            let _ = bidi
                .write_message(&Message::FileMeta(FileMetaMsg {
                    name,
                    is_dir,
                    size_bytes,
                }))
                .await;
        }
        Err(e) => write_share_error(bidi, e).await,
    }
}

/// `GET_FILE`: report the file's true size in `FILE_META`, then stream the
/// clamped byte range with no further framing (§6, §8 scenario 5, §9
/// "converge on clamp", decided in DESIGN.md).
async fn handle_get_file(room: &Room, bidi: &mut ProtoBidi, msg: GetFileMsg) {
    let path = match net_protocol::validate_path(msg.path.as_bytes()) {
        Ok(p) => p,
        Err(e) => {
            let _ = bidi.error(ErrorKind::InvalidFields, Some(e.to_string())).await;
            return;
        }
    };
    let Some(share) = resolve_share(room, &path) else {
        let _ = bidi.file_not_exist(path.as_str()).await;
        return;
    };

    let meta = match share.get_file_meta(&path).await {
        Ok(meta) => meta,
        Err(e) => {
            write_share_error(bidi, e).await;
            return;
        }
    };
    if meta.is_dir {
        let _ = bidi
            .error(ErrorKind::InvalidFields, Some("path refers to a directory".to_owned()))
            .await;
        return;
    }

    let mut reader = match share.get_file(&path, msg.offset_bytes, msg.limit_bytes).await {
        Ok(reader) => reader,
        Err(e) => {
            write_share_error(bidi, e).await;
            return;
        }
    };

    if bidi
        .file_meta(FileMetaMsg {
            name: meta.name,
            is_dir: false,
            size_bytes: meta.size_bytes,
        })
        .await
        .is_err()
    {
        return;
    }
    let _ = bidi.copy_from_reader(&mut reader).await;
}

async fn write_share_error(bidi: &mut ProtoBidi, e: ShareError) {
    match e {
        ShareError::NotFound => {
            let _ = bidi.file_not_exist("").await;
        }
        ShareError::NotADirectory => {
            let _ = bidi.error(ErrorKind::PathNotDirectory, None).await;
        }
        ShareError::IsADirectory => {
            let _ = bidi
                .error(ErrorKind::InvalidFields, Some("path refers to a directory".to_owned()))
                .await;
        }
        ShareError::Io(io) => {
            let _ = bidi.internal(io.to_string()).await;
        }
    }
}
