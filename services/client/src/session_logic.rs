//! Client-initiated requests atop an open [`ProtoConn`] (§4.2, §6), and the
//! inbound side of peer-to-peer sharing: serving `GET_DIR_FILES` /
//! `GET_FILE_META` / `GET_FILE` / `PING` to a peer whose bidi arrived
//! wrapped in `INBOUND_PROXY` (§4.4, §4.5, §6).
//!
//! Request helpers are written once against `&dyn ProtoConn` and work
//! identically whether `conn` is the real session to a server or a
//! [`net_transport::VirtualC2cConn`] relayed through one (§9 "interface
//! polymorphism"), in the same shape as `UplinkSession::send_batch`'s
//! request/reply helpers, generalized to FriendNet's message set.

use std::collections::HashMap;
use std::sync::Arc;

use net_protocol::error::{ErrorKind, ProtocolError};
use net_protocol::message::{
    DirFilesMsg, FileMetaEntry, FileMetaMsg, GetDirFilesMsg, GetFileMetaMsg, GetFileMsg,
    GetOnlineUsersMsg, InboundProxyMsg, OnlineUserStatus, OnlineUsersMsg, OpenOutboundProxyMsg,
    PingMsg, PongMsg,
};
use net_protocol::{FileMeta, Message, MessageType, ProtoPath, Share, ShareError, Username, PAGE_SIZE};
use net_transport::{ProtoBidi, ProtoConn, VirtualC2cConn};

pub type ShareRegistry = HashMap<String, Arc<dyn Share>>;

/// Request helpers for an open [`ProtoConn`] (§6). A thin wrapper so call
/// sites read as `client.get_online_users().await` rather than free
/// functions threading `conn` through every call.
pub struct RequestClient<'a> {
    conn: &'a dyn ProtoConn,
}

impl<'a> RequestClient<'a> {
    pub fn new(conn: &'a dyn ProtoConn) -> Self {
        Self { conn }
    }

    pub async fn ping(&self, sent_ts_ms: u64) -> Result<u64, ProtocolError> {
        match self.conn.send_and_receive(Message::Ping(PingMsg { sent_ts_ms })).await? {
            Message::Pong(PongMsg { sent_ts_ms }) => Ok(sent_ts_ms),
            other => Err(unexpected(MessageType::Pong, other)),
        }
    }

    /// Collect every page of `GET_ONLINE_USERS` into one list (§4.4, §8 scenario 4).
    pub async fn get_online_users(&self) -> Result<Vec<Username>, ProtocolError> {
        let mut bidi = self
            .conn
            .open_bidi_with_msg(Message::GetOnlineUsers(GetOnlineUsersMsg {}))
            .await?;
        let mut users = Vec::new();
        loop {
            match bidi.read_message().await? {
                Message::OnlineUsers(OnlineUsersMsg { users: page }) => {
                    let last_page = page.len() < PAGE_SIZE;
                    for u in page {
                        if let Ok(name) = Username::normalize(&u.username) {
                            users.push(name);
                        }
                    }
                    if last_page {
                        break;
                    }
                }
                other => return Err(unexpected(MessageType::OnlineUsers, other)),
            }
        }
        bidi.close().await;
        Ok(users)
    }

    /// Collect every page of `GET_DIR_FILES` into one list (§4.4, §8 scenario 4).
    pub async fn get_dir_files(&self, path: &str) -> Result<Vec<FileMetaEntry>, ProtocolError> {
        let mut bidi = self
            .conn
            .open_bidi_with_msg(Message::GetDirFiles(GetDirFilesMsg { path: path.to_owned() }))
            .await?;
        let mut files = Vec::new();
        loop {
            match bidi.read_message().await? {
                Message::DirFiles(DirFilesMsg { files: page }) => {
                    let last_page = page.len() < PAGE_SIZE;
                    files.extend(page);
                    if last_page {
                        break;
                    }
                }
                other => return Err(unexpected(MessageType::DirFiles, other)),
            }
        }
        bidi.close().await;
        Ok(files)
    }

    pub async fn get_file_meta(&self, path: &str) -> Result<FileMetaMsg, ProtocolError> {
        match self
            .conn
            .send_and_receive(Message::GetFileMeta(GetFileMetaMsg { path: path.to_owned() }))
            .await?
        {
            Message::FileMeta(meta) => Ok(meta),
            other => Err(unexpected(MessageType::FileMeta, other)),
        }
    }

    /// `GET_FILE`: returns the file's metadata and the still-open bidi so
    /// the caller can stream the unframed byte tail with
    /// [`ProtoBidi::copy_to_writer`] (§6, §8 scenario 5).
    pub async fn get_file(
        &self,
        path: &str,
        offset_bytes: u64,
        limit_bytes: u64,
    ) -> Result<(FileMetaMsg, ProtoBidi), ProtocolError> {
        let mut bidi = self
            .conn
            .open_bidi_with_msg(Message::GetFile(GetFileMsg {
                path: path.to_owned(),
                offset_bytes,
                limit_bytes,
            }))
            .await?;
        match bidi.read_message().await? {
            Message::FileMeta(meta) => Ok((meta, bidi)),
            other => {
                bidi.close().await;
                Err(unexpected(MessageType::FileMeta, other))
            }
        }
    }

    pub async fn send_bye(&self) {
        let mut bidi = match self
            .conn
            .open_bidi_with_msg(Message::Bye(net_protocol::message::ByeMsg {}))
            .await
        {
            Ok(b) => b,
            Err(_) => return,
        };
        bidi.close().await;
    }

    /// Wrap this connection's server session in a [`VirtualC2cConn`] bound
    /// to `target`, so C2C requests are written once against
    /// `RequestClient` regardless of whether the peer is direct or relayed
    /// (§4.2, §9).
    pub fn via_peer(server: Arc<dyn ProtoConn>, target: Username) -> VirtualC2cConn {
        VirtualC2cConn::new(server, target)
    }
}

fn unexpected(expected: MessageType, actual: Message) -> ProtocolError {
    ProtocolError::UnexpectedType {
        expected,
        actual: actual.message_type(),
    }
}

/// What a supervised session does with a bidi it didn't ask for: a keepalive
/// ping from the server, or an `INBOUND_PROXY` tunnel opened by the server
/// on behalf of a peer (§4.4, §4.5, §9).
#[async_trait::async_trait]
pub trait ClientLogic: Send + Sync {
    async fn handle_incoming_bidi(&self, bidi: ProtoBidi);

    /// Release any resources the logic object holds (§4.6 `close()`).
    async fn close(&self) {}
}

/// Default [`ClientLogic`]: answers keepalive pings and serves this
/// client's own shares to a peer whose request arrived wrapped in
/// `INBOUND_PROXY` — the client-side mirror of `server::room`'s dispatch
/// table (§4.4), minus account/room bookkeeping and further proxying.
pub struct ShareLogic {
    shares: ShareRegistry,
}

impl ShareLogic {
    pub fn new(shares: ShareRegistry) -> Self {
        Self { shares }
    }

    fn resolve<'a>(&'a self, path: &ProtoPath) -> Option<&'a Arc<dyn Share>> {
        self.shares.get(path.share_name()?)
    }
}

#[async_trait::async_trait]
impl ClientLogic for ShareLogic {
    async fn handle_incoming_bidi(&self, mut bidi: ProtoBidi) {
        let first = match bidi.read_message().await {
            Ok(msg) => msg,
            Err(_) => {
                bidi.close().await;
                return;
            }
        };

        match first {
            Message::Ping(PingMsg { sent_ts_ms }) => {
                let _ = bidi.write_message(&Message::Pong(PongMsg { sent_ts_ms })).await;
            }
            Message::InboundProxy(InboundProxyMsg { origin_username: _ }) => {
                self.serve_one_request(&mut bidi).await;
            }
            other => {
                let _ = bidi.unimplemented(other.message_type()).await;
            }
        }
        bidi.close().await;
    }

    async fn close(&self) {}
}

impl ShareLogic {
    async fn serve_one_request(&self, bidi: &mut ProtoBidi) {
        let msg = match bidi.read_message().await {
            Ok(msg) => msg,
            Err(_) => return,
        };
        match msg {
            Message::Ping(PingMsg { sent_ts_ms }) => {
                let _ = bidi.write_message(&Message::Pong(PongMsg { sent_ts_ms })).await;
            }
            Message::GetDirFiles(GetDirFilesMsg { path }) => self.serve_dir_files(bidi, &path).await,
            Message::GetFileMeta(GetFileMetaMsg { path }) => self.serve_file_meta(bidi, &path).await,
            Message::GetFile(GetFileMsg { path, offset_bytes, limit_bytes }) => {
                self.serve_file(bidi, &path, offset_bytes, limit_bytes).await
            }
            other => {
                let _ = bidi.unimplemented(other.message_type()).await;
            }
        }
    }

    async fn serve_dir_files(&self, bidi: &mut ProtoBidi, path: &str) {
        let path = match net_protocol::validate_path(path.as_bytes()) {
            Ok(p) => p,
            Err(e) => {
                let _ = bidi.error(ErrorKind::InvalidFields, Some(e.to_string())).await;
                return;
            }
        };
        let Some(share) = self.resolve(&path) else {
            let _ = bidi.file_not_exist(path.as_str()).await;
            return;
        };

        let mut page = 0u32;
        loop {
            match share.dir_files(&path, page).await {
                Ok(entries) => {
                    // A short page (including an empty one, whether from an
                    // empty directory or an exact-multiple-of-PAGE_SIZE
                    // total) is the terminator the requester's pagination
                    // loop watches for; always write it.
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

    async fn serve_file_meta(&self, bidi: &mut ProtoBidi, path: &str) {
        let path = match net_protocol::validate_path(path.as_bytes()) {
            Ok(p) => p,
            Err(e) => {
                let _ = bidi.error(ErrorKind::InvalidFields, Some(e.to_string())).await;
                return;
            }
        };
        let Some(share) = self.resolve(&path) else {
            let _ = bidi.file_not_exist(path.as_str()).await;
            return;
        };
        match share.get_file_meta(&path).await {
            Ok(FileMeta { name, is_dir, size_bytes }) => {
                let _ = bidi.file_meta(FileMetaMsg { name, is_dir, size_bytes }).await;
            }
            Err(e) => write_share_error(bidi, e).await,
        }
    }

    async fn serve_file(&self, bidi: &mut ProtoBidi, path: &str, offset: u64, limit: u64) {
        let path = match net_protocol::validate_path(path.as_bytes()) {
            Ok(p) => p,
            Err(e) => {
                let _ = bidi.error(ErrorKind::InvalidFields, Some(e.to_string())).await;
                return;
            }
        };
        let Some(share) = self.resolve(&path) else {
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
        let mut reader = match share.get_file(&path, offset, limit).await {
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

/// Open an `OPEN_OUTBOUND_PROXY` tunnel as a request frame, for callers that
/// want to drive the tunnel manually instead of through [`VirtualC2cConn`].
pub async fn open_outbound_proxy(conn: &dyn ProtoConn, target: &Username) -> Result<ProtoBidi, ProtocolError> {
    conn.open_bidi_with_msg(Message::OpenOutboundProxy(OpenOutboundProxyMsg {
        target_username: target.as_str().to_owned(),
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_protocol::FrameCodec;
    use net_test_utils::MemoryConn;
    use tokio_util::sync::CancellationToken;

    fn codec() -> FrameCodec {
        FrameCodec::new(net_protocol::DEFAULT_MAX_PAYLOAD)
    }

    #[tokio::test]
    async fn get_online_users_collects_every_page() {
        let (client, server) = MemoryConn::pair(codec());
        let ctx = CancellationToken::new();

        tokio::spawn(async move {
            let mut bidi = server.wait_for_incoming_bidi(&ctx).await.unwrap();
            bidi.read_message().await.unwrap();
            bidi.write_message(&Message::OnlineUsers(OnlineUsersMsg {
                users: (0..PAGE_SIZE)
                    .map(|i| OnlineUserStatus { username: format!("u{i}") })
                    .collect(),
            }))
            .await
            .unwrap();
            bidi.write_message(&Message::OnlineUsers(OnlineUsersMsg {
                users: vec![OnlineUserStatus { username: "last".to_owned() }],
            }))
            .await
            .unwrap();
        });

        let users = RequestClient::new(&client).get_online_users().await.unwrap();
        assert_eq!(users.len(), PAGE_SIZE + 1);
        assert_eq!(users.last().unwrap().as_str(), "last");
    }

    #[tokio::test]
    async fn share_logic_answers_ping_on_a_fresh_bidi() {
        let (client, server) = MemoryConn::pair(codec());
        let ctx = CancellationToken::new();
        let logic = ShareLogic::new(ShareRegistry::new());

        let serve = tokio::spawn(async move {
            let bidi = server.wait_for_incoming_bidi(&ctx).await.unwrap();
            logic.handle_incoming_bidi(bidi).await;
        });

        let reply = client
            .send_and_receive(Message::Ping(PingMsg { sent_ts_ms: 7 }))
            .await
            .unwrap();
        assert_eq!(reply, Message::Pong(PongMsg { sent_ts_ms: 7 }));
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn share_logic_serves_a_file_through_inbound_proxy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi").unwrap();
        let mut shares: ShareRegistry = ShareRegistry::new();
        shares.insert("docs".to_owned(), Arc::new(share_fs::LocalFsShare::new(dir.path())));
        let logic = Arc::new(ShareLogic::new(shares));

        let (client, server) = MemoryConn::pair(codec());
        let ctx = CancellationToken::new();
        let logic_clone = logic.clone();
        let serve = tokio::spawn(async move {
            let bidi = server.wait_for_incoming_bidi(&ctx).await.unwrap();
            logic_clone.handle_incoming_bidi(bidi).await;
        });

        let mut bidi = client
            .open_bidi_with_msg(Message::InboundProxy(InboundProxyMsg {
                origin_username: "bob".to_owned(),
            }))
            .await
            .unwrap();
        bidi.write_message(&Message::GetFileMeta(GetFileMetaMsg {
            path: "/docs/hello.txt".to_owned(),
        }))
        .await
        .unwrap();
        let reply = bidi.read_message().await.unwrap();
        match reply {
            Message::FileMeta(meta) => assert_eq!(meta.size_bytes, 2),
            other => panic!("expected FileMeta, got {other:?}"),
        }
        serve.await.unwrap();
    }
}
