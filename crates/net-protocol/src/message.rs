//! Structured message schemas (§6) and the closed `type` → schema dispatch
//! table (§4.1, §9 "tagged variants"). Every payload is encoded with
//! `bincode` once the frame header has already told the reader the exact
//! byte count to read.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, WireError};
use crate::version::{ProtocolVersion, VersionRejectedReason};

/// The wire `type` tag (§3 frame header). `#[repr(u32)]` so the discriminant
/// is exactly the value written on the wire; decoding matches on the raw
/// `u32` and fails closed for anything outside this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Version = 0,
    VersionAccepted = 1,
    VersionRejected = 2,
    Authenticate = 3,
    AuthAccepted = 4,
    AuthRejected = 5,
    Ping = 6,
    Pong = 7,
    Bye = 8,
    Acknowledged = 9,
    Error = 10,
    OpenOutboundProxy = 11,
    InboundProxy = 12,
    GetDirFiles = 13,
    DirFiles = 14,
    GetFileMeta = 15,
    FileMeta = 16,
    GetFile = 17,
    GetOnlineUsers = 18,
    OnlineUsers = 19,
}

impl MessageType {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Version,
            1 => Self::VersionAccepted,
            2 => Self::VersionRejected,
            3 => Self::Authenticate,
            4 => Self::AuthAccepted,
            5 => Self::AuthRejected,
            6 => Self::Ping,
            7 => Self::Pong,
            8 => Self::Bye,
            9 => Self::Acknowledged,
            10 => Self::Error,
            11 => Self::OpenOutboundProxy,
            12 => Self::InboundProxy,
            13 => Self::GetDirFiles,
            14 => Self::DirFiles,
            15 => Self::GetFileMeta,
            16 => Self::FileMeta,
            17 => Self::GetFile,
            18 => Self::GetOnlineUsers,
            19 => Self::OnlineUsers,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMsg {
    pub version: ProtocolVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionAcceptedMsg {
    pub version: ProtocolVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRejectedMsg {
    pub version: ProtocolVersion,
    pub reason: VersionRejectedReason,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateMsg {
    pub room: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthAcceptedMsg {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthRejectedReason {
    InvalidCredentials,
    AlreadyConnected,
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRejectedMsg {
    pub reason: AuthRejectedReason,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingMsg {
    pub sent_ts_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongMsg {
    pub sent_ts_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByeMsg {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgedMsg {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOutboundProxyMsg {
    pub target_username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundProxyMsg {
    pub origin_username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDirFilesMsg {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetaEntry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirFilesMsg {
    pub files: Vec<FileMetaEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetFileMetaMsg {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetaMsg {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetFileMsg {
    pub path: String,
    pub offset_bytes: u64,
    /// 0 means "no limit" (read to end).
    pub limit_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetOnlineUsersMsg {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUserStatus {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUsersMsg {
    pub users: Vec<OnlineUserStatus>,
}

/// Default page size for `DIR_FILES` and `ONLINE_USERS` (§4.4, §8 scenario 4).
pub const PAGE_SIZE: usize = 50;

/// The closed message taxonomy: a discriminated union over [`MessageType`]
/// plus its payload schema (§9 "tagged variants").
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Version(VersionMsg),
    VersionAccepted(VersionAcceptedMsg),
    VersionRejected(VersionRejectedMsg),
    Authenticate(AuthenticateMsg),
    AuthAccepted(AuthAcceptedMsg),
    AuthRejected(AuthRejectedMsg),
    Ping(PingMsg),
    Pong(PongMsg),
    Bye(ByeMsg),
    Acknowledged(AcknowledgedMsg),
    Error(ErrorMsg),
    OpenOutboundProxy(OpenOutboundProxyMsg),
    InboundProxy(InboundProxyMsg),
    GetDirFiles(GetDirFilesMsg),
    DirFiles(DirFilesMsg),
    GetFileMeta(GetFileMetaMsg),
    FileMeta(FileMetaMsg),
    GetFile(GetFileMsg),
    GetOnlineUsers(GetOnlineUsersMsg),
    OnlineUsers(OnlineUsersMsg),
}

/// Payload failed to decode for its declared type.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode payload for {message_type:?}: {source}")]
pub struct DecodeError {
    pub message_type: MessageType,
    #[source]
    pub source: bincode::Error,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Version(_) => MessageType::Version,
            Self::VersionAccepted(_) => MessageType::VersionAccepted,
            Self::VersionRejected(_) => MessageType::VersionRejected,
            Self::Authenticate(_) => MessageType::Authenticate,
            Self::AuthAccepted(_) => MessageType::AuthAccepted,
            Self::AuthRejected(_) => MessageType::AuthRejected,
            Self::Ping(_) => MessageType::Ping,
            Self::Pong(_) => MessageType::Pong,
            Self::Bye(_) => MessageType::Bye,
            Self::Acknowledged(_) => MessageType::Acknowledged,
            Self::Error(_) => MessageType::Error,
            Self::OpenOutboundProxy(_) => MessageType::OpenOutboundProxy,
            Self::InboundProxy(_) => MessageType::InboundProxy,
            Self::GetDirFiles(_) => MessageType::GetDirFiles,
            Self::DirFiles(_) => MessageType::DirFiles,
            Self::GetFileMeta(_) => MessageType::GetFileMeta,
            Self::FileMeta(_) => MessageType::FileMeta,
            Self::GetFile(_) => MessageType::GetFile,
            Self::GetOnlineUsers(_) => MessageType::GetOnlineUsers,
            Self::OnlineUsers(_) => MessageType::OnlineUsers,
        }
    }

    /// Serialize just the payload (the frame header is prepended by the codec).
    pub fn encode_payload(&self) -> Vec<u8> {
        macro_rules! ser {
            ($m:expr) => {
                bincode::serialize($m).expect("message payloads are always serializable")
            };
        }
        match self {
            Self::Version(m) => ser!(m),
            Self::VersionAccepted(m) => ser!(m),
            Self::VersionRejected(m) => ser!(m),
            Self::Authenticate(m) => ser!(m),
            Self::AuthAccepted(m) => ser!(m),
            Self::AuthRejected(m) => ser!(m),
            Self::Ping(m) => ser!(m),
            Self::Pong(m) => ser!(m),
            Self::Bye(m) => ser!(m),
            Self::Acknowledged(m) => ser!(m),
            Self::Error(m) => ser!(m),
            Self::OpenOutboundProxy(m) => ser!(m),
            Self::InboundProxy(m) => ser!(m),
            Self::GetDirFiles(m) => ser!(m),
            Self::DirFiles(m) => ser!(m),
            Self::GetFileMeta(m) => ser!(m),
            Self::FileMeta(m) => ser!(m),
            Self::GetFile(m) => ser!(m),
            Self::GetOnlineUsers(m) => ser!(m),
            Self::OnlineUsers(m) => ser!(m),
        }
    }

    /// Decode `payload` according to `message_type`. Fails closed for any
    /// `type` outside the known table via [`MessageType::from_u32`] upstream.
    pub fn decode(message_type: MessageType, payload: &[u8]) -> Result<Self, DecodeError> {
        let wrap = |source| DecodeError {
            message_type,
            source,
        };
        Ok(match message_type {
            MessageType::Version => {
                Self::Version(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::VersionAccepted => {
                Self::VersionAccepted(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::VersionRejected => {
                Self::VersionRejected(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::Authenticate => {
                Self::Authenticate(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::AuthAccepted => {
                Self::AuthAccepted(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::AuthRejected => {
                Self::AuthRejected(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::Ping => Self::Ping(bincode::deserialize(payload).map_err(wrap)?),
            MessageType::Pong => Self::Pong(bincode::deserialize(payload).map_err(wrap)?),
            MessageType::Bye => Self::Bye(bincode::deserialize(payload).map_err(wrap)?),
            MessageType::Acknowledged => {
                Self::Acknowledged(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::Error => Self::Error(bincode::deserialize(payload).map_err(wrap)?),
            MessageType::OpenOutboundProxy => {
                Self::OpenOutboundProxy(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::InboundProxy => {
                Self::InboundProxy(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::GetDirFiles => {
                Self::GetDirFiles(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::DirFiles => {
                Self::DirFiles(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::GetFileMeta => {
                Self::GetFileMeta(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::FileMeta => {
                Self::FileMeta(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::GetFile => Self::GetFile(bincode::deserialize(payload).map_err(wrap)?),
            MessageType::GetOnlineUsers => {
                Self::GetOnlineUsers(bincode::deserialize(payload).map_err(wrap)?)
            }
            MessageType::OnlineUsers => {
                Self::OnlineUsers(bincode::deserialize(payload).map_err(wrap)?)
            }
        })
    }
}
