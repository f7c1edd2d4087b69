//! Wire-level error taxonomy (§4.1, §6, §7).
//!
//! `ErrorKind` is the payload of an `ERROR` frame. `ProtocolError` is what a
//! reader actually gets back from [`crate::frame`] helpers: either a decode
//! failure local to this side, or an `ERROR` frame the peer sent us,
//! automatically unwrapped so callers never have to match on message type
//! just to notice a failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Internal,
    InvalidFields,
    UnexpectedMsgType,
    Unimplemented,
    FileNotExist,
    PathNotDirectory,
    RateLimited,
    PeerUnreachable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

/// Reserved stream-cancellation code meaning "proxy target unreachable" (§4.1, §6).
pub const PEER_UNREACHABLE_STREAM_CODE: u32 = 101;

/// Everything that can go wrong reading or writing a typed message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload of {payload_len} bytes exceeds the configured ceiling of {max} bytes")]
    PayloadTooLarge { payload_len: u32, max: u32 },
    #[error("unknown frame type {0}")]
    UnknownType(u32),
    #[error("malformed payload for type {message_type:?}: {source}")]
    Malformed {
        message_type: MessageType,
        #[source]
        source: bincode::Error,
    },
    #[error("peer sent ERROR: {0}")]
    Remote(#[from] WireError),
    #[error("expected message type {expected:?}, got {actual:?}")]
    UnexpectedType {
        expected: MessageType,
        actual: MessageType,
    },
    #[error("peer is unreachable (stream cancelled with code {PEER_UNREACHABLE_STREAM_CODE})")]
    PeerUnreachable,
    #[error("stream cancelled with code {0}")]
    StreamCancelled(u32),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}
