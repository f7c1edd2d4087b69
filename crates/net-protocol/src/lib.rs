//! FriendNet wire protocol: frame codec, message schemas, identifiers,
//! path validation, and the collaborator contracts named at the core's
//! boundary (password hasher).

pub mod error;
pub mod frame;
pub mod identifiers;
pub mod message;
pub mod password;
pub mod path;
pub mod share;
pub mod version;

pub use error::{ErrorKind, ProtocolError, WireError, PEER_UNREACHABLE_STREAM_CODE};
pub use frame::{FrameCodec, DEFAULT_MAX_PAYLOAD, HEADER_LEN};
pub use identifiers::{normalize_hostname, IdentifierError, RoomName, Username};
pub use message::{Message, MessageType, PAGE_SIZE};
pub use path::{validate_path, PathError, PathErrorCode, ProtoPath};
pub use share::{FileMeta, Share, ShareError};
pub use version::{ProtocolVersion, VersionRejectedReason};
