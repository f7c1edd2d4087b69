//! Frame codec (§3, §4.1): `{ type: u32 LE, payload_len: u32 LE, payload }`.
//!
//! Generic over `tokio::io::AsyncRead`/`AsyncWrite` so the same codec runs
//! over a real QUIC stream, an in-memory `tokio::io::duplex` pair in tests,
//! or the virtual proxy-relayed path — it never depends on a concrete
//! transport type.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, WireError};
use crate::message::{Message, MessageType};

pub const HEADER_LEN: usize = 8;

/// Per spec.md §9's open question: the wire format has no built-in ceiling,
/// so every implementation needs one. 16 MiB by default.
pub const DEFAULT_MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl FrameCodec {
    pub fn new(max_payload: u32) -> Self {
        Self { max_payload }
    }

    /// Read one frame's worth of bytes, looping over partial reads.
    ///
    /// `Ok(None)` means the stream ended exactly at a frame boundary (normal
    /// completion). EOF mid-header or mid-payload is a protocol violation
    /// and surfaces as `Io(UnexpectedEof)`.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &self,
        r: &mut R,
    ) -> Result<Option<(u32, Vec<u8>)>, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        let n = read_fill(r, &mut header).await?;
        if n == 0 {
            return Ok(None);
        }
        if n < HEADER_LEN {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "end of stream mid-header",
            )));
        }

        let type_ = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let payload_len = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if payload_len > self.max_payload {
            return Err(ProtocolError::PayloadTooLarge {
                payload_len,
                max: self.max_payload,
            });
        }

        let mut payload = vec![0u8; payload_len as usize];
        let n = read_fill(r, &mut payload).await?;
        if n < payload.len() {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "end of stream mid-payload",
            )));
        }

        Ok(Some((type_, payload)))
    }

    /// Write the 8-byte header followed by `payload`, looping over partial writes.
    pub async fn write_frame<W: AsyncWrite + Unpin>(
        &self,
        w: &mut W,
        type_: u32,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            ProtocolError::PayloadTooLarge {
                payload_len: u32::MAX,
                max: self.max_payload,
            }
        })?;
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&type_.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(payload);
        w.write_all(&buf).await?;
        Ok(())
    }

    /// Write a typed [`Message`].
    pub async fn write_message<W: AsyncWrite + Unpin>(
        &self,
        w: &mut W,
        msg: &Message,
    ) -> Result<(), ProtocolError> {
        let payload = msg.encode_payload();
        self.write_frame(w, msg.message_type() as u32, &payload)
            .await
    }

    /// Read one typed message. An incoming `ERROR` frame is automatically
    /// converted into `Err(ProtocolError::Remote(..))` so callers are
    /// shielded from branching on message type just to notice a failure.
    pub async fn read_message<R: AsyncRead + Unpin>(
        &self,
        r: &mut R,
    ) -> Result<Message, ProtocolError> {
        let (type_, payload) = self
            .read_frame(r)
            .await?
            .ok_or_else(|| ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into()))?;
        let message_type =
            MessageType::from_u32(type_).ok_or(ProtocolError::UnknownType(type_))?;
        let msg = Message::decode(message_type, &payload)
            .map_err(|e| ProtocolError::Malformed {
                message_type: e.message_type,
                source: e.source,
            })?;
        if let Message::Error(err) = msg {
            return Err(ProtocolError::Remote(WireError {
                kind: err.kind,
                message: err.message,
            }));
        }
        Ok(msg)
    }

    /// Like [`Self::read_message`], but additionally asserts the decoded
    /// message is of type `expected`.
    pub async fn read_expecting<R: AsyncRead + Unpin>(
        &self,
        r: &mut R,
        expected: MessageType,
    ) -> Result<Message, ProtocolError> {
        let msg = self.read_message(r).await?;
        let actual = msg.message_type();
        if actual != expected {
            return Err(ProtocolError::UnexpectedType { expected, actual });
        }
        Ok(msg)
    }
}

/// Loop reads into `buf` until full or the stream hits EOF; returns the
/// number of bytes actually filled (< `buf.len()` only at a genuine EOF).
async fn read_fill<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
