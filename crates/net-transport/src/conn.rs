//! `ProtoConn` / `ProtoBidi` (§4.2): the transport-agnostic connection
//! abstraction every request/reply handler is written against, plus the
//! real QUIC-backed implementation.
//!
//! `ProtoConn` is a capability set (four methods), not a class hierarchy —
//! `QuicConn` and [`crate::virtual_conn::VirtualC2cConn`] both implement it
//! and request/reply code is written once against the trait object (§9
//! "interface polymorphism").

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use net_protocol::error::{ErrorKind, ProtocolError, PEER_UNREACHABLE_STREAM_CODE};
use net_protocol::message::{ByeMsg, ErrorMsg, FileMetaMsg, Message, MessageType};
use net_protocol::{FrameCodec, Username};
use quinn::{Connection, RecvStream, SendStream, VarInt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream, ReadBuf, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

/// Error raised by our own in-memory transport double to simulate a
/// stream-cancellation code, mirroring what `quinn::ReadError::Reset`
/// carries on the real transport.
#[derive(Debug, thiserror::Error)]
#[error("stream reset with code {0}")]
pub struct StreamResetError(pub u32);

/// Inspect an I/O error for an embedded stream-cancellation code, from
/// either the real QUIC transport or our in-memory test double.
fn classify_cancel_code(err: &std::io::Error) -> Option<u32> {
    if let Some(quinn::ReadError::Reset(code)) = err.get_ref().and_then(|e| e.downcast_ref()) {
        return Some(code.into_inner() as u32);
    }
    if let Some(StreamResetError(code)) = err.get_ref().and_then(|e| e.downcast_ref()) {
        return Some(*code);
    }
    None
}

/// Turn an I/O error from a bidi read/write into the right `ProtocolError`,
/// surfacing the reserved `101` code as `peer_unreachable` (§4.1, §7).
fn map_stream_error(err: std::io::Error) -> ProtocolError {
    match classify_cancel_code(&err) {
        Some(PEER_UNREACHABLE_STREAM_CODE) => ProtocolError::PeerUnreachable,
        Some(code) => ProtocolError::StreamCancelled(code),
        None => ProtocolError::Io(err),
    }
}

enum RecvInner {
    Quic(RecvStream),
    Memory(ReadHalf<DuplexStream>, std::sync::Arc<std::sync::atomic::AtomicU32>),
}

enum SendInner {
    Quic(SendStream),
    Memory(WriteHalf<DuplexStream>),
}

impl AsyncRead for RecvInner {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            RecvInner::Quic(s) => Pin::new(s).poll_read(cx, buf),
            RecvInner::Memory(s, reset_code) => {
                let code = reset_code.load(std::sync::atomic::Ordering::SeqCst);
                if code != 0 {
                    return Poll::Ready(Err(std::io::Error::other(StreamResetError(code))));
                }
                Pin::new(s).poll_read(cx, buf)
            }
        }
    }
}

impl AsyncWrite for SendInner {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SendInner::Quic(s) => Pin::new(s).poll_write(cx, buf),
            SendInner::Memory(s) => Pin::new(s).poll_write(cx, buf),
        }
    }
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SendInner::Quic(s) => Pin::new(s).poll_flush(cx),
            SendInner::Memory(s) => Pin::new(s).poll_flush(cx),
        }
    }
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SendInner::Quic(s) => Pin::new(s).poll_shutdown(cx),
            SendInner::Memory(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A `(stream, reader, writer)` triple (§4.2). `close()` is idempotent.
pub struct ProtoBidi {
    recv: RecvInner,
    send: SendInner,
    codec: FrameCodec,
    closed: bool,
}

impl ProtoBidi {
    pub(crate) fn from_quic(send: SendStream, recv: RecvStream, codec: FrameCodec) -> Self {
        Self {
            recv: RecvInner::Quic(recv),
            send: SendInner::Quic(send),
            codec,
            closed: false,
        }
    }

    /// Build a bidi over an in-memory duplex half, for tests and the
    /// proxy-relayed virtual connection.
    pub fn from_memory(send: WriteHalf<DuplexStream>, recv: ReadHalf<DuplexStream>, codec: FrameCodec) -> Self {
        Self {
            recv: RecvInner::Memory(recv, std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0))),
            send: SendInner::Memory(send),
            codec,
            closed: false,
        }
    }

    pub async fn write_message(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.codec.write_message(&mut self.send, msg).await
    }

    pub async fn read_message(&mut self) -> Result<Message, ProtocolError> {
        self.codec
            .read_message(&mut self.recv)
            .await
            .map_err(Self::remap)
    }

    pub async fn read_expecting(&mut self, expected: MessageType) -> Result<Message, ProtocolError> {
        self.codec
            .read_expecting(&mut self.recv, expected)
            .await
            .map_err(Self::remap)
    }

    fn remap(err: ProtocolError) -> ProtocolError {
        match err {
            ProtocolError::Io(io) => map_stream_error(io),
            other => other,
        }
    }

    /// Cancel this bidi with a stream error code. On the real transport this
    /// is `RecvStream::stop` / `SendStream::reset`; on the in-memory double
    /// it flips a flag the next read observes.
    pub fn cancel(&mut self, code: u32) {
        match &mut self.recv {
            RecvInner::Quic(s) => {
                let _ = s.stop(VarInt::from_u32(code));
            }
            RecvInner::Memory(_, reset_code) => {
                reset_code.store(code, std::sync::atomic::Ordering::SeqCst);
            }
        }
        if let SendInner::Quic(s) = &mut self.send {
            let _ = s.reset(VarInt::from_u32(code));
        }
    }

    /// Shut down the write side and cancel the read side. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        use tokio::io::AsyncWriteExt;
        let _ = AsyncWriteExt::shutdown(&mut self.send).await;
        if let RecvInner::Quic(s) = &mut self.recv {
            let _ = s.stop(VarInt::from_u32(0));
        }
    }

    // Convenience writers (§4.2) ------------------------------------------------

    pub async fn ack(&mut self) -> Result<(), ProtocolError> {
        self.write_message(&Message::Acknowledged(
            net_protocol::message::AcknowledgedMsg {},
        ))
        .await
    }

    pub async fn error(&mut self, kind: ErrorKind, message: Option<String>) -> Result<(), ProtocolError> {
        self.write_message(&Message::Error(ErrorMsg { kind, message }))
            .await
    }

    pub async fn unexpected_msg_type(
        &mut self,
        expected: MessageType,
        actual: MessageType,
    ) -> Result<(), ProtocolError> {
        self.error(
            ErrorKind::UnexpectedMsgType,
            Some(format!("expected {expected:?}, got {actual:?}")),
        )
        .await
    }

    pub async fn internal(&mut self, message: impl Into<String>) -> Result<(), ProtocolError> {
        self.error(ErrorKind::Internal, Some(message.into())).await
    }

    pub async fn unimplemented(&mut self, message_type: MessageType) -> Result<(), ProtocolError> {
        self.error(
            ErrorKind::Unimplemented,
            Some(format!("{message_type:?} is not implemented")),
        )
        .await
    }

    pub async fn file_not_exist(&mut self, path: impl Into<String>) -> Result<(), ProtocolError> {
        self.error(ErrorKind::FileNotExist, Some(path.into())).await
    }

    pub async fn send_bye(&mut self) -> Result<(), ProtocolError> {
        self.write_message(&Message::Bye(ByeMsg {})).await
    }

    pub async fn file_meta(&mut self, meta: FileMetaMsg) -> Result<(), ProtocolError> {
        self.write_message(&Message::FileMeta(meta)).await
    }

    /// Copy raw bytes onto the wire with no frame header, for the
    /// unframed tail of a `GET_FILE` response (§6).
    pub async fn copy_from_reader<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<u64, ProtocolError> {
        tokio::io::copy(reader, &mut self.send)
            .await
            .map_err(map_stream_error)
    }

    /// Copy raw bytes off the wire (no frame header) into `writer`. `limit
    /// == 0` reads until the peer closes its write side.
    pub async fn copy_to_writer<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        limit: u64,
    ) -> Result<u64, ProtocolError> {
        if limit == 0 {
            tokio::io::copy(&mut self.recv, writer)
                .await
                .map_err(map_stream_error)
        } else {
            let mut limited = (&mut self.recv).take(limit);
            tokio::io::copy(&mut limited, writer)
                .await
                .map_err(map_stream_error)
        }
    }

    /// Split into an owned reader/writer pair of raw byte halves, for
    /// relaying one bidi's bytes into another without the framing codec
    /// (§4.5 proxying).
    pub fn into_split_raw(self) -> (ProtoBidiReader, ProtoBidiWriter) {
        (ProtoBidiReader { recv: self.recv }, ProtoBidiWriter { send: self.send })
    }
}

/// The read half of a [`ProtoBidi`] after [`ProtoBidi::into_split_raw`].
pub struct ProtoBidiReader {
    recv: RecvInner,
}

/// The write half of a [`ProtoBidi`] after [`ProtoBidi::into_split_raw`].
pub struct ProtoBidiWriter {
    send: SendInner,
}

impl AsyncRead for ProtoBidiReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().recv).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProtoBidiWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().send).poll_write(cx, buf)
    }
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().send).poll_flush(cx)
    }
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().send).poll_shutdown(cx)
    }
}

/// The four-capability transport-agnostic surface (§4.2, §9).
#[async_trait]
pub trait ProtoConn: Send + Sync {
    async fn close_with_reason(&self, reason: &str);
    async fn open_bidi_with_msg(&self, msg: Message) -> Result<ProtoBidi, ProtocolError>;
    async fn wait_for_incoming_bidi(&self, ctx: &CancellationToken) -> Result<ProtoBidi, ProtocolError>;
    async fn send_and_receive(&self, msg: Message) -> Result<Message, ProtocolError>;
}

/// QUIC-backed `ProtoConn`.
pub struct QuicConn {
    connection: Connection,
    codec: FrameCodec,
}

impl QuicConn {
    pub fn new(connection: Connection, codec: FrameCodec) -> Self {
        Self { connection, codec }
    }

    pub fn remote_username_hint(&self) -> Option<Username> {
        None
    }
}

#[async_trait]
impl ProtoConn for QuicConn {
    async fn close_with_reason(&self, reason: &str) {
        self.connection
            .close(VarInt::from_u32(0), reason.as_bytes());
    }

    async fn open_bidi_with_msg(&self, msg: Message) -> Result<ProtoBidi, ProtocolError> {
        let (send, recv) = self
            .connection
            .open_bi()
            .await
            .map_err(|e| ProtocolError::Io(std::io::Error::other(e)))?;
        let mut bidi = ProtoBidi::from_quic(send, recv, self.codec);
        bidi.write_message(&msg).await?;
        Ok(bidi)
    }

    async fn wait_for_incoming_bidi(&self, ctx: &CancellationToken) -> Result<ProtoBidi, ProtocolError> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ProtocolError::Io(std::io::ErrorKind::TimedOut.into())),
            accepted = self.connection.accept_bi() => {
                let (send, recv) = accepted.map_err(|e| ProtocolError::Io(std::io::Error::other(e)))?;
                Ok(ProtoBidi::from_quic(send, recv, self.codec))
            }
        }
    }

    async fn send_and_receive(&self, msg: Message) -> Result<Message, ProtocolError> {
        let mut bidi = self.open_bidi_with_msg(msg).await?;
        let reply = bidi.read_message().await;
        bidi.close().await;
        reply
    }
}
