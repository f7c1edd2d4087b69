//! In-memory `ProtoConn` pair for exercising lobby/room/session logic
//! without a real QUIC socket, mirroring the role the reference codebase's
//! mock websocket client/server fixtures play for its reconnect tests.

use async_trait::async_trait;
use net_protocol::error::ProtocolError;
use net_protocol::{FrameCodec, Message};
use net_transport::{ProtoBidi, ProtoConn};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// One end of an in-memory connection pair. A bidi opened from one end
/// surfaces out of the other end's `wait_for_incoming_bidi`.
pub struct MemoryConn {
    outgoing: mpsc::UnboundedSender<ProtoBidi>,
    incoming: Mutex<mpsc::UnboundedReceiver<ProtoBidi>>,
    codec: FrameCodec,
}

impl MemoryConn {
    /// Build a connected pair: `(a, b)`.
    pub fn pair(codec: FrameCodec) -> (Self, Self) {
        let (tx_a_to_b, rx_a_to_b) = mpsc::unbounded_channel();
        let (tx_b_to_a, rx_b_to_a) = mpsc::unbounded_channel();
        let a = Self {
            outgoing: tx_a_to_b,
            incoming: Mutex::new(rx_b_to_a),
            codec,
        };
        let b = Self {
            outgoing: tx_b_to_a,
            incoming: Mutex::new(rx_a_to_b),
            codec,
        };
        (a, b)
    }
}

#[async_trait]
impl ProtoConn for MemoryConn {
    async fn close_with_reason(&self, _reason: &str) {
        // Dropping the sender half (on crate teardown) is the only signal
        // an in-memory pair has; nothing to flush here.
    }

    async fn open_bidi_with_msg(&self, msg: Message) -> Result<ProtoBidi, ProtocolError> {
        let (mine, theirs) = duplex_bidi_pair(self.codec);
        self.outgoing
            .send(theirs)
            .map_err(|_| ProtocolError::Io(std::io::ErrorKind::BrokenPipe.into()))?;
        let mut mine = mine;
        mine.write_message(&msg).await?;
        Ok(mine)
    }

    async fn wait_for_incoming_bidi(&self, ctx: &CancellationToken) -> Result<ProtoBidi, ProtocolError> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ProtocolError::Io(std::io::ErrorKind::TimedOut.into())),
            bidi = incoming.recv() => bidi.ok_or(ProtocolError::Io(std::io::ErrorKind::BrokenPipe.into())),
        }
    }

    async fn send_and_receive(&self, msg: Message) -> Result<Message, ProtocolError> {
        let mut bidi = self.open_bidi_with_msg(msg).await?;
        let reply = bidi.read_message().await;
        bidi.close().await;
        reply
    }
}

/// Build a pair of `ProtoBidi`s backed by a single in-memory duplex pipe,
/// one per side of the same stream.
fn duplex_bidi_pair(codec: FrameCodec) -> (ProtoBidi, ProtoBidi) {
    let (side_a, side_b) = tokio::io::duplex(64 * 1024);
    let (read_a, write_a) = tokio::io::split(side_a);
    let (read_b, write_b) = tokio::io::split(side_b);
    (
        ProtoBidi::from_memory(write_a, read_a, codec),
        ProtoBidi::from_memory(write_b, read_b, codec),
    )
}
