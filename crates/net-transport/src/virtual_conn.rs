//! `VirtualC2cConn` (§4.2, §9): a `ProtoConn` adapter that routes every
//! opened bidi through the server as a proxy request to a named peer. Lets
//! client-side request/reply code be written once against [`ProtoConn`] and
//! used both for server-bound requests and peer-bound requests relayed
//! through a server proxy.

use std::sync::Arc;

use async_trait::async_trait;
use net_protocol::error::ProtocolError;
use net_protocol::message::{Message, OpenOutboundProxyMsg};
use net_protocol::Username;
use tokio_util::sync::CancellationToken;

use crate::conn::{ProtoBidi, ProtoConn};

/// Presents the `ProtoConn` surface but every `open_bidi_with_msg` actually
/// opens an `OPEN_OUTBOUND_PROXY` tunnel to `target` through `server`, then
/// writes the caller's message as the first frame once the tunnel exists.
pub struct VirtualC2cConn {
    server: Arc<dyn ProtoConn>,
    target: Username,
}

impl VirtualC2cConn {
    pub fn new(server: Arc<dyn ProtoConn>, target: Username) -> Self {
        Self { server, target }
    }
}

#[async_trait]
impl ProtoConn for VirtualC2cConn {
    async fn close_with_reason(&self, reason: &str) {
        self.server.close_with_reason(reason).await;
    }

    async fn open_bidi_with_msg(&self, msg: Message) -> Result<ProtoBidi, ProtocolError> {
        let mut bidi = self
            .server
            .open_bidi_with_msg(Message::OpenOutboundProxy(OpenOutboundProxyMsg {
                target_username: self.target.as_str().to_owned(),
            }))
            .await?;
        bidi.write_message(&msg).await?;
        Ok(bidi)
    }

    async fn wait_for_incoming_bidi(&self, _ctx: &CancellationToken) -> Result<ProtoBidi, ProtocolError> {
        Err(ProtocolError::NotImplemented(
            "VirtualC2cConn does not support wait_for_incoming_bidi",
        ))
    }

    async fn send_and_receive(&self, msg: Message) -> Result<Message, ProtocolError> {
        let mut bidi = self.open_bidi_with_msg(msg).await?;
        let reply = bidi.read_message().await;
        bidi.close().await;
        reply
    }
}
