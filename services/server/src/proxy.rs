//! Bidirectional byte relay between two already-open bidis (§4.5).
//!
//! `origin -> target` and `target -> origin` run concurrently; whichever
//! direction finishes first (EOF, or a stream reset from either peer) ends
//! the relay and the other direction is abandoned mid-flight. Any I/O
//! error other than a clean end propagates.

use net_protocol::error::ProtocolError;
use net_transport::ProtoBidi;

/// Relay raw bytes both ways between `origin` and `target` until either
/// direction ends, then shut down both write sides.
pub async fn relay(origin: ProtoBidi, target: ProtoBidi) -> Result<(), ProtocolError> {
    let (mut origin_r, mut origin_w) = origin.into_split_raw();
    let (mut target_r, mut target_w) = target.into_split_raw();

    let result = tokio::select! {
        r = tokio::io::copy(&mut origin_r, &mut target_w) => r,
        r = tokio::io::copy(&mut target_r, &mut origin_w) => r,
    };

    use tokio::io::AsyncWriteExt;
    let _ = origin_w.shutdown().await;
    let _ = target_w.shutdown().await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_normal_relay_end(&e) => Ok(()),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

/// EOF, a cancelled context, or a stream cancellation from the other
/// endpoint all end a relay normally (§4.5); only other I/O errors propagate.
fn is_normal_relay_end(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
    ) || err
        .get_ref()
        .is_some_and(|inner| inner.downcast_ref::<net_transport::StreamResetError>().is_some())
}
