//! Transport module - moving frames over an async byte stream.
//!
//! - [`CommandReader`]: decodes inbound commands, with or without size prefix
//! - [`WriterHandle`]: queues marshalled frames for a dedicated writer task
//! - [`negotiate`]: the `WireFormatInfo` handshake that opens every connection

mod reader;
mod writer;

use std::time::Duration;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::commands::WireFormatInfo;
use crate::error::{OpenWireError, Result};
use crate::protocol::WireFormat;

pub use reader::CommandReader;
pub use writer::{
    spawn_default_writer, spawn_writer, EncodedFrame, WriterHandle, WriterOptions,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_QUEUED_FRAMES, DEFAULT_SEND_TIMEOUT,
};

/// Default time to wait for the peer's `WireFormatInfo`.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Send the preferred `WireFormatInfo`, wait for the peer's and renegotiate.
///
/// The first inbound command must be a `WireFormatInfo`. Returns the
/// remote offer.
pub async fn negotiate<R>(
    reader: &mut CommandReader<R>,
    writer: &WriterHandle,
    wf: &mut WireFormat,
    timeout: Duration,
) -> Result<WireFormatInfo>
where
    R: AsyncRead + Unpin,
{
    let preferred = wf.preferred().cloned().ok_or_else(|| {
        OpenWireError::IllegalState("No preferred WireFormatInfo to offer".into())
    })?;
    debug!(version = preferred.version, "Sending WireFormatInfo");
    writer.send_command(wf, &preferred).await?;

    let inbound = match tokio::time::timeout(timeout, reader.next_command(wf)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(?timeout, "Timed out waiting for remote WireFormatInfo");
            return Err(OpenWireError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out waiting for WireFormatInfo",
            )));
        }
    };
    let Some(command) = inbound else {
        return Err(OpenWireError::ConnectionClosed);
    };
    let remote = match command.downcast::<WireFormatInfo>() {
        Ok(info) => *info,
        Err(_) => {
            return Err(OpenWireError::Protocol(
                "Expected WireFormatInfo as the first command".into(),
            ))
        }
    };

    wf.renegotiate(&remote)?;
    debug!(remote = %remote, version = wf.version(), "Handshake complete");
    Ok(remote)
}
