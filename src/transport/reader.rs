//! Inbound side: turns a byte stream into commands.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use crate::commands::Command;
use crate::error::{OpenWireError, Result};
use crate::protocol::{DataInput, FrameBuffer, WireFormat, DEFAULT_MAX_FRAME_SIZE};

const READ_CHUNK_SIZE: usize = 64 * 1024;

enum Decoded {
    Pending,
    Null,
    Command(Box<dyn Command>),
}

/// Reads commands from an `AsyncRead`.
///
/// Whether frames carry a size prefix is taken from the wire format on
/// every call, so the same reader keeps working across negotiation.
pub struct CommandReader<R> {
    reader: R,
    frames: FrameBuffer,
    max_frame_size: u32,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> CommandReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_size(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(reader: R, max_frame_size: u32) -> Self {
        Self {
            reader,
            frames: FrameBuffer::with_max_frame_size(max_frame_size),
            max_frame_size,
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.frames.len()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Next command from the stream. Null frames are skipped.
    ///
    /// Returns `Ok(None)` when the peer closed the stream between frames.
    pub async fn next_command(&mut self, wf: &WireFormat) -> Result<Option<Box<dyn Command>>> {
        loop {
            match self.try_decode(wf)? {
                Decoded::Command(command) => return Ok(Some(command)),
                Decoded::Null => {
                    trace!("Skipping null frame");
                    continue;
                }
                Decoded::Pending => {}
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.frames.is_empty() && !self.frames.is_mid_frame() {
                    return Ok(None);
                }
                warn!(buffered = self.frames.len(), "Stream closed mid-frame");
                return Err(OpenWireError::ConnectionClosed);
            }
            self.frames.extend(&self.chunk[..n]);
        }
    }

    fn try_decode(&mut self, wf: &WireFormat) -> Result<Decoded> {
        if !wf.is_size_prefix_disabled() || self.frames.is_mid_frame() {
            return match self.frames.next_frame()? {
                Some(frame) => Ok(decoded(wf.unmarshal_frame(&frame)?)),
                None => Ok(Decoded::Pending),
            };
        }

        if self.frames.is_empty() {
            return Ok(Decoded::Pending);
        }
        let mut input = DataInput::new(self.frames.pending());
        match wf.unmarshal(&mut input) {
            Ok(command) => {
                let consumed = input.position();
                self.frames.advance(consumed);
                Ok(decoded(command))
            }
            Err(OpenWireError::UnexpectedEof { .. }) => {
                if self.frames.len() as u64 > u64::from(self.max_frame_size) {
                    warn!(
                        buffered = self.frames.len(),
                        max = self.max_frame_size,
                        "Unprefixed frame exceeds maximum size"
                    );
                    return Err(OpenWireError::Protocol(format!(
                        "Frame exceeds maximum size of {}",
                        self.max_frame_size
                    )));
                }
                Ok(Decoded::Pending)
            }
            Err(e) => Err(e),
        }
    }
}

fn decoded(command: Option<Box<dyn Command>>) -> Decoded {
    match command {
        Some(command) => Decoded::Command(command),
        None => Decoded::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{types, KeepAliveInfo, ShutdownInfo};
    use tokio::io::{duplex, AsyncWriteExt};

    fn unprefixed_loose() -> WireFormat {
        let mut wf = WireFormat::default();
        wf.set_size_prefix_disabled(true).unwrap();
        wf
    }

    #[tokio::test]
    async fn test_reads_prefixed_commands() {
        let wf = WireFormat::default();
        let (mut tx, rx) = duplex(4096);
        tx.write_all(&wf.marshal_to_bytes(Some(&KeepAliveInfo::default())).unwrap())
            .await
            .unwrap();
        tx.write_all(&wf.marshal_to_bytes(None).unwrap()).await.unwrap();
        tx.write_all(&wf.marshal_to_bytes(Some(&ShutdownInfo::default())).unwrap())
            .await
            .unwrap();
        drop(tx);

        let mut reader = CommandReader::new(rx);
        let first = reader.next_command(&wf).await.unwrap().unwrap();
        assert_eq!(first.data_structure_type(), types::KEEP_ALIVE_INFO);
        let second = reader.next_command(&wf).await.unwrap().unwrap();
        assert_eq!(second.data_structure_type(), types::SHUTDOWN_INFO);
        assert!(reader.next_command(&wf).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_unprefixed_split_writes() {
        let wf = unprefixed_loose();
        let bytes = wf.marshal_to_bytes(Some(&KeepAliveInfo::default())).unwrap();
        let (mut tx, rx) = duplex(4096);

        let writer = tokio::spawn(async move {
            for byte in bytes.iter() {
                tx.write_all(&[*byte]).await.unwrap();
                tx.flush().await.unwrap();
            }
        });

        let mut reader = CommandReader::new(rx);
        let command = reader.next_command(&wf).await.unwrap().unwrap();
        assert_eq!(command.data_structure_type(), types::KEEP_ALIVE_INFO);
        writer.await.unwrap();
        assert!(reader.next_command(&wf).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let wf = WireFormat::default();
        let bytes = wf.marshal_to_bytes(Some(&KeepAliveInfo::default())).unwrap();
        let (mut tx, rx) = duplex(4096);
        tx.write_all(&bytes[..bytes.len() - 1]).await.unwrap();
        drop(tx);

        let mut reader = CommandReader::new(rx);
        assert!(matches!(
            reader.next_command(&wf).await,
            Err(OpenWireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_type_is_error() {
        let wf = WireFormat::default();
        let (mut tx, rx) = duplex(64);
        tx.write_all(&[0, 0, 0, 1, 200]).await.unwrap();
        drop(tx);

        let mut reader = CommandReader::new(rx);
        assert!(matches!(
            reader.next_command(&wf).await,
            Err(OpenWireError::UnknownDataType(200))
        ));
    }

    #[tokio::test]
    async fn test_oversized_prefixed_frame() {
        let wf = WireFormat::default();
        let (mut tx, rx) = duplex(64);
        tx.write_all(&4096i32.to_be_bytes()).await.unwrap();
        drop(tx);

        let mut reader = CommandReader::with_max_frame_size(rx, 1024);
        assert!(matches!(
            reader.next_command(&wf).await,
            Err(OpenWireError::Protocol(_))
        ));
    }
}
