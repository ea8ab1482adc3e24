//! Inbound byte accumulator that cuts size-prefixed OpenWire frames.
//!
//! Uses `bytes::BytesMut` so extracted frames are zero-copy `Bytes`.
//! Size-prefixed frames go through a two-state machine:
//! - `WaitingForSize`: need the 4-byte size
//! - `WaitingForFrame`: size parsed, need N more bytes
//!
//! Unprefixed streams cannot be split without decoding; for those the
//! pending bytes are exposed through [`FrameBuffer::pending`] and consumed
//! with [`FrameBuffer::advance`] once a frame was decoded.
//!
//! # Example
//!
//! ```
//! use openwire_client::protocol::FrameBuffer;
//!
//! let mut inbound = FrameBuffer::new();
//! // one frame holding the null marker, then half of the next prefix
//! let cut = inbound.push(&[0, 0, 0, 1, 0, 0, 0]).unwrap();
//! assert_eq!(cut, vec![&[0u8][..]]);
//! assert_eq!(inbound.len(), 2);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use super::wire_format::{DEFAULT_MAX_FRAME_SIZE, SIZE_PREFIX_LEN};
use crate::error::{OpenWireError, Result};

const INITIAL_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForSize,
    WaitingForFrame { size: usize },
}

/// Accumulates inbound bytes and splits them into frames.
#[derive(Debug)]
pub struct FrameBuffer {
    inbound: BytesMut,
    state: State,
    max_frame_size: u32,
}

impl FrameBuffer {
    /// 64KB initial capacity, default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            inbound: BytesMut::with_capacity(INITIAL_CAPACITY),
            state: State::WaitingForSize,
            max_frame_size,
        }
    }

    /// Append `data` and extract every complete size-prefixed frame.
    ///
    /// Returned frames exclude the size prefix. Partial data stays buffered
    /// for the next push.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.inbound.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Extract one size-prefixed frame from the buffered bytes.
    ///
    /// Returns `Ok(None)` if more data is needed, and an error if the
    /// announced size is invalid or above the maximum.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForSize => {
                    if self.inbound.len() < SIZE_PREFIX_LEN {
                        return Ok(None);
                    }
                    let size = (&self.inbound[..SIZE_PREFIX_LEN]).get_i32();
                    if size < 1 {
                        return Err(OpenWireError::Protocol(format!(
                            "Invalid frame size: {size}"
                        )));
                    }
                    if size as u32 > self.max_frame_size {
                        warn!(size, max = self.max_frame_size, "Inbound frame exceeds maximum size");
                        return Err(OpenWireError::Protocol(format!(
                            "Frame size of {size} exceeds maximum {}",
                            self.max_frame_size
                        )));
                    }
                    self.inbound.advance(SIZE_PREFIX_LEN);
                    self.state = State::WaitingForFrame {
                        size: size as usize,
                    };
                }
                State::WaitingForFrame { size } => {
                    if self.inbound.len() < size {
                        return Ok(None);
                    }
                    let frame = self.inbound.split_to(size).freeze();
                    self.state = State::WaitingForSize;
                    return Ok(Some(frame));
                }
            }
        }
    }

    /// Buffer `bytes` without cutting frames.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.inbound.put_slice(bytes);
    }

    /// Buffered bytes not yet consumed.
    ///
    /// Only meaningful between frames, when no size has been parsed.
    pub fn pending(&self) -> &[u8] {
        &self.inbound
    }

    /// Drop `n` bytes decoded from [`pending`](Self::pending).
    pub fn advance(&mut self, n: usize) {
        self.inbound.advance(n.min(self.inbound.len()));
    }

    /// True if a size prefix was read and its frame is still incomplete.
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, State::WaitingForFrame { .. })
    }

    pub fn len(&self) -> usize {
        self.inbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty()
    }

    /// Drop everything buffered, including a half-read frame.
    pub fn clear(&mut self) {
        self.inbound.clear();
        self.state = State::WaitingForSize;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
