//! Protocol module - byte-level I/O, flag packing, framing and the wire
//! format engine.
//!
//! - [`DataInput`]/[`DataOutput`]: big-endian scalars and modified UTF-8
//! - [`BooleanStream`]: packed presence flags of the tight encoding
//! - [`WireFormat`]: frame marshalling, nested objects and negotiation
//! - [`FrameBuffer`]: splitting size-prefixed frames out of a byte stream

mod boolean_stream;
mod data_io;
mod frame_buffer;
mod wire_format;

pub use boolean_stream::BooleanStream;
pub use data_io::{
    decode_modified_utf8, is_modified_ascii, modified_utf8_len, DataInput, DataOutput,
};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    WireFormat, WireFormatSettings, DEFAULT_MAX_FRAME_SIZE, DEFAULT_VERSION,
    MAX_SUPPORTED_VERSION, NULL_TYPE, SIZE_PREFIX_LEN,
};
