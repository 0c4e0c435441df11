//! Baseband FIFO framing with fragmentation of oversized messages.
//!
//! Every frame on the wire carries:
//! - A 4-byte little-endian magic number (0xCAFECAFE) for stream validation
//! - A 2-byte little-endian opcode
//! - A 2-byte little-endian payload length
//!
//! Messages larger than one frame travel as a control announcement plus data
//! frames and are stitched back together on receipt.

pub mod codec;
pub mod control;
pub mod error;
pub mod fragment;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, Frame, FrameConfig, FrameHeader,
    DEFAULT_MAX_MESSAGE, HEADER_SIZE, MAGIC, MAX_FRAME_PAYLOAD,
};
pub use control::{ControlDescriptor, FIFO_INTERNAL, MAX_SINGLE_FRAME_DATA};
pub use error::{FrameError, Result};
pub use fragment::{fragment, Reassembler};
pub use message::{Message, MessageReader, MessageWriter};
pub use reader::FrameReader;
pub use writer::FrameWriter;
