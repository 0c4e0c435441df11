use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::control::MAX_SINGLE_FRAME_DATA;
use crate::error::{FrameError, Result};

/// Frame header: magic (4) + command (2) + length (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic sentinel marking a valid frame.
pub const MAGIC: u32 = 0xCAFE_CAFE;

/// Largest payload the 16-bit length field can describe.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Default upper bound for a reassembled message: 1 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 1024 * 1024;

/// A single wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Opcode; meaning depends on direction and context.
    pub command: u16,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: u16,
    pub payload_len: usize,
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────┐
/// │ Magic (4B)   │ Command   │ Length   │ Payload          │
/// │ 0xCAFECAFE   │ (2B LE)   │ (2B LE)  │ (Length bytes)   │
/// └──────────────┴───────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(command: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(MAGIC);
    dst.put_u16_le(command);
    dst.put_u16_le(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Decode and validate a frame header.
pub fn decode_header(mut src: &[u8]) -> Result<FrameHeader> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::ShortHeader {
            got: src.len(),
            expected: HEADER_SIZE,
        });
    }

    let magic = src.get_u32_le();
    if magic != MAGIC {
        return Err(FrameError::BadMagic { found: magic });
    }

    let command = src.get_u16_le();
    let payload_len = usize::from(src.get_u16_le());
    Ok(FrameHeader {
        command,
        payload_len,
    })
}

/// Decode a frame from its header bytes and the payload bytes read after it.
///
/// Only the first `payload_length` bytes of `payload` belong to the frame.
pub fn decode_frame(header: &[u8], payload: &[u8]) -> Result<Frame> {
    let header = decode_header(header)?;
    if payload.len() < header.payload_len {
        return Err(FrameError::ShortPayload {
            got: payload.len(),
            expected: header.payload_len,
        });
    }

    Ok(Frame {
        command: header.command,
        payload: Bytes::copy_from_slice(&payload[..header.payload_len]),
    })
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum single-frame payload accepted by the writer. Default: 0xFFFF.
    pub max_payload_size: usize,
    /// Data bytes per fragment for oversized messages. Default: 0x1000.
    pub fragment_size: usize,
    /// Maximum size of a reassembled inbound message. Default: 1 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_FRAME_PAYLOAD,
            fragment_size: MAX_SINGLE_FRAME_DATA,
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}
