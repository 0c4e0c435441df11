//! Internal FIFO commands and the fragmentation control descriptor.
//!
//! A message whose data exceeds [`MAX_SINGLE_FRAME_DATA`] is announced by one
//! frame on [`FIFO_INTERNAL`] carrying a 12-byte [`ControlDescriptor`], followed
//! by the data frames themselves, also on [`FIFO_INTERNAL`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Opcode reserved for link-internal frames (fragmentation announcements).
pub const FIFO_INTERNAL: u16 = 0x0001;

/// Largest payload carried by a single data frame.
pub const MAX_SINGLE_FRAME_DATA: usize = 0x1000;

/// `sub_command` value marking a fragmentation header.
pub const FRAGMENT_SUB_COMMAND: u8 = 0x02;

/// Size of the control descriptor payload.
pub const CONTROL_PAYLOAD_SIZE: usize = 12;

/// Returns true if the opcode is link-internal rather than a message opcode.
pub fn is_internal(command: u16) -> bool {
    command == FIFO_INTERNAL
}

/// Announces a forthcoming multi-frame transfer.
///
/// Layout (little-endian), padded like the baseband's C struct:
/// ```text
/// ┌────────────┬──────────┬──────────────┬──────────────────┐
/// │ sub (1B)   │ pad (3B) │ total (4B)   │ command (4B)     │
/// │ 0x02       │ zero     │ data bytes   │ original opcode  │
/// └────────────┴──────────┴──────────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlDescriptor {
    /// Bytes of real payload that follow across all subsequent frames.
    pub total_length: u32,
    /// Opcode the reassembled message carries.
    pub original_command: u32,
}

impl ControlDescriptor {
    pub fn new(total_length: u32, original_command: u16) -> Self {
        Self {
            total_length,
            original_command: u32::from(original_command),
        }
    }

    /// Encode into the 12-byte wire payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CONTROL_PAYLOAD_SIZE);
        buf.put_u8(FRAGMENT_SUB_COMMAND);
        buf.put_bytes(0, 3);
        buf.put_u32_le(self.total_length);
        buf.put_u32_le(self.original_command);
        buf.freeze()
    }

    /// Decode from a control frame payload.
    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.len() != CONTROL_PAYLOAD_SIZE {
            return Err(FrameError::ProtocolViolation(format!(
                "control payload is {} bytes, expected {CONTROL_PAYLOAD_SIZE}",
                payload.len()
            )));
        }

        let sub_command = payload.get_u8();
        if sub_command != FRAGMENT_SUB_COMMAND {
            return Err(FrameError::ProtocolViolation(format!(
                "unexpected control sub-command {sub_command:#04x}"
            )));
        }
        payload.advance(3);

        Ok(Self {
            total_length: payload.get_u32_le(),
            original_command: payload.get_u32_le(),
        })
    }
}
