//! Outbound splitting and inbound stitching of oversized messages.
//!
//! [`fragment`] turns one [`Message`] into the frame sequence the baseband
//! expects; [`Reassembler`] mirrors it on the receive side. Every frame of a
//! fragmented transfer travels on [`FIFO_INTERNAL`]: the first carries the
//! [`ControlDescriptor`], the rest carry raw data until the announced length is
//! reached. Exactly one transfer may be in flight per connection.

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::codec::Frame;
use crate::control::{is_internal, ControlDescriptor, FIFO_INTERNAL};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Split a message into wire frames.
///
/// Data that fits in `fragment_size` yields exactly one frame under the
/// message opcode. Larger data yields one control frame followed by
/// `ceil(len / fragment_size)` data frames, all on [`FIFO_INTERNAL`].
pub fn fragment(message: &Message, fragment_size: usize) -> Result<Vec<Frame>> {
    let fragment_size = fragment_size.max(1);
    let len = message.data.len();
    if len <= fragment_size {
        return Ok(vec![Frame::new(message.command, message.data.clone())]);
    }

    let total_length = u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })?;
    let descriptor = ControlDescriptor::new(total_length, message.command);

    let mut frames = Vec::with_capacity(1 + len.div_ceil(fragment_size));
    frames.push(Frame::new(FIFO_INTERNAL, descriptor.encode()));
    frames.extend(
        (0..len)
            .step_by(fragment_size)
            .map(|offset| {
                let end = (offset + fragment_size).min(len);
                Frame::new(FIFO_INTERNAL, message.data.slice(offset..end))
            }),
    );

    debug!(
        command = message.command,
        total_length,
        frames = frames.len(),
        "fragmented oversized message"
    );
    Ok(frames)
}

#[derive(Debug)]
struct PartialTransfer {
    command: u16,
    total: usize,
    buffer: BytesMut,
}

/// Reassembles inbound frames into messages.
#[derive(Debug)]
pub struct Reassembler {
    partial: Option<PartialTransfer>,
    max_message_size: usize,
}

impl Reassembler {
    /// Create a reassembler that refuses transfers above `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            partial: None,
            max_message_size,
        }
    }

    /// Whether no fragmented transfer is in progress.
    pub fn is_idle(&self) -> bool {
        self.partial.is_none()
    }

    /// Discard any partial transfer.
    pub fn reset(&mut self) {
        if let Some(partial) = self.partial.take() {
            warn!(
                command = partial.command,
                received = partial.buffer.len(),
                total = partial.total,
                "discarding partial transfer"
            );
        }
    }

    /// Feed one frame.
    ///
    /// Returns `Ok(Some(message))` when a message is complete, `Ok(None)` when
    /// the frame was absorbed into a transfer still in progress.
    ///
    /// While a transfer is open, internal frames are data. A regular frame
    /// arriving mid-transfer aborts the transfer and is delivered on its own.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match (is_internal(frame.command), self.partial.is_some()) {
            (true, false) => self.begin(&frame.payload),
            (true, true) => self.absorb(&frame.payload),
            (false, interrupted) => {
                if interrupted {
                    self.reset();
                }
                Ok(Some(Message::new(frame.command, frame.payload)))
            }
        }
    }

    fn begin(&mut self, payload: &Bytes) -> Result<Option<Message>> {
        let descriptor = ControlDescriptor::decode(payload)?;

        let total = descriptor.total_length as usize;
        if total == 0 || total > self.max_message_size {
            return Err(violation(format!(
                "announced transfer of {total} bytes (max {})",
                self.max_message_size
            )));
        }
        let command = match u16::try_from(descriptor.original_command) {
            Ok(command) if !is_internal(command) => command,
            _ => {
                return Err(violation(format!(
                    "announced opcode {:#x} is not a message opcode",
                    descriptor.original_command
                )))
            }
        };

        self.partial = Some(PartialTransfer {
            command,
            total,
            buffer: BytesMut::with_capacity(total),
        });
        Ok(None)
    }

    fn absorb(&mut self, payload: &Bytes) -> Result<Option<Message>> {
        let Some(mut partial) = self.partial.take() else {
            return Err(violation("data frame outside a transfer".into()));
        };

        let received = partial.buffer.len() + payload.len();
        if received > partial.total {
            return Err(violation(format!(
                "transfer of {:#06x} overrun ({received} of {} bytes)",
                partial.command, partial.total
            )));
        }

        partial.buffer.extend_from_slice(payload);
        if received < partial.total {
            self.partial = Some(partial);
            return Ok(None);
        }

        debug!(
            command = partial.command,
            total = partial.total,
            "reassembled fragmented message"
        );
        Ok(Some(Message::new(partial.command, partial.buffer.freeze())))
    }
}

fn violation(reason: String) -> FrameError {
    FrameError::ProtocolViolation(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_MAX_MESSAGE;
    use crate::control::MAX_SINGLE_FRAME_DATA;

    fn pattern(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
    }

    fn reassemble(frames: Vec<Frame>) -> Vec<Message> {
        let mut reassembler = Reassembler::new(DEFAULT_MAX_MESSAGE);
        frames
            .into_iter()
            .filter_map(|frame| reassembler.push(frame).unwrap())
            .collect()
    }

    #[test]
    fn small_message_is_single_frame() {
        let message = Message::new(0x0101, pattern(MAX_SINGLE_FRAME_DATA));
        let frames = fragment(&message, MAX_SINGLE_FRAME_DATA).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, 0x0101);
        assert_eq!(reassemble(frames), vec![message]);
    }

    #[test]
    fn oversized_message_travels_entirely_on_internal_opcode() {
        for len in [MAX_SINGLE_FRAME_DATA + 1, 2 * MAX_SINGLE_FRAME_DATA, 3 * MAX_SINGLE_FRAME_DATA + 17] {
            let message = Message::new(0x0181, pattern(len));
            let frames = fragment(&message, MAX_SINGLE_FRAME_DATA).unwrap();

            assert_eq!(frames.len(), 1 + len.div_ceil(MAX_SINGLE_FRAME_DATA));
            assert!(frames.iter().all(|frame| frame.command == FIFO_INTERNAL));

            let descriptor = ControlDescriptor::decode(&frames[0].payload).unwrap();
            assert_eq!(descriptor.total_length as usize, len);
            assert_eq!(descriptor.original_command, 0x0181);

            let last = frames.last().unwrap();
            let expected_tail = match len % MAX_SINGLE_FRAME_DATA {
                0 => MAX_SINGLE_FRAME_DATA,
                rem => rem,
            };
            assert_eq!(last.payload.len(), expected_tail);

            assert_eq!(reassemble(frames), vec![message]);
        }
    }

    #[test]
    fn baseband_style_transfer_reassembles() {
        // Control frame, then raw data frames on 0x0001, as the modem sends them.
        let data = pattern(0x100A);
        let frames = vec![
            Frame::new(0x0001, ControlDescriptor::new(0x100A, 0x0181).encode()),
            Frame::new(0x0001, data.slice(..0x1000)),
            Frame::new(0x0001, data.slice(0x1000..)),
        ];
        let mut reassembler = Reassembler::new(DEFAULT_MAX_MESSAGE);
        let mut frames = frames.into_iter();

        assert!(reassembler.push(frames.next().unwrap()).unwrap().is_none());
        assert!(reassembler.push(frames.next().unwrap()).unwrap().is_none());
        let done = reassembler.push(frames.next().unwrap()).unwrap();
        assert_eq!(done, Some(Message::new(0x0181, data)));
        assert!(reassembler.is_idle());
    }

    #[test]
    fn data_frame_shaped_like_a_descriptor_is_still_data() {
        let descriptor_bytes = ControlDescriptor::new(4, 0x0182).encode();
        let mut reassembler = Reassembler::new(DEFAULT_MAX_MESSAGE);
        reassembler
            .push(Frame::new(FIFO_INTERNAL, ControlDescriptor::new(16, 0x0181).encode()))
            .unwrap();

        assert!(reassembler
            .push(Frame::new(FIFO_INTERNAL, descriptor_bytes.clone()))
            .unwrap()
            .is_none());
        let done = reassembler.push(Frame::new(FIFO_INTERNAL, "tail")).unwrap();

        let mut expected = descriptor_bytes.to_vec();
        expected.extend_from_slice(b"tail");
        assert_eq!(done, Some(Message::new(0x0181, expected)));
    }

    #[test]
    fn overrun_resets_transfer() {
        let mut reassembler = Reassembler::new(DEFAULT_MAX_MESSAGE);
        let descriptor = ControlDescriptor::new(4, 0x0181);
        reassembler.push(Frame::new(FIFO_INTERNAL, descriptor.encode())).unwrap();

        let err = reassembler.push(Frame::new(FIFO_INTERNAL, "too long")).unwrap_err();
        assert!(matches!(err, FrameError::ProtocolViolation(_)));
        assert!(reassembler.is_idle());
    }

    #[test]
    fn regular_frame_mid_transfer_aborts_it_and_passes_through() {
        let mut reassembler = Reassembler::new(DEFAULT_MAX_MESSAGE);
        let descriptor = ControlDescriptor::new(8, 0x0181);
        reassembler.push(Frame::new(FIFO_INTERNAL, descriptor.encode())).unwrap();
        reassembler.push(Frame::new(FIFO_INTERNAL, "abcd")).unwrap();

        let passthrough = reassembler.push(Frame::new(0x0185, "x")).unwrap();
        assert_eq!(passthrough, Some(Message::new(0x0185, "x")));
        assert!(reassembler.is_idle());
    }

    #[test]
    fn bad_announcements_are_rejected() {
        let mut reassembler = Reassembler::new(16);

        let empty = ControlDescriptor::new(0, 0x0181).encode();
        assert!(reassembler.push(Frame::new(FIFO_INTERNAL, empty)).is_err());

        let huge = ControlDescriptor::new(17, 0x0181).encode();
        assert!(reassembler.push(Frame::new(FIFO_INTERNAL, huge)).is_err());

        let nested = ControlDescriptor::new(8, FIFO_INTERNAL).encode();
        assert!(reassembler.push(Frame::new(FIFO_INTERNAL, nested)).is_err());

        assert!(reassembler.push(Frame::new(FIFO_INTERNAL, "not a descriptor")).is_err());

        assert!(reassembler.is_idle());
    }
}
