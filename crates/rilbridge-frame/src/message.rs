use std::io::{Read, Write};

use bytes::Bytes;
use tracing::warn;

use crate::codec::FrameConfig;
use crate::error::Result;
use crate::fragment::{fragment, Reassembler};
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// A logical message exchanged with the baseband, possibly spanning frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message opcode.
    pub command: u16,
    /// Message body.
    pub data: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(command: u16, data: impl Into<Bytes>) -> Self {
        Self {
            command,
            data: data.into(),
        }
    }
}

/// Sends messages, fragmenting the ones that do not fit a single frame.
pub struct MessageWriter<T> {
    frames: FrameWriter<T>,
}

impl<T: Write> MessageWriter<T> {
    /// Create a message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a message writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            frames: FrameWriter::with_config(inner, config),
        }
    }

    /// Send one message (blocking). Returns the number of frames written.
    pub fn send(&mut self, message: &Message) -> Result<usize> {
        let frames = fragment(message, self.frames.config().fragment_size)?;
        for frame in &frames {
            self.frames.write_frame(frame)?;
        }
        Ok(frames.len())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.frames.get_ref()
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.frames.into_inner()
    }
}

/// Receives frames and reassembles them into messages.
pub struct MessageReader<T> {
    frames: FrameReader<T>,
    reassembler: Reassembler,
}

impl<T: Read> MessageReader<T> {
    /// Create a message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a message reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            frames: FrameReader::new(inner),
            reassembler: Reassembler::new(config.max_message_size),
        }
    }

    /// Read one frame and feed it to reassembly (blocking).
    ///
    /// - `Ok(Some(message))`: a complete message.
    /// - `Ok(None)`: the frame belonged to a transfer still in progress.
    /// - `Err(e)` with `e.is_recoverable()`: the frame was malformed and has been
    ///   dropped; any transfer in progress is discarded with it.
    /// - any other `Err`: the link is gone.
    pub fn receive_assembled(&mut self) -> Result<Option<Message>> {
        let frame = match self.frames.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                if err.is_recoverable() && !self.reassembler.is_idle() {
                    warn!(error = %err, "malformed frame inside fragmented transfer");
                    self.reassembler.reset();
                }
                return Err(err);
            }
        };
        self.reassembler.push(frame)
    }

    /// Whether no fragmented transfer is in progress.
    pub fn is_idle(&self) -> bool {
        self.reassembler.is_idle()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.frames.get_ref()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.frames.into_inner()
    }
}
