use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::control::MAX_SINGLE_FRAME_DATA;
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` stream.
///
/// Every frame is encoded into one scratch buffer and pushed out with a single
/// write loop, so a frame never interleaves with another writer's bytes as long
/// as callers serialize access to the writer.
pub struct FrameWriter<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            scratch: BytesMut::with_capacity(HEADER_SIZE + MAX_SINGLE_FRAME_DATA),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.command, &frame.payload)
    }

    /// Encode `payload` under `command`, write it out and flush.
    pub fn send(&mut self, command: u16, payload: &[u8]) -> Result<()> {
        let max = self.config.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        self.scratch.clear();
        encode_frame(command, payload, &mut self.scratch)?;
        write_retrying(&mut self.inner, &self.scratch)?;
        flush_retrying(&mut self.inner)?;

        trace!(command, size = payload.len(), "frame sent");
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Write all of `bytes`, retrying interrupted and would-block writes.
fn write_retrying<T: Write>(inner: &mut T, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        match inner.write(bytes) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => bytes = &bytes[n..],
            Err(err) if is_transient(&err) => {}
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

fn flush_retrying<T: Write>(inner: &mut T) -> Result<()> {
    loop {
        match inner.flush() {
            Ok(()) => return Ok(()),
            Err(err) if is_transient(&err) => {}
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}
