use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, decode_header, Frame, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// A header or payload cut short by end-of-stream is reported as
/// [`FrameError::ShortHeader`] / [`FrameError::ShortPayload`]; the bytes read
/// so far are discarded.
pub struct FrameReader<T> {
    inner: T,
    payload: BytesMut,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            payload: BytesMut::new(),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached before
    /// any header byte arrives.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; HEADER_SIZE];
        let got = read_full(&mut self.inner, &mut header)?;
        if got == 0 {
            return Err(FrameError::ConnectionClosed);
        }

        let fields = decode_header(&header[..got])?;

        self.payload.clear();
        self.payload.resize(fields.payload_len, 0);
        let got = read_full(&mut self.inner, &mut self.payload)?;

        let frame = decode_frame(&header, &self.payload[..got])?;
        trace!(
            command = frame.command,
            size = frame.payload.len(),
            "frame received"
        );
        Ok(frame)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Fill `buf` until it is full or the stream reports EOF.
fn read_full<T: Read>(inner: &mut T, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(filled)
}
