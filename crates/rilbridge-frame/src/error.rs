/// Errors that can occur during frame encoding/decoding and reassembly.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer than a full header's worth of bytes arrived before the stream ran dry.
    #[error("short frame header ({got} of {expected} bytes)")]
    ShortHeader { got: usize, expected: usize },

    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic {found:#010x} (expected 0xcafecafe)")]
    BadMagic { found: u32 },

    /// The declared payload could not be fully read.
    #[error("short frame payload ({got} of {expected} bytes)")]
    ShortPayload { got: usize, expected: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A fragmented transfer broke the reassembly rules.
    #[error("fragmentation protocol violation: {0}")]
    ProtocolViolation(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a frame started.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the link survives this error.
    ///
    /// Recoverable errors mean "no message this cycle": the offending bytes are
    /// discarded and the receiver keeps going. Everything else is a link failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::ShortHeader { .. }
                | FrameError::BadMagic { .. }
                | FrameError::ShortPayload { .. }
                | FrameError::ProtocolViolation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
