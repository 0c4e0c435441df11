use std::path::PathBuf;

/// Errors that can occur in modem transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the modem device node.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to switch the tty into raw mode.
    #[error("failed to configure {path} as raw tty: {source}")]
    Termios {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The descriptor reported hang-up or error while waiting for data.
    #[error("transport hung up (poll revents {revents:#x})")]
    HungUp { revents: i16 },
}

pub type Result<T> = std::result::Result<T, TransportError>;
