//! Byte-stream transport to a cellular baseband.
//!
//! Provides a unified stream over the link mechanisms used to reach a modem:
//! - a raw tty device node (serial/DPRAM bridge)
//! - a connected Unix socket pair (baseband simulation and tests)
//!
//! This is the lowest layer of rilbridge. Everything else builds on top of
//! the [`ModemStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tty;

pub use error::{Result, TransportError};
pub use stream::{ModemStream, WaitReadable};
pub use tty::open_raw_tty;
