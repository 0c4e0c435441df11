//! Telephony bridge between a host and a baseband modem.
//!
//! The host speaks in requests and tokens; the baseband speaks in framed
//! binary messages over a serial FIFO. This crate re-exports the layers that
//! connect the two.
//!
//! # Crate Structure
//!
//! - [`transport`]: modem stream over a raw tty or a Unix socket
//! - [`frame`]: magic-checked framing with fragmentation of large messages
//! - [`call`]: call registry, state machine, link and receive dispatcher
//!   (behind the `call` feature)

/// Re-export transport types.
pub mod transport {
    pub use rilbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rilbridge_frame::*;
}

/// Re-export call-control types (requires `call` feature).
#[cfg(feature = "call")]
pub mod call {
    pub use rilbridge_call::*;
}
