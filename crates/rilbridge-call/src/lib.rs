//! Call control for a baseband telephony bridge.
//!
//! Host requests come in through a [`Link`], which runs them through the
//! [`CallStateMachine`] and writes the resulting commands to the baseband.
//! A [`Dispatcher`] feeds baseband notifications into the same link; each
//! request token is resolved exactly once, either immediately or by the
//! notification that answers it.

pub mod config;
pub mod dispatcher;
pub mod dtmf;
pub mod error;
pub mod host;
pub mod link;
pub mod machine;
pub mod protocol;
pub mod registry;
pub mod roles;
pub mod types;

pub use config::{BridgeConfig, MAX_CALLS};
pub use dispatcher::{Cycle, Dispatcher};
pub use error::{CallError, Result};
pub use host::Host;
#[cfg(any(test, feature = "testing"))]
pub use host::{HostEvent, RecordingHost};
pub use link::Link;
pub use machine::{Action, CallStateMachine, Request};
pub use protocol::{Command, Notification};
pub use registry::{CallContext, CallRegistry, SlotId};
pub use types::{CallId, CallSnapshot, CallState, Event, Response, Status, Token};
