//! Receive loop: wait, read, reassemble, hand to the link.

use std::convert::Infallible;
use std::io::{Read, Write};

use rilbridge_frame::{FrameConfig, FrameError, MessageReader};
use rilbridge_transport::WaitReadable;
use tracing::{debug, error, info, warn};

use crate::error::{CallError, Result};
use crate::link::Link;

/// Outcome of one receive cycle.
#[derive(Debug)]
pub enum Cycle {
    /// A complete message was handled.
    Handled,
    /// A fragment was absorbed; the message is not complete yet.
    Partial,
    /// A malformed frame was dropped.
    Dropped(FrameError),
}

/// Drives inbound traffic from the baseband into a [`Link`].
///
/// Blocking waits and reads happen without the link lock held, so requests
/// can proceed while the dispatcher is idle.
pub struct Dispatcher<R, W> {
    reader: MessageReader<R>,
    link: Link<W>,
}

impl<R: Read + WaitReadable, W: Write> Dispatcher<R, W> {
    pub fn new(reader: R, link: Link<W>) -> Self {
        Self::with_config(reader, link, FrameConfig::default())
    }

    pub fn with_config(reader: R, link: Link<W>, config: FrameConfig) -> Self {
        Self {
            reader: MessageReader::with_config(reader, config),
            link,
        }
    }

    /// Wait for data and process one frame.
    ///
    /// Errors are fatal to the link; malformed input is reported as
    /// [`Cycle::Dropped`] instead.
    pub fn run_once(&mut self) -> Result<Cycle> {
        self.reader.get_ref().wait_readable()?;
        match self.reader.receive_assembled() {
            Ok(Some(message)) => {
                self.link.handle_message(&message)?;
                Ok(Cycle::Handled)
            }
            Ok(None) => Ok(Cycle::Partial),
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "dropping malformed frame");
                Ok(Cycle::Dropped(err))
            }
            Err(err) => Err(CallError::LinkFailure(err)),
        }
    }

    /// Run until the link fails.
    pub fn run(&mut self) -> Result<Infallible> {
        info!("dispatcher started");
        let mut dropped = 0u64;
        loop {
            match self.run_once() {
                Ok(Cycle::Dropped(_)) => dropped += 1,
                Ok(cycle) => debug!(?cycle, "receive cycle"),
                Err(err) => {
                    error!(error = %err, dropped, "dispatcher stopped");
                    return Err(err);
                }
            }
        }
    }

    pub fn link(&self) -> &Link<W> {
        &self.link
    }
}
