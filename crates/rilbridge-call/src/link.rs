//! Session tying the state machine to the baseband writer and the host.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use rilbridge_frame::{FrameError, Message, MessageWriter};
use tracing::{debug, error, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{CallError, Result};
use crate::host::Host;
use crate::machine::{Action, CallStateMachine, Request};
use crate::protocol::opcode_name;
use crate::types::Token;

struct Session<W> {
    machine: CallStateMachine,
    writer: MessageWriter<W>,
    host: Arc<dyn Host>,
}

/// Shared handle to one baseband link.
///
/// Clones share the same session. Requests and inbound messages are
/// serialized by one lock, held while the resulting commands are written.
pub struct Link<W> {
    session: Arc<Mutex<Session<W>>>,
}

impl<W> Clone for Link<W> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<W> fmt::Debug for Link<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

impl<W: Write> Link<W> {
    pub fn new(writer: W, host: Arc<dyn Host>, config: BridgeConfig) -> Self {
        let writer = MessageWriter::with_config(writer, config.frame.clone());
        Self {
            session: Arc::new(Mutex::new(Session {
                machine: CallStateMachine::new(config),
                writer,
                host,
            })),
        }
    }

    /// Handle a host request.
    ///
    /// The token is always resolved, now or by a later notification. An error
    /// means the link failed while writing the resulting commands.
    pub fn request(&self, token: Token, request: Request) -> Result<()> {
        let mut session = self.lock();
        let actions = session.machine.handle_request(token, request);
        session.execute(actions)
    }

    /// Handle one reassembled inbound message.
    pub fn handle_message(&self, message: &Message) -> Result<()> {
        let mut session = self.lock();
        let actions = session.machine.handle_message(message);
        session.execute(actions)
    }

    /// Fail every outstanding token and release every call.
    pub fn shutdown(&self) {
        let mut session = self.lock();
        let actions = session.machine.shutdown();
        if let Err(err) = session.execute(actions) {
            warn!(error = %err, "link shutdown");
        }
    }

    /// Inspect the state machine under the lock.
    pub fn with_machine<R>(&self, f: impl FnOnce(&CallStateMachine) -> R) -> R {
        f(&self.lock().machine)
    }

    fn lock(&self) -> MutexGuard<'_, Session<W>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write> Session<W> {
    /// Carry out actions in order.
    ///
    /// After a failed write the remaining commands are skipped, but
    /// completions and events are still delivered.
    fn execute(&mut self, actions: Vec<Action>) -> Result<()> {
        let mut failure: Option<FrameError> = None;
        for action in actions {
            match action {
                Action::Issue(command) => {
                    let name = opcode_name(command.opcode());
                    if failure.is_some() {
                        debug!(command = name, "skipping command after link failure");
                        continue;
                    }
                    match self.writer.send(&command.to_message()) {
                        Ok(frames) => trace!(command = name, frames, "command issued"),
                        Err(err) => {
                            error!(command = name, error = %err, "failed to issue command");
                            failure = Some(err);
                        }
                    }
                }
                Action::Settle(delay) => {
                    if failure.is_none() && !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Action::Complete {
                    token,
                    status,
                    response,
                } => {
                    debug!(%token, ?status, "completing request");
                    self.host.complete(token, status, response);
                }
                Action::Unsolicited(event) => {
                    debug!(?event, "unsolicited event");
                    self.host.emit_unsolicited(event);
                }
            }
        }
        match failure {
            Some(err) => Err(CallError::LinkFailure(err)),
            None => Ok(()),
        }
    }
}
