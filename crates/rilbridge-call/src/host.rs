#[cfg(any(test, feature = "testing"))]
use std::sync::{Mutex, PoisonError};

use crate::types::{Event, Response, Status, Token};

/// Upper boundary of the bridge: where completions and events go.
///
/// Callbacks run while the link lock is held. Implementations must not call
/// back into the same [`crate::link::Link`] from inside a callback.
pub trait Host: Send + Sync {
    /// Resolve a request token. Called exactly once per accepted token.
    fn complete(&self, token: Token, status: Status, response: Response);

    /// Raise an unsolicited event.
    fn emit_unsolicited(&self, event: Event);
}

/// Something the host was told.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Completed {
        token: Token,
        status: Status,
        response: Response,
    },
    Unsolicited(Event),
}

/// Host that records every callback in order.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<HostEvent> {
        self.lock().clone()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<HostEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Completion for `token`, if one was recorded.
    pub fn completion(&self, token: Token) -> Option<(Status, Response)> {
        self.lock().iter().find_map(|event| match event {
            HostEvent::Completed {
                token: t,
                status,
                response,
            } if *t == token => Some((*status, response.clone())),
            _ => None,
        })
    }

    /// How many times `token` was completed.
    pub fn completion_count(&self, token: Token) -> usize {
        self.lock()
            .iter()
            .filter(|event| matches!(event, HostEvent::Completed { token: t, .. } if *t == token))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<HostEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Host for RecordingHost {
    fn complete(&self, token: Token, status: Status, response: Response) {
        self.lock().push(HostEvent::Completed {
            token,
            status,
            response,
        });
    }

    fn emit_unsolicited(&self, event: Event) {
        self.lock().push(HostEvent::Unsolicited(event));
    }
}
