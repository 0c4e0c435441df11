use crate::types::CallId;

/// Errors that can occur in call handling.
///
/// Request-level variants never escape to the host as errors: the state
/// machine turns them into a generic-failure completion of the caller's token.
/// [`CallError::LinkFailure`] and [`CallError::Transport`] are fatal to the link.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Every call slot is occupied.
    #[error("call registry full ({capacity} slots)")]
    RegistryFull { capacity: usize },

    /// No call context matches the lookup.
    #[error("no call context for {0}")]
    ContextNotFound(String),

    /// The context already carries an unresolved request token.
    #[error("call {call_id} already has a pending request")]
    TokenConflict { call_id: CallId },

    /// A DTMF request of the same kind is still awaiting confirmation.
    #[error("a DTMF {0} request is already pending")]
    DtmfBusy(&'static str),

    /// An outgoing call setup is already in flight.
    #[error("an outgoing call setup is already in progress")]
    SetupInProgress,

    /// Another live context already owns this call id.
    #[error("call id {0} already in use")]
    DuplicateCallId(CallId),

    /// The request arguments are malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A baseband payload could not be decoded.
    #[error("malformed {name} payload ({len} bytes): {reason}")]
    MalformedPayload {
        name: &'static str,
        len: usize,
        reason: &'static str,
    },

    /// Writing to or reading from the baseband failed fatally.
    #[error("link failure: {0}")]
    LinkFailure(#[from] rilbridge_frame::FrameError),

    /// Transport-level error while waiting on the link.
    #[error("transport error: {0}")]
    Transport(#[from] rilbridge_transport::TransportError),
}

impl CallError {
    /// Whether the error ends the link rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CallError::LinkFailure(_) | CallError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
