use crate::error::{CallError, Result};
use crate::types::{CallId, Token};

/// Continuous-tone DTMF bookkeeping.
///
/// Start and stop each allow one outstanding request. The currently playing
/// tone and the call it plays on are tracked so a new start can stop it first.
#[derive(Debug, Default)]
pub struct DtmfState {
    tone: Option<(CallId, u8)>,
    start_token: Option<Token>,
    stop_token: Option<Token>,
}

impl DtmfState {
    /// Tone currently playing, if any.
    pub fn active_tone(&self) -> Option<u8> {
        self.tone.map(|(_, tone)| tone)
    }

    /// Call the current tone plays on.
    pub fn tone_call(&self) -> Option<CallId> {
        self.tone.map(|(call_id, _)| call_id)
    }

    pub fn set_tone(&mut self, call_id: CallId, tone: u8) {
        self.tone = Some((call_id, tone));
    }

    pub fn clear_tone(&mut self) {
        self.tone = None;
    }

    /// Forget the tone if it plays on `call_id`.
    pub fn call_ended(&mut self, call_id: CallId) {
        if self.tone_call() == Some(call_id) {
            self.tone = None;
        }
    }

    pub fn attach_start(&mut self, token: Token) -> Result<()> {
        attach(&mut self.start_token, token, "start")
    }

    pub fn attach_stop(&mut self, token: Token) -> Result<()> {
        attach(&mut self.stop_token, token, "stop")
    }

    pub fn take_start(&mut self) -> Option<Token> {
        self.start_token.take()
    }

    pub fn take_stop(&mut self) -> Option<Token> {
        self.stop_token.take()
    }

    /// Forget the tone and return every outstanding token.
    pub fn drain(&mut self) -> Vec<Token> {
        self.tone = None;
        self.start_token
            .take()
            .into_iter()
            .chain(self.stop_token.take())
            .collect()
    }
}

fn attach(slot: &mut Option<Token>, token: Token, kind: &'static str) -> Result<()> {
    if slot.is_some() {
        return Err(CallError::DtmfBusy(kind));
    }
    *slot = Some(token);
    Ok(())
}

/// Whether `tone` is a valid DTMF digit (`0-9`, `*`, `#`, `A-D`).
pub fn is_valid_tone(tone: u8) -> bool {
    matches!(tone, b'0'..=b'9' | b'*' | b'#' | b'A'..=b'D' | b'a'..=b'd')
}
