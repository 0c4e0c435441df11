//! Values exchanged with the host: tokens, call ids, states and completions.

use std::fmt;

use serde::Serialize;

/// Default cause reported before any call has ended (normal clearing).
pub const CALL_FAIL_NORMAL: u32 = 16;

/// Longest number kept for a call, in bytes. Longer dial strings are rejected;
/// longer remote numbers are cut.
pub const MAX_NUMBER_LEN: usize = 82;

/// Type-of-address for international numbers (leading `+`).
pub const TOA_INTERNATIONAL: u8 = 145;

/// Type-of-address for everything else.
pub const TOA_UNKNOWN: u8 = 129;

/// Opaque host correlation handle for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Baseband call identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CallId(pub u32);

impl CallId {
    /// Placeholder carried by an outgoing call until the baseband assigns an id.
    pub const PENDING: CallId = CallId(0xFFFF_FFFF);

    /// Whether the baseband has not assigned an id yet.
    pub fn is_pending(self) -> bool {
        self == Self::PENDING
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pending() {
            f.write_str("pending")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Lifecycle state of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
}

impl CallState {
    /// Numeric state code used in call-list responses.
    pub fn code(self) -> u8 {
        match self {
            CallState::Active => 0,
            CallState::Holding => 1,
            CallState::Dialing => 2,
            CallState::Alerting => 3,
            CallState::Incoming => 4,
            CallState::Waiting => 5,
        }
    }

    /// Lowercase display name.
    pub fn as_str(self) -> &'static str {
        match self {
            CallState::Active => "active",
            CallState::Holding => "holding",
            CallState::Dialing => "dialing",
            CallState::Alerting => "alerting",
            CallState::Incoming => "incoming",
            CallState::Waiting => "waiting",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    GenericFailure,
}

impl Status {
    /// `Success` when `ok`, otherwise `GenericFailure`.
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            Status::Success
        } else {
            Status::GenericFailure
        }
    }
}

/// Unsolicited notification raised to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// A new call is ringing.
    CallRing,
    /// The host should re-query the call list.
    CallStateChanged,
}

/// Payload attached to a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    None,
    Calls(Vec<CallSnapshot>),
    FailCause(u32),
}

/// One entry of a current-calls response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    /// 1-based registry position; also the hangup index.
    pub index: usize,
    pub call_id: CallId,
    pub state: CallState,
    /// Type of address, 145 or 129.
    pub toa: u8,
    pub mobile_terminated: bool,
    pub number: String,
    /// 0 when the number is presented, 2 when it is unknown.
    pub number_presentation: u8,
}

/// Type of address for a dial string.
pub fn type_of_address(number: &str) -> u8 {
    if number.starts_with('+') {
        TOA_INTERNATIONAL
    } else {
        TOA_UNKNOWN
    }
}

/// Cut `number` to at most [`MAX_NUMBER_LEN`] bytes on a char boundary.
///
/// Returns true if anything was removed.
pub fn bound_number(number: &mut String) -> bool {
    if number.len() <= MAX_NUMBER_LEN {
        return false;
    }
    let cut = (0..=MAX_NUMBER_LEN)
        .rev()
        .find(|&i| number.is_char_boundary(i))
        .unwrap_or(0);
    number.truncate(cut);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_number_cuts_long_numbers_only() {
        let mut short = "+4930123".to_string();
        assert!(!bound_number(&mut short));
        assert_eq!(short, "+4930123");

        let mut long = "1".repeat(MAX_NUMBER_LEN - 1) + "éé";
        assert!(bound_number(&mut long));
        assert_eq!(long, "1".repeat(MAX_NUMBER_LEN - 1));
    }

    #[test]
    fn state_codes_follow_call_list_numbering() {
        let codes: Vec<u8> = [
            CallState::Active,
            CallState::Holding,
            CallState::Dialing,
            CallState::Alerting,
            CallState::Incoming,
            CallState::Waiting,
        ]
        .iter()
        .map(|s| s.code())
        .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn pending_call_id_displays_as_pending() {
        assert!(CallId::PENDING.is_pending());
        assert_eq!(CallId::PENDING.to_string(), "pending");
        assert_eq!(CallId(7).to_string(), "7");
    }

    #[test]
    fn toa_depends_on_leading_plus() {
        assert_eq!(type_of_address("+15551234"), TOA_INTERNATIONAL);
        assert_eq!(type_of_address("5551234"), TOA_UNKNOWN);
        assert_eq!(type_of_address(""), TOA_UNKNOWN);
    }

    #[test]
    fn snapshot_serializes_with_snake_case_state() {
        let snapshot = CallSnapshot {
            index: 1,
            call_id: CallId(3),
            state: CallState::Holding,
            toa: TOA_UNKNOWN,
            mobile_terminated: true,
            number: "5551234".into(),
            number_presentation: 0,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "holding");
        assert_eq!(json["call_id"], 3);
        assert_eq!(json["index"], 1);
    }

    #[test]
    fn response_variants_serialize_externally_tagged() {
        let json = serde_json::to_value(Response::FailCause(16)).unwrap();
        assert_eq!(json, serde_json::json!({ "fail_cause": 16 }));
        assert_eq!(serde_json::to_value(Response::None).unwrap(), "none");
    }
}
