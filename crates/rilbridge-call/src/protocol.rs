//! Call-control opcodes and payload layouts.
//!
//! All integers are little-endian `u32` unless noted. Dial strings travel
//! NUL-terminated; inbound numbers are read up to the first NUL or the end of
//! the payload and cut to [`MAX_NUMBER_LEN`] bytes.

use bytes::{Buf, BufMut, BytesMut};
use rilbridge_frame::Message;
use tracing::warn;

use crate::error::{CallError, Result};
use crate::types::{bound_number, CallId, MAX_NUMBER_LEN};

pub const SETUP: u16 = 0x0101;
pub const RELEASE: u16 = 0x0102;
pub const ANSWER: u16 = 0x0103;
pub const HOLD: u16 = 0x0104;
pub const ACTIVATE: u16 = 0x0105;
pub const SWAP: u16 = 0x0106;
pub const DTMF_START: u16 = 0x0107;
pub const DTMF_STOP: u16 = 0x0108;

pub const INCOMING_IND: u16 = 0x0181;
pub const END_IND: u16 = 0x0182;
pub const SETUP_IND: u16 = 0x0183;
pub const ALERT_IND: u16 = 0x0184;
pub const CONNECTED_IND: u16 = 0x0185;
pub const HOLD_CNF: u16 = 0x0186;
pub const ACTIVATE_CNF: u16 = 0x0187;
pub const SWAP_CNF: u16 = 0x0188;
pub const ERROR_IND: u16 = 0x0189;
pub const DTMF_START_CNF: u16 = 0x018A;
pub const DTMF_STOP_CNF: u16 = 0x018B;

/// Call type for voice calls.
pub const CALL_TYPE_VOICE: u32 = 0;

/// Human-readable name for an opcode.
pub fn opcode_name(opcode: u16) -> &'static str {
    match opcode {
        rilbridge_frame::FIFO_INTERNAL => "fifo-internal",
        SETUP => "setup",
        RELEASE => "release",
        ANSWER => "answer",
        HOLD => "hold",
        ACTIVATE => "activate",
        SWAP => "swap",
        DTMF_START => "dtmf-start",
        DTMF_STOP => "dtmf-stop",
        INCOMING_IND => "incoming",
        END_IND => "end",
        SETUP_IND => "setup-ind",
        ALERT_IND => "alert",
        CONNECTED_IND => "connected",
        HOLD_CNF => "hold-cnf",
        ACTIVATE_CNF => "activate-cnf",
        SWAP_CNF => "swap-cnf",
        ERROR_IND => "error",
        DTMF_START_CNF => "dtmf-start-cnf",
        DTMF_STOP_CNF => "dtmf-stop-cnf",
        _ => "unknown",
    }
}

/// Outbound call-control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Setup {
        call_type: u32,
        clir: u32,
        number: String,
    },
    Release {
        call_type: u32,
        call_id: CallId,
        cause: u32,
    },
    Answer {
        call_type: u32,
        call_id: CallId,
    },
    Hold {
        call_id: CallId,
    },
    Activate {
        call_id: CallId,
    },
    Swap {
        active: CallId,
        held: CallId,
    },
    DtmfStart {
        call_id: CallId,
        tone: u8,
    },
    DtmfStop {
        call_id: CallId,
    },
}

impl Command {
    /// Opcode this command travels under.
    pub fn opcode(&self) -> u16 {
        match self {
            Command::Setup { .. } => SETUP,
            Command::Release { .. } => RELEASE,
            Command::Answer { .. } => ANSWER,
            Command::Hold { .. } => HOLD,
            Command::Activate { .. } => ACTIVATE,
            Command::Swap { .. } => SWAP,
            Command::DtmfStart { .. } => DTMF_START,
            Command::DtmfStop { .. } => DTMF_STOP,
        }
    }

    /// Encode into a message ready for the link.
    pub fn to_message(&self) -> Message {
        let mut buf = BytesMut::new();
        match self {
            Command::Setup {
                call_type,
                clir,
                number,
            } => {
                buf.put_u32_le(*call_type);
                buf.put_u32_le(*clir);
                buf.put_slice(number.as_bytes());
                buf.put_u8(0);
            }
            Command::Release {
                call_type,
                call_id,
                cause,
            } => {
                buf.put_u32_le(*call_type);
                buf.put_u32_le(call_id.0);
                buf.put_u32_le(*cause);
            }
            Command::Answer { call_type, call_id } => {
                buf.put_u32_le(*call_type);
                buf.put_u32_le(call_id.0);
            }
            Command::Hold { call_id } | Command::Activate { call_id } => {
                buf.put_u32_le(call_id.0);
            }
            Command::Swap { active, held } => {
                buf.put_u32_le(active.0);
                buf.put_u32_le(held.0);
            }
            Command::DtmfStart { call_id, tone } => {
                buf.put_u32_le(call_id.0);
                buf.put_u8(*tone);
            }
            Command::DtmfStop { call_id } => {
                buf.put_u32_le(call_id.0);
            }
        }
        Message::new(self.opcode(), buf.freeze())
    }

    /// Decode a command message. `Ok(None)` for opcodes that are not commands.
    pub fn decode(message: &Message) -> Result<Option<Self>> {
        let mut p = Payload::new(message);
        let command = match message.command {
            SETUP => Command::Setup {
                call_type: p.u32()?,
                clir: p.u32()?,
                number: p.number(),
            },
            RELEASE => Command::Release {
                call_type: p.u32()?,
                call_id: p.call_id()?,
                cause: p.u32()?,
            },
            ANSWER => Command::Answer {
                call_type: p.u32()?,
                call_id: p.call_id()?,
            },
            HOLD => Command::Hold {
                call_id: p.call_id()?,
            },
            ACTIVATE => Command::Activate {
                call_id: p.call_id()?,
            },
            SWAP => Command::Swap {
                active: p.call_id()?,
                held: p.call_id()?,
            },
            DTMF_START => Command::DtmfStart {
                call_id: p.call_id()?,
                tone: p.u8()?,
            },
            DTMF_STOP => Command::DtmfStop {
                call_id: p.call_id()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

/// Inbound baseband notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Incoming {
        call_id: CallId,
        call_type: u32,
        number: String,
    },
    End {
        call_id: CallId,
        cause: u32,
    },
    SetupInd {
        call_id: CallId,
    },
    Alert {
        call_id: CallId,
        audio_on: u32,
    },
    Connected {
        call_id: CallId,
    },
    HoldCnf {
        call_id: CallId,
        cause: u32,
    },
    ActivateCnf {
        call_id: CallId,
        cause: u32,
    },
    SwapCnf {
        activated: CallId,
        held: CallId,
        cause: u32,
    },
    Error {
        call_id: CallId,
        error: u32,
    },
    DtmfStartCnf {
        call_id: CallId,
        reason: u32,
    },
    DtmfStopCnf {
        call_id: CallId,
        reason: u32,
    },
}

impl Notification {
    /// Opcode this notification travels under.
    pub fn opcode(&self) -> u16 {
        match self {
            Notification::Incoming { .. } => INCOMING_IND,
            Notification::End { .. } => END_IND,
            Notification::SetupInd { .. } => SETUP_IND,
            Notification::Alert { .. } => ALERT_IND,
            Notification::Connected { .. } => CONNECTED_IND,
            Notification::HoldCnf { .. } => HOLD_CNF,
            Notification::ActivateCnf { .. } => ACTIVATE_CNF,
            Notification::SwapCnf { .. } => SWAP_CNF,
            Notification::Error { .. } => ERROR_IND,
            Notification::DtmfStartCnf { .. } => DTMF_START_CNF,
            Notification::DtmfStopCnf { .. } => DTMF_STOP_CNF,
        }
    }

    /// Decode a notification message. `Ok(None)` for unrecognised opcodes.
    pub fn decode(message: &Message) -> Result<Option<Self>> {
        let mut p = Payload::new(message);
        let notification = match message.command {
            INCOMING_IND => Notification::Incoming {
                call_id: p.call_id()?,
                call_type: p.u32()?,
                number: p.number(),
            },
            END_IND => Notification::End {
                call_id: p.call_id()?,
                cause: p.u32()?,
            },
            SETUP_IND => Notification::SetupInd {
                call_id: p.call_id()?,
            },
            ALERT_IND => Notification::Alert {
                call_id: p.call_id()?,
                audio_on: p.u32()?,
            },
            CONNECTED_IND => Notification::Connected {
                call_id: p.call_id()?,
            },
            HOLD_CNF => Notification::HoldCnf {
                call_id: p.call_id()?,
                cause: p.u32()?,
            },
            ACTIVATE_CNF => Notification::ActivateCnf {
                call_id: p.call_id()?,
                cause: p.u32()?,
            },
            SWAP_CNF => Notification::SwapCnf {
                activated: p.call_id()?,
                held: p.call_id()?,
                cause: p.u32()?,
            },
            ERROR_IND => Notification::Error {
                call_id: p.call_id()?,
                error: p.u32()?,
            },
            DTMF_START_CNF => Notification::DtmfStartCnf {
                call_id: p.call_id()?,
                reason: p.u32()?,
            },
            DTMF_STOP_CNF => Notification::DtmfStopCnf {
                call_id: p.call_id()?,
                reason: p.u32()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }

    /// Encode into a message, as the baseband would send it.
    pub fn to_message(&self) -> Message {
        let mut buf = BytesMut::new();
        match self {
            Notification::Incoming {
                call_id,
                call_type,
                number,
            } => {
                buf.put_u32_le(call_id.0);
                buf.put_u32_le(*call_type);
                buf.put_slice(number.as_bytes());
                buf.put_u8(0);
            }
            Notification::SetupInd { call_id } | Notification::Connected { call_id } => {
                buf.put_u32_le(call_id.0);
            }
            Notification::End {
                call_id,
                cause: value,
            }
            | Notification::Alert {
                call_id,
                audio_on: value,
            }
            | Notification::HoldCnf {
                call_id,
                cause: value,
            }
            | Notification::ActivateCnf {
                call_id,
                cause: value,
            }
            | Notification::Error {
                call_id,
                error: value,
            }
            | Notification::DtmfStartCnf {
                call_id,
                reason: value,
            }
            | Notification::DtmfStopCnf {
                call_id,
                reason: value,
            } => {
                buf.put_u32_le(call_id.0);
                buf.put_u32_le(*value);
            }
            Notification::SwapCnf {
                activated,
                held,
                cause,
            } => {
                buf.put_u32_le(activated.0);
                buf.put_u32_le(held.0);
                buf.put_u32_le(*cause);
            }
        }
        Message::new(self.opcode(), buf.freeze())
    }
}

/// Cursor over a message body that reports truncation as a decode error.
struct Payload<'a> {
    name: &'static str,
    len: usize,
    buf: &'a [u8],
}

impl<'a> Payload<'a> {
    fn new(message: &'a Message) -> Self {
        Self {
            name: opcode_name(message.command),
            len: message.data.len(),
            buf: message.data.as_ref(),
        }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(CallError::MalformedPayload {
                name: self.name,
                len: self.len,
                reason: "payload truncated",
            });
        }
        Ok(())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn call_id(&mut self) -> Result<CallId> {
        self.u32().map(CallId)
    }

    /// Rest of the payload up to the first NUL, at most [`MAX_NUMBER_LEN`] bytes.
    fn number(&mut self) -> String {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.buf.len());
        let mut value = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.advance(self.buf.len());

        let len = value.len();
        if bound_number(&mut value) {
            warn!(
                notification = self.name,
                len,
                max = MAX_NUMBER_LEN,
                "truncating oversized number"
            );
        }
        value
    }
}
