//! Role classification and the decision tables for multi-call requests.
//!
//! The planners are pure: they look at a [`Roles`] snapshot and decide which
//! commands to issue and which context carries the request token. The state
//! machine turns a [`Plan`] into actions.

use crate::error::{CallError, Result};
use crate::registry::{CallRegistry, SlotId};
use crate::types::{CallId, CallState};

/// Role a context plays in a multi-call request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Active,
    Held,
    Waiting,
    Incoming,
}

impl Role {
    fn of(state: CallState) -> Option<Self> {
        match state {
            CallState::Active => Some(Role::Active),
            CallState::Holding => Some(Role::Held),
            CallState::Waiting => Some(Role::Waiting),
            CallState::Incoming => Some(Role::Incoming),
            CallState::Dialing | CallState::Alerting => None,
        }
    }
}

/// The parts of a context a plan needs to address it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRef {
    pub slot: SlotId,
    pub call_id: CallId,
    pub call_type: u32,
}

/// One context per role. When several contexts share a role the last one in
/// slot order wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roles {
    pub active: Option<CallRef>,
    pub held: Option<CallRef>,
    pub waiting: Option<CallRef>,
    pub incoming: Option<CallRef>,
}

impl Roles {
    /// Bucket id-assigned contexts whose role is in `wanted`.
    ///
    /// Fails with [`CallError::TokenConflict`] if any such context already has
    /// a pending request, so a rejected request never leaves a partial plan.
    pub fn classify(registry: &CallRegistry, wanted: &[Role]) -> Result<Self> {
        let mut roles = Roles::default();
        for (slot, context) in registry.iter() {
            if context.call_id.is_pending() {
                continue;
            }
            let Some(role) = Role::of(context.state) else {
                continue;
            };
            if !wanted.contains(&role) {
                continue;
            }
            if context.is_busy() {
                return Err(CallError::TokenConflict {
                    call_id: context.call_id,
                });
            }
            let call = CallRef {
                slot,
                call_id: context.call_id,
                call_type: context.call_type,
            };
            match role {
                Role::Active => roles.active = Some(call),
                Role::Held => roles.held = Some(call),
                Role::Waiting => roles.waiting = Some(call),
                Role::Incoming => roles.incoming = Some(call),
            }
        }
        Ok(roles)
    }
}

/// Which settle delay a pause uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// After releasing the foreground call, before resuming a held one.
    Resume,
    /// After holding the foreground call, before answering a waiting one.
    Hold,
}

/// One step of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Release(CallRef),
    Hold(CallRef),
    Activate(CallRef),
    Answer(CallRef),
    Swap { active: CallRef, held: CallRef },
    Settle(Pause),
}

/// Outcome of a decision table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Nothing to do; complete the request successfully at once.
    CompleteNow,
    /// Attach the token to `token_on`, then run `steps` in order.
    Issue { token_on: CallRef, steps: Vec<Step> },
}

/// Roles examined by [`plan_hangup_waiting_or_background`].
pub const HANGUP_BACKGROUND_ROLES: &[Role] =
    &[Role::Active, Role::Held, Role::Waiting, Role::Incoming];

fn release(call: CallRef) -> Plan {
    Plan::Issue {
        token_on: call,
        steps: vec![Step::Release(call)],
    }
}

/// Release the background call: waiting first, then active, held, incoming.
pub fn plan_hangup_waiting_or_background(roles: &Roles) -> Plan {
    match (roles.active, roles.held, roles.waiting, roles.incoming) {
        (_, Some(_), Some(waiting), _) | (Some(_), _, Some(waiting), _) => release(waiting),
        (Some(active), ..) => release(active),
        (None, Some(held), ..) => release(held),
        (None, None, Some(waiting), _) => release(waiting),
        (None, None, None, Some(incoming)) => release(incoming),
        (None, None, None, None) => Plan::CompleteNow,
    }
}

/// Roles examined by [`plan_hangup_foreground_resume_background`].
pub const HANGUP_FOREGROUND_ROLES: &[Role] = &[Role::Active, Role::Held];

/// Release the foreground call and resume the held one.
pub fn plan_hangup_foreground_resume_background(roles: &Roles) -> Plan {
    match (roles.active, roles.held) {
        (Some(active), Some(held)) => Plan::Issue {
            token_on: held,
            steps: vec![
                Step::Release(active),
                Step::Settle(Pause::Resume),
                Step::Activate(held),
            ],
        },
        (Some(active), None) => release(active),
        (None, Some(held)) => release(held),
        (None, None) => Plan::CompleteNow,
    }
}

/// Roles examined by [`plan_switch_waiting_or_holding_and_active`].
pub const SWITCH_ROLES: &[Role] = &[Role::Active, Role::Held, Role::Waiting];

/// Swap foreground and background calls, answering a waiting call when present.
pub fn plan_switch_waiting_or_holding_and_active(roles: &Roles) -> Plan {
    match (roles.active, roles.held, roles.waiting) {
        (Some(active), Some(held), _) => Plan::Issue {
            token_on: active,
            steps: vec![Step::Swap { active, held }],
        },
        (Some(active), None, Some(waiting)) => Plan::Issue {
            token_on: active,
            steps: vec![
                Step::Hold(waiting),
                Step::Settle(Pause::Hold),
                Step::Swap {
                    active,
                    held: waiting,
                },
            ],
        },
        (None, Some(_), Some(waiting)) | (None, None, Some(waiting)) => Plan::Issue {
            token_on: waiting,
            steps: vec![Step::Answer(waiting)],
        },
        (Some(active), None, None) => Plan::Issue {
            token_on: active,
            steps: vec![Step::Hold(active)],
        },
        (None, Some(held), None) => Plan::Issue {
            token_on: held,
            steps: vec![Step::Activate(held)],
        },
        (None, None, None) => Plan::CompleteNow,
    }
}
