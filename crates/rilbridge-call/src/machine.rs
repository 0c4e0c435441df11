//! Call state machine.
//!
//! Every operation is a pure step: it mutates the registry and DTMF state and
//! returns the [`Action`]s to carry out, in order. Nothing here touches the
//! link or the host; [`crate::link::Link`] executes the actions.

use std::time::Duration;

use rilbridge_frame::Message;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::dtmf::{is_valid_tone, DtmfState};
use crate::error::{CallError, Result};
use crate::protocol::{opcode_name, Command, Notification, CALL_TYPE_VOICE};
use crate::registry::{CallContext, CallRegistry, SlotId};
use crate::roles::{
    plan_hangup_foreground_resume_background, plan_hangup_waiting_or_background,
    plan_switch_waiting_or_holding_and_active, Pause, Plan, Roles, Step,
    HANGUP_BACKGROUND_ROLES, HANGUP_FOREGROUND_ROLES, SWITCH_ROLES,
};
use crate::types::{
    bound_number, type_of_address, CallId, CallSnapshot, CallState, Event, Response, Status,
    Token, CALL_FAIL_NORMAL, MAX_NUMBER_LEN,
};

/// Host request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Dial { number: String, clir: u32 },
    GetCurrentCalls,
    Hangup { index: usize },
    HangupWaitingOrBackground,
    HangupForegroundResumeBackground,
    SwitchWaitingOrHoldingAndActive,
    Answer,
    LastCallFailCause,
    /// One-shot tone burst.
    Dtmf { tone: u8 },
    DtmfStart { tone: u8 },
    DtmfStop,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Dial { .. } => "dial",
            Request::GetCurrentCalls => "get-current-calls",
            Request::Hangup { .. } => "hangup",
            Request::HangupWaitingOrBackground => "hangup-waiting-or-background",
            Request::HangupForegroundResumeBackground => "hangup-foreground-resume-background",
            Request::SwitchWaitingOrHoldingAndActive => "switch-waiting-or-holding-and-active",
            Request::Answer => "answer",
            Request::LastCallFailCause => "last-call-fail-cause",
            Request::Dtmf { .. } => "dtmf",
            Request::DtmfStart { .. } => "dtmf-start",
            Request::DtmfStop => "dtmf-stop",
        }
    }
}

/// Side effect produced by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a command to the baseband.
    Issue(Command),
    /// Pause before the next command.
    Settle(Duration),
    /// Resolve a host token.
    Complete {
        token: Token,
        status: Status,
        response: Response,
    },
    /// Raise an unsolicited event.
    Unsolicited(Event),
}

impl Action {
    fn succeed(token: Token) -> Self {
        Self::respond(token, Response::None)
    }

    fn respond(token: Token, response: Response) -> Self {
        Action::Complete {
            token,
            status: Status::Success,
            response,
        }
    }

    fn fail(token: Token) -> Self {
        Action::Complete {
            token,
            status: Status::GenericFailure,
            response: Response::None,
        }
    }

    fn resolve(token: Token, ok: bool) -> Self {
        Action::Complete {
            token,
            status: Status::from_ok(ok),
            response: Response::None,
        }
    }
}

/// Registry, DTMF bookkeeping and last fail cause for one baseband link.
#[derive(Debug)]
pub struct CallStateMachine {
    registry: CallRegistry,
    dtmf: DtmfState,
    last_fail_cause: u32,
    config: BridgeConfig,
}

impl Default for CallStateMachine {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl CallStateMachine {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            registry: CallRegistry::new(config.max_calls),
            dtmf: DtmfState::default(),
            last_fail_cause: CALL_FAIL_NORMAL,
            config,
        }
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    pub fn dtmf(&self) -> &DtmfState {
        &self.dtmf
    }

    pub fn last_fail_cause(&self) -> u32 {
        self.last_fail_cause
    }

    /// Handle a host request.
    ///
    /// A rejected request yields a single generic-failure completion of
    /// `token` and no commands.
    pub fn handle_request(&mut self, token: Token, request: Request) -> Vec<Action> {
        let name = request.name();
        let mut actions = Vec::new();
        let result = match request {
            Request::Dial { number, clir } => self.dial(token, number, clir, &mut actions),
            Request::GetCurrentCalls => {
                actions.push(Action::respond(token, Response::Calls(self.snapshots())));
                Ok(())
            }
            Request::Hangup { index } => self.hangup(token, index, &mut actions),
            Request::HangupWaitingOrBackground => {
                Roles::classify(&self.registry, HANGUP_BACKGROUND_ROLES).and_then(|roles| {
                    self.run_plan(token, plan_hangup_waiting_or_background(&roles), &mut actions)
                })
            }
            Request::HangupForegroundResumeBackground => {
                Roles::classify(&self.registry, HANGUP_FOREGROUND_ROLES).and_then(|roles| {
                    self.run_plan(
                        token,
                        plan_hangup_foreground_resume_background(&roles),
                        &mut actions,
                    )
                })
            }
            Request::SwitchWaitingOrHoldingAndActive => {
                Roles::classify(&self.registry, SWITCH_ROLES).and_then(|roles| {
                    self.run_plan(
                        token,
                        plan_switch_waiting_or_holding_and_active(&roles),
                        &mut actions,
                    )
                })
            }
            Request::Answer => self.answer(token, &mut actions),
            Request::LastCallFailCause => {
                actions.push(Action::respond(
                    token,
                    Response::FailCause(self.last_fail_cause),
                ));
                Ok(())
            }
            Request::Dtmf { tone } => self.dtmf_burst(token, tone, &mut actions),
            Request::DtmfStart { tone } => self.dtmf_start(token, tone, &mut actions),
            Request::DtmfStop => self.dtmf_stop(token, &mut actions),
        };

        match result {
            Ok(()) => debug!(request = name, %token, actions = actions.len(), "request accepted"),
            Err(err) => {
                warn!(request = name, %token, error = %err, "request rejected");
                actions.clear();
                actions.push(Action::fail(token));
            }
        }
        actions
    }

    /// Decode and handle one inbound message.
    pub fn handle_message(&mut self, message: &Message) -> Vec<Action> {
        match Notification::decode(message) {
            Ok(Some(notification)) => self.handle_notification(notification),
            Ok(None) => {
                debug!(
                    command = message.command,
                    size = message.data.len(),
                    "ignoring message with unhandled opcode"
                );
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed notification");
                Vec::new()
            }
        }
    }

    /// Handle a decoded baseband notification.
    pub fn handle_notification(&mut self, notification: Notification) -> Vec<Action> {
        debug!(
            notification = opcode_name(notification.opcode()),
            "baseband notification"
        );
        let mut out = Vec::new();
        match notification {
            Notification::Incoming {
                call_id,
                call_type,
                number,
            } => self.on_incoming(call_id, call_type, number, &mut out),
            Notification::End { call_id, cause } => self.on_end(call_id, cause, &mut out),
            Notification::SetupInd { call_id } => self.on_setup_ind(call_id, &mut out),
            Notification::Alert { call_id, .. } => self.on_alert(call_id, &mut out),
            Notification::Connected { call_id } => self.on_connected(call_id, &mut out),
            Notification::HoldCnf { call_id, cause } => {
                self.on_single_cnf(call_id, cause, CallState::Holding, &mut out)
            }
            Notification::ActivateCnf { call_id, cause } => {
                self.on_single_cnf(call_id, cause, CallState::Active, &mut out)
            }
            Notification::SwapCnf {
                activated,
                held,
                cause,
            } => self.on_swap_cnf(activated, held, cause, &mut out),
            Notification::Error { call_id, error } => self.on_error(call_id, error, &mut out),
            Notification::DtmfStartCnf { reason, .. } => {
                if reason != 0 {
                    self.dtmf.clear_tone();
                }
                if let Some(token) = self.dtmf.take_start() {
                    out.push(Action::resolve(token, reason == 0));
                } else {
                    debug!(reason, "DTMF start confirmation without pending request");
                }
            }
            Notification::DtmfStopCnf { reason, .. } => {
                if let Some(token) = self.dtmf.take_stop() {
                    out.push(Action::resolve(token, reason == 0));
                } else {
                    debug!(reason, "DTMF stop confirmation without pending request");
                }
            }
        }
        out
    }

    /// Release every context and fail every outstanding token.
    pub fn shutdown(&mut self) -> Vec<Action> {
        let contexts = self.registry.drain();
        let out: Vec<Action> = contexts
            .into_iter()
            .filter_map(|mut context| context.take_token())
            .chain(self.dtmf.drain())
            .map(Action::fail)
            .collect();
        if !out.is_empty() {
            info!(failed = out.len(), "failing outstanding requests at shutdown");
        }
        out
    }

    /// Current-calls view: one entry per id-assigned context, in index order.
    pub fn snapshots(&self) -> Vec<CallSnapshot> {
        self.registry
            .iter()
            .filter(|(_, context)| !context.call_id.is_pending())
            .map(|(slot, context)| CallSnapshot {
                index: slot.index(),
                call_id: context.call_id,
                state: context.state,
                toa: type_of_address(&context.number),
                mobile_terminated: context.mobile_terminated,
                number: context.number.clone(),
                number_presentation: if context.number.is_empty() { 2 } else { 0 },
            })
            .collect()
    }

    fn dial(
        &mut self,
        token: Token,
        number: String,
        clir: u32,
        out: &mut Vec<Action>,
    ) -> Result<()> {
        if self.registry.find_by_id(CallId::PENDING).is_some() {
            return Err(CallError::SetupInProgress);
        }
        if number.is_empty() || number.len() > MAX_NUMBER_LEN {
            return Err(CallError::InvalidArgument(format!(
                "dial string must be 1..={MAX_NUMBER_LEN} bytes, got {}",
                number.len()
            )));
        }
        if number.contains('\0') {
            return Err(CallError::InvalidArgument("dial string contains NUL".into()));
        }

        let slot = self
            .registry
            .allocate(CallContext::outgoing(number.clone(), CALL_TYPE_VOICE))?;
        if let Err(err) = self.registry.attach_token(slot, token) {
            self.registry.release(slot);
            return Err(err);
        }
        info!(%token, index = slot.index(), "dialing");
        out.push(Action::Issue(Command::Setup {
            call_type: CALL_TYPE_VOICE,
            clir,
            number,
        }));
        Ok(())
    }

    fn hangup(&mut self, token: Token, index: usize, out: &mut Vec<Action>) -> Result<()> {
        let slot = self.registry.lookup_index(index)?;
        self.registry.attach_token(slot, token)?;
        let (call_type, call_id) = self.addr(slot)?;
        out.push(Action::Issue(Command::Release {
            call_type,
            call_id,
            cause: 0,
        }));
        Ok(())
    }

    fn answer(&mut self, token: Token, out: &mut Vec<Action>) -> Result<()> {
        let ringing: Vec<SlotId> = self
            .registry
            .iter()
            .filter(|(_, context)| {
                !context.call_id.is_pending() && context.state == CallState::Incoming
            })
            .map(|(slot, _)| slot)
            .collect();

        let Some(&first) = ringing.first() else {
            return Err(CallError::ContextNotFound("incoming call".into()));
        };
        for slot in &ringing {
            if let Some(context) = self.registry.get(*slot).filter(|c| c.is_busy()) {
                return Err(CallError::TokenConflict {
                    call_id: context.call_id,
                });
            }
        }

        self.registry.attach_token(first, token)?;
        for slot in ringing {
            let (call_type, call_id) = self.addr(slot)?;
            out.push(Action::Issue(Command::Answer { call_type, call_id }));
        }
        Ok(())
    }

    fn run_plan(&mut self, token: Token, plan: Plan, out: &mut Vec<Action>) -> Result<()> {
        let Plan::Issue { token_on, steps } = plan else {
            out.push(Action::succeed(token));
            return Ok(());
        };
        self.registry.attach_token(token_on.slot, token)?;
        out.extend(steps.into_iter().map(|step| self.step_action(step)));
        Ok(())
    }

    fn step_action(&self, step: Step) -> Action {
        let command = match step {
            Step::Release(call) => Command::Release {
                call_type: call.call_type,
                call_id: call.call_id,
                cause: 0,
            },
            Step::Hold(call) => Command::Hold {
                call_id: call.call_id,
            },
            Step::Activate(call) => Command::Activate {
                call_id: call.call_id,
            },
            Step::Answer(call) => Command::Answer {
                call_type: call.call_type,
                call_id: call.call_id,
            },
            Step::Swap { active, held } => Command::Swap {
                active: active.call_id,
                held: held.call_id,
            },
            Step::Settle(Pause::Resume) => return Action::Settle(self.config.resume_settle),
            Step::Settle(Pause::Hold) => return Action::Settle(self.config.hold_settle),
        };
        Action::Issue(command)
    }

    fn dtmf_burst(&mut self, token: Token, tone: u8, out: &mut Vec<Action>) -> Result<()> {
        check_tone(tone)?;
        let call_id = self.active_call_id()?;
        out.push(Action::Issue(Command::DtmfStart { call_id, tone }));
        out.push(Action::Settle(self.config.dtmf_settle));
        out.push(Action::Issue(Command::DtmfStop { call_id }));
        out.push(Action::succeed(token));
        Ok(())
    }

    fn dtmf_start(&mut self, token: Token, tone: u8, out: &mut Vec<Action>) -> Result<()> {
        check_tone(tone)?;
        let call_id = self.active_call_id()?;
        self.dtmf.attach_start(token)?;
        if let Some(playing_on) = self.dtmf.tone_call() {
            debug!(%playing_on, "stopping current tone first");
            out.push(Action::Issue(Command::DtmfStop {
                call_id: playing_on,
            }));
            out.push(Action::Settle(self.config.dtmf_settle));
        }
        self.dtmf.set_tone(call_id, tone);
        out.push(Action::Issue(Command::DtmfStart { call_id, tone }));
        Ok(())
    }

    fn dtmf_stop(&mut self, token: Token, out: &mut Vec<Action>) -> Result<()> {
        let call_id = self.active_call_id()?;
        self.dtmf.attach_stop(token)?;
        self.dtmf.clear_tone();
        out.push(Action::Issue(Command::DtmfStop { call_id }));
        Ok(())
    }

    fn active_call_id(&self) -> Result<CallId> {
        self.registry
            .find_active()
            .and_then(|slot| self.registry.get(slot))
            .map(|context| context.call_id)
            .ok_or_else(|| CallError::ContextNotFound("active call".into()))
    }

    fn addr(&self, slot: SlotId) -> Result<(u32, CallId)> {
        self.registry
            .get(slot)
            .map(|context| (context.call_type, context.call_id))
            .ok_or_else(|| CallError::ContextNotFound(format!("index {}", slot.index())))
    }

    fn on_incoming(
        &mut self,
        call_id: CallId,
        call_type: u32,
        mut number: String,
        out: &mut Vec<Action>,
    ) {
        if bound_number(&mut number) {
            warn!(%call_id, "incoming number cut to {MAX_NUMBER_LEN} bytes");
        }
        if call_id.is_pending() || self.registry.find_by_id(call_id).is_some() {
            warn!(%call_id, "ignoring duplicate incoming call");
            return;
        }
        let busy = self.registry.iter().any(|(_, context)| {
            !context.call_id.is_pending()
                && matches!(context.state, CallState::Active | CallState::Holding)
        });
        let state = if busy {
            CallState::Waiting
        } else {
            CallState::Incoming
        };

        match self
            .registry
            .allocate(CallContext::incoming(call_id, call_type, number, state))
        {
            Ok(slot) => info!(%call_id, index = slot.index(), %state, "incoming call"),
            Err(err) => {
                warn!(%call_id, error = %err, "dropping incoming call");
                return;
            }
        }
        out.push(Action::Unsolicited(Event::CallRing));
        out.push(Action::Unsolicited(Event::CallStateChanged));
    }

    fn on_end(&mut self, call_id: CallId, cause: u32, out: &mut Vec<Action>) {
        self.last_fail_cause = cause;
        let Some(mut context) = self
            .registry
            .find_by_id(call_id)
            .and_then(|slot| self.registry.release(slot))
        else {
            debug!(%call_id, cause, "end for unknown call");
            return;
        };
        info!(%call_id, cause, "call ended");
        self.dtmf.call_ended(call_id);
        match context.take_token() {
            Some(token) => out.push(Action::succeed(token)),
            None => out.push(Action::Unsolicited(Event::CallStateChanged)),
        }
    }

    fn on_setup_ind(&mut self, call_id: CallId, out: &mut Vec<Action>) {
        let Some(slot) = self.registry.find_by_id(CallId::PENDING) else {
            warn!(%call_id, "setup indication without outgoing call");
            return;
        };
        if let Err(err) = self.registry.assign_id(slot, call_id) {
            warn!(%call_id, error = %err, "cannot assign call id");
            return;
        }
        if let Some(token) = self.registry.get_mut(slot).and_then(CallContext::take_token) {
            out.push(Action::succeed(token));
        }
    }

    fn on_alert(&mut self, call_id: CallId, out: &mut Vec<Action>) {
        if !self.set_state(call_id, CallState::Alerting) {
            debug!(%call_id, "alert for unknown call");
            return;
        }
        out.push(Action::Unsolicited(Event::CallStateChanged));
    }

    fn on_connected(&mut self, call_id: CallId, out: &mut Vec<Action>) {
        let Some(context) = self.context_mut(call_id) else {
            debug!(%call_id, "connected for unknown call");
            return;
        };
        context.state = CallState::Active;
        match context.take_token() {
            Some(token) => out.push(Action::succeed(token)),
            None => out.push(Action::Unsolicited(Event::CallStateChanged)),
        }
    }

    fn on_single_cnf(
        &mut self,
        call_id: CallId,
        cause: u32,
        state: CallState,
        out: &mut Vec<Action>,
    ) {
        let Some(context) = self.context_mut(call_id) else {
            debug!(%call_id, cause, "confirmation for unknown call");
            return;
        };
        if cause == 0 {
            context.state = state;
        }
        match (context.take_token(), cause) {
            (Some(token), cause) => out.push(Action::resolve(token, cause == 0)),
            (None, 0) => out.push(Action::Unsolicited(Event::CallStateChanged)),
            (None, cause) => warn!(%call_id, cause, "unsolicited confirmation failure"),
        }
    }

    fn on_swap_cnf(
        &mut self,
        activated: CallId,
        held: CallId,
        cause: u32,
        out: &mut Vec<Action>,
    ) {
        let activated_slot = self.registry.find_by_id(activated);
        let held_slot = self.registry.find_by_id(held);
        let ok = cause == 0 && activated_slot.is_some() && held_slot.is_some();

        if ok {
            self.set_state(activated, CallState::Active);
            self.set_state(held, CallState::Holding);
        } else {
            warn!(%activated, %held, cause, "swap not confirmed");
        }

        let mut completed = false;
        for slot in [held_slot, activated_slot].into_iter().flatten() {
            if let Some(token) = self.registry.get_mut(slot).and_then(CallContext::take_token) {
                out.push(Action::resolve(token, ok));
                completed = true;
            }
        }
        if ok && !completed {
            out.push(Action::Unsolicited(Event::CallStateChanged));
        }
    }

    fn on_error(&mut self, call_id: CallId, error: u32, out: &mut Vec<Action>) {
        let Some(mut context) = self
            .registry
            .find_by_id(call_id)
            .and_then(|slot| self.registry.release(slot))
        else {
            debug!(%call_id, error, "error for unknown call");
            return;
        };
        warn!(%call_id, error, "baseband reported call error");
        self.dtmf.call_ended(call_id);
        if let Some(token) = context.take_token() {
            out.push(Action::fail(token));
        }
        out.push(Action::Unsolicited(Event::CallStateChanged));
    }

    fn context_mut(&mut self, call_id: CallId) -> Option<&mut CallContext> {
        let slot = self.registry.find_by_id(call_id)?;
        self.registry.get_mut(slot)
    }

    fn set_state(&mut self, call_id: CallId, state: CallState) -> bool {
        match self.context_mut(call_id) {
            Some(context) => {
                context.state = state;
                true
            }
            None => false,
        }
    }
}

fn check_tone(tone: u8) -> Result<()> {
    if is_valid_tone(tone) {
        Ok(())
    } else {
        Err(CallError::InvalidArgument(format!("invalid DTMF tone {tone:#04x}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> CallStateMachine {
        CallStateMachine::new(BridgeConfig::without_settle_delays())
    }

    fn notify(m: &mut CallStateMachine, n: Notification) -> Vec<Action> {
        m.handle_notification(n)
    }

    fn state(m: &CallStateMachine, id: u32) -> Option<CallState> {
        let slot = m.registry().find_by_id(CallId(id))?;
        m.registry().get(slot).map(|context| context.state)
    }

    fn active_call(m: &mut CallStateMachine, id: u32) {
        let token = Token(1000 + u64::from(id));
        m.handle_request(
            token,
            Request::Dial {
                number: format!("555{id}"),
                clir: 0,
            },
        );
        notify(m, Notification::SetupInd { call_id: CallId(id) });
        notify(m, Notification::Connected { call_id: CallId(id) });
        assert_eq!(state(m, id), Some(CallState::Active));
    }

    fn held_call(m: &mut CallStateMachine, id: u32) {
        active_call(m, id);
        m.handle_request(Token(2000 + u64::from(id)), Request::SwitchWaitingOrHoldingAndActive);
        notify(
            m,
            Notification::HoldCnf {
                call_id: CallId(id),
                cause: 0,
            },
        );
        assert_eq!(state(m, id), Some(CallState::Holding));
    }

    fn ring(m: &mut CallStateMachine, id: u32) -> Vec<Action> {
        notify(
            m,
            Notification::Incoming {
                call_id: CallId(id),
                call_type: 0,
                number: "+15550000".into(),
            },
        )
    }

    fn ok(token: u64) -> Action {
        Action::succeed(Token(token))
    }

    fn failed(token: u64) -> Action {
        Action::fail(Token(token))
    }

    fn changed() -> Action {
        Action::Unsolicited(Event::CallStateChanged)
    }

    #[test]
    fn dial_setup_alert_connect() {
        let mut m = machine();
        let actions = m.handle_request(
            Token(1),
            Request::Dial {
                number: "5551234".into(),
                clir: 2,
            },
        );
        assert_eq!(
            actions,
            vec![Action::Issue(Command::Setup {
                call_type: CALL_TYPE_VOICE,
                clir: 2,
                number: "5551234".into(),
            })]
        );
        assert!(m.snapshots().is_empty());

        assert_eq!(notify(&mut m, Notification::SetupInd { call_id: CallId(1) }), vec![ok(1)]);
        assert_eq!(state(&m, 1), Some(CallState::Dialing));

        let alert = Notification::Alert {
            call_id: CallId(1),
            audio_on: 1,
        };
        assert_eq!(notify(&mut m, alert), vec![changed()]);
        assert_eq!(state(&m, 1), Some(CallState::Alerting));

        assert_eq!(notify(&mut m, Notification::Connected { call_id: CallId(1) }), vec![changed()]);

        let calls = m.snapshots();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].index, 1);
        assert_eq!(calls[0].state, CallState::Active);
        assert_eq!(calls[0].toa, 129);
        assert!(!calls[0].mobile_terminated);
        assert_eq!(calls[0].number_presentation, 0);
    }

    #[test]
    fn second_dial_during_setup_fails() {
        let mut m = machine();
        let dial = || Request::Dial {
            number: "1".into(),
            clir: 0,
        };
        m.handle_request(Token(1), dial());
        assert_eq!(m.handle_request(Token(2), dial()), vec![failed(2)]);
        assert_eq!(m.registry().len(), 1);
    }

    #[test]
    fn dial_rejects_malformed_numbers() {
        let mut m = machine();
        for number in [String::new(), "9".repeat(MAX_NUMBER_LEN + 1), "12\u{0}3".into()] {
            let actions = m.handle_request(Token(5), Request::Dial { number, clir: 0 });
            assert_eq!(actions, vec![failed(5)]);
        }
        assert!(m.registry().is_empty());
    }

    #[test]
    fn dial_fails_when_registry_full() {
        let mut m = CallStateMachine::new(BridgeConfig {
            max_calls: 1,
            ..BridgeConfig::without_settle_delays()
        });
        ring(&mut m, 7);
        let actions = m.handle_request(
            Token(3),
            Request::Dial {
                number: "1".into(),
                clir: 0,
            },
        );
        assert_eq!(actions, vec![failed(3)]);
        assert_eq!(m.registry().len(), 1);
    }

    #[test]
    fn hangup_unknown_index_fails_without_commands() {
        let mut m = machine();
        active_call(&mut m, 1);
        assert_eq!(m.handle_request(Token(9), Request::Hangup { index: 3 }), vec![failed(9)]);
        assert_eq!(m.handle_request(Token(10), Request::Hangup { index: 0 }), vec![failed(10)]);
    }

    #[test]
    fn hangup_completes_on_end() {
        let mut m = machine();
        active_call(&mut m, 4);

        assert_eq!(
            m.handle_request(Token(2), Request::Hangup { index: 1 }),
            vec![Action::Issue(Command::Release {
                call_type: CALL_TYPE_VOICE,
                call_id: CallId(4),
                cause: 0,
            })]
        );
        assert_eq!(m.handle_request(Token(3), Request::Hangup { index: 1 }), vec![failed(3)]);

        let end = Notification::End {
            call_id: CallId(4),
            cause: 16,
        };
        assert_eq!(notify(&mut m, end), vec![ok(2)]);
        assert!(m.registry().is_empty());
    }

    #[test]
    fn remote_end_without_request_reports_change_and_cause() {
        let mut m = machine();
        assert_eq!(
            m.handle_request(Token(1), Request::LastCallFailCause),
            vec![Action::respond(Token(1), Response::FailCause(CALL_FAIL_NORMAL))]
        );

        active_call(&mut m, 2);
        let end = Notification::End {
            call_id: CallId(2),
            cause: 17,
        };
        assert_eq!(notify(&mut m, end), vec![changed()]);
        assert_eq!(m.last_fail_cause(), 17);
        assert_eq!(
            m.handle_request(Token(2), Request::LastCallFailCause),
            vec![Action::respond(Token(2), Response::FailCause(17))]
        );
    }

    #[test]
    fn incoming_rings_and_becomes_waiting_when_busy() {
        let mut m = machine();
        assert_eq!(
            ring(&mut m, 1),
            vec![Action::Unsolicited(Event::CallRing), changed()]
        );
        assert_eq!(state(&m, 1), Some(CallState::Incoming));

        let mut busy = machine();
        active_call(&mut busy, 1);
        ring(&mut busy, 2);
        assert_eq!(state(&busy, 2), Some(CallState::Waiting));

        let calls = busy.snapshots();
        assert_eq!(calls[1].toa, 145);
        assert!(calls[1].mobile_terminated);
    }

    #[test]
    fn oversized_incoming_number_is_stored_bounded() {
        let mut m = machine();
        let actions = notify(
            &mut m,
            Notification::Incoming {
                call_id: CallId(3),
                call_type: 0,
                number: "4".repeat(20_000),
            },
        );
        assert_eq!(actions.len(), 2);

        let calls = m.snapshots();
        assert_eq!(calls[0].number, "4".repeat(MAX_NUMBER_LEN));
    }

    #[test]
    fn duplicate_incoming_is_ignored() {
        let mut m = machine();
        ring(&mut m, 1);
        assert!(ring(&mut m, 1).is_empty());
        assert_eq!(m.registry().len(), 1);
    }

    #[test]
    fn answer_issues_for_every_incoming_token_on_first() {
        let mut m = machine();
        ring(&mut m, 1);
        ring(&mut m, 2);

        assert_eq!(
            m.handle_request(Token(5), Request::Answer),
            vec![
                Action::Issue(Command::Answer {
                    call_type: 0,
                    call_id: CallId(1)
                }),
                Action::Issue(Command::Answer {
                    call_type: 0,
                    call_id: CallId(2)
                }),
            ]
        );
        assert_eq!(notify(&mut m, Notification::Connected { call_id: CallId(1) }), vec![ok(5)]);
        assert_eq!(notify(&mut m, Notification::Connected { call_id: CallId(2) }), vec![changed()]);
    }

    #[test]
    fn answer_without_incoming_or_with_busy_incoming_fails() {
        let mut m = machine();
        assert_eq!(m.handle_request(Token(1), Request::Answer), vec![failed(1)]);

        ring(&mut m, 1);
        ring(&mut m, 2);
        m.handle_request(Token(2), Request::Hangup { index: 2 });
        assert_eq!(m.handle_request(Token(3), Request::Answer), vec![failed(3)]);
    }

    #[test]
    fn switch_holds_lone_active_call() {
        let mut m = machine();
        active_call(&mut m, 1);
        assert_eq!(
            m.handle_request(Token(7), Request::SwitchWaitingOrHoldingAndActive),
            vec![Action::Issue(Command::Hold { call_id: CallId(1) })]
        );
        let cnf = Notification::HoldCnf {
            call_id: CallId(1),
            cause: 0,
        };
        assert_eq!(notify(&mut m, cnf), vec![ok(7)]);
        assert_eq!(state(&m, 1), Some(CallState::Holding));
    }

    #[test]
    fn failed_hold_keeps_state_and_fails_token() {
        let mut m = machine();
        active_call(&mut m, 1);
        m.handle_request(Token(7), Request::SwitchWaitingOrHoldingAndActive);

        let cnf = Notification::HoldCnf {
            call_id: CallId(1),
            cause: 3,
        };
        assert_eq!(notify(&mut m, cnf), vec![failed(7)]);
        assert_eq!(state(&m, 1), Some(CallState::Active));
    }

    #[test]
    fn switch_swaps_active_and_held() {
        let mut m = machine();
        held_call(&mut m, 1);
        active_call(&mut m, 2);

        assert_eq!(
            m.handle_request(Token(8), Request::SwitchWaitingOrHoldingAndActive),
            vec![Action::Issue(Command::Swap {
                active: CallId(2),
                held: CallId(1)
            })]
        );
        assert_eq!(
            m.handle_request(Token(9), Request::SwitchWaitingOrHoldingAndActive),
            vec![failed(9)]
        );

        let cnf = Notification::SwapCnf {
            activated: CallId(1),
            held: CallId(2),
            cause: 0,
        };
        assert_eq!(notify(&mut m, cnf), vec![ok(8)]);
        assert_eq!(state(&m, 1), Some(CallState::Active));
        assert_eq!(state(&m, 2), Some(CallState::Holding));
    }

    #[test]
    fn failed_swap_keeps_states() {
        let mut m = machine();
        held_call(&mut m, 1);
        active_call(&mut m, 2);
        m.handle_request(Token(8), Request::SwitchWaitingOrHoldingAndActive);

        let cnf = Notification::SwapCnf {
            activated: CallId(1),
            held: CallId(2),
            cause: 1,
        };
        assert_eq!(notify(&mut m, cnf), vec![failed(8)]);
        assert_eq!(state(&m, 1), Some(CallState::Holding));
        assert_eq!(state(&m, 2), Some(CallState::Active));
    }

    #[test]
    fn swap_with_unknown_side_fails_known_token() {
        let mut m = machine();
        held_call(&mut m, 1);
        active_call(&mut m, 2);
        m.handle_request(Token(8), Request::SwitchWaitingOrHoldingAndActive);

        let cnf = Notification::SwapCnf {
            activated: CallId(1),
            held: CallId(2),
            cause: 0,
        };
        notify(
            &mut m,
            Notification::End {
                call_id: CallId(1),
                cause: 16,
            },
        );
        assert_eq!(notify(&mut m, cnf), vec![failed(8)]);
    }

    #[test]
    fn switch_answers_waiting_when_only_held() {
        let mut m = machine();
        held_call(&mut m, 1);
        ring(&mut m, 2);
        assert_eq!(state(&m, 2), Some(CallState::Waiting));

        assert_eq!(
            m.handle_request(Token(4), Request::SwitchWaitingOrHoldingAndActive),
            vec![Action::Issue(Command::Answer {
                call_type: 0,
                call_id: CallId(2)
            })]
        );
        assert_eq!(notify(&mut m, Notification::Connected { call_id: CallId(2) }), vec![ok(4)]);
    }

    #[test]
    fn switch_with_nothing_completes_immediately() {
        let mut m = machine();
        assert_eq!(
            m.handle_request(Token(1), Request::SwitchWaitingOrHoldingAndActive),
            vec![ok(1)]
        );
        assert_eq!(
            m.handle_request(Token(2), Request::HangupWaitingOrBackground),
            vec![ok(2)]
        );
        assert_eq!(
            m.handle_request(Token(3), Request::HangupForegroundResumeBackground),
            vec![ok(3)]
        );
    }

    #[test]
    fn hangup_foreground_releases_then_resumes_after_settle() {
        let mut m = CallStateMachine::default();
        held_call(&mut m, 1);
        active_call(&mut m, 2);

        assert_eq!(
            m.handle_request(Token(6), Request::HangupForegroundResumeBackground),
            vec![
                Action::Issue(Command::Release {
                    call_type: 0,
                    call_id: CallId(2),
                    cause: 0
                }),
                Action::Settle(Duration::from_millis(300)),
                Action::Issue(Command::Activate { call_id: CallId(1) }),
            ]
        );

        notify(
            &mut m,
            Notification::End {
                call_id: CallId(2),
                cause: 16,
            },
        );
        let cnf = Notification::ActivateCnf {
            call_id: CallId(1),
            cause: 0,
        };
        assert_eq!(notify(&mut m, cnf), vec![ok(6)]);
        assert_eq!(state(&m, 1), Some(CallState::Active));
    }

    #[test]
    fn hangup_background_releases_waiting_call() {
        let mut m = machine();
        active_call(&mut m, 1);
        ring(&mut m, 2);

        assert_eq!(
            m.handle_request(Token(3), Request::HangupWaitingOrBackground),
            vec![Action::Issue(Command::Release {
                call_type: 0,
                call_id: CallId(2),
                cause: 0
            })]
        );
        let end = Notification::End {
            call_id: CallId(2),
            cause: 21,
        };
        assert_eq!(notify(&mut m, end), vec![ok(3)]);
        assert_eq!(state(&m, 1), Some(CallState::Active));
    }

    #[test]
    fn error_fails_token_and_releases() {
        let mut m = machine();
        m.handle_request(
            Token(1),
            Request::Dial {
                number: "1".into(),
                clir: 0,
            },
        );
        notify(&mut m, Notification::SetupInd { call_id: CallId(3) });
        m.handle_request(Token(2), Request::Hangup { index: 1 });

        let error = Notification::Error {
            call_id: CallId(3),
            error: 1,
        };
        assert_eq!(notify(&mut m, error), vec![failed(2), changed()]);
        assert!(m.registry().is_empty());
    }

    #[test]
    fn dtmf_start_restart_and_stop() {
        let mut m = machine();
        active_call(&mut m, 1);

        assert_eq!(
            m.handle_request(Token(1), Request::DtmfStart { tone: b'1' }),
            vec![Action::Issue(Command::DtmfStart {
                call_id: CallId(1),
                tone: b'1'
            })]
        );
        assert_eq!(
            m.handle_request(Token(2), Request::DtmfStart { tone: b'2' }),
            vec![failed(2)]
        );
        let cnf = Notification::DtmfStartCnf {
            call_id: CallId(1),
            reason: 0,
        };
        assert_eq!(notify(&mut m, cnf.clone()), vec![ok(1)]);

        assert_eq!(
            m.handle_request(Token(3), Request::DtmfStart { tone: b'2' }),
            vec![
                Action::Issue(Command::DtmfStop { call_id: CallId(1) }),
                Action::Settle(Duration::ZERO),
                Action::Issue(Command::DtmfStart {
                    call_id: CallId(1),
                    tone: b'2'
                }),
            ]
        );
        assert_eq!(notify(&mut m, cnf), vec![ok(3)]);

        assert_eq!(
            m.handle_request(Token(4), Request::DtmfStop),
            vec![Action::Issue(Command::DtmfStop { call_id: CallId(1) })]
        );
        assert_eq!(m.dtmf().active_tone(), None);
        let stop = Notification::DtmfStopCnf {
            call_id: CallId(1),
            reason: 0,
        };
        assert_eq!(notify(&mut m, stop), vec![ok(4)]);
    }

    #[test]
    fn dtmf_stop_failure_reason() {
        let mut m = machine();
        active_call(&mut m, 1);
        m.handle_request(Token(4), Request::DtmfStop);
        let stop = Notification::DtmfStopCnf {
            call_id: CallId(1),
            reason: 2,
        };
        assert_eq!(notify(&mut m, stop), vec![failed(4)]);
    }

    #[test]
    fn failed_dtmf_start_leaves_no_tone_to_stop() {
        let mut m = machine();
        active_call(&mut m, 1);
        m.handle_request(Token(1), Request::DtmfStart { tone: b'3' });
        let cnf = Notification::DtmfStartCnf {
            call_id: CallId(1),
            reason: 5,
        };
        assert_eq!(notify(&mut m, cnf), vec![failed(1)]);
        assert_eq!(m.dtmf().active_tone(), None);

        assert_eq!(
            m.handle_request(Token(2), Request::DtmfStart { tone: b'4' }),
            vec![Action::Issue(Command::DtmfStart {
                call_id: CallId(1),
                tone: b'4'
            })]
        );
    }

    #[test]
    fn ending_the_call_drops_its_tone() {
        let mut m = machine();
        active_call(&mut m, 1);
        m.handle_request(Token(1), Request::DtmfStart { tone: b'#' });
        let cnf = Notification::DtmfStartCnf {
            call_id: CallId(1),
            reason: 0,
        };
        assert_eq!(notify(&mut m, cnf), vec![ok(1)]);

        let end = Notification::End {
            call_id: CallId(1),
            cause: 16,
        };
        notify(&mut m, end);
        assert_eq!(m.dtmf().active_tone(), None);

        active_call(&mut m, 2);
        assert_eq!(
            m.handle_request(Token(2), Request::DtmfStart { tone: b'0' }),
            vec![Action::Issue(Command::DtmfStart {
                call_id: CallId(2),
                tone: b'0'
            })]
        );
    }

    #[test]
    fn dtmf_requires_active_call_and_valid_tone() {
        let mut m = machine();
        assert_eq!(m.handle_request(Token(1), Request::DtmfStart { tone: b'1' }), vec![failed(1)]);
        assert_eq!(m.handle_request(Token(2), Request::DtmfStop), vec![failed(2)]);
        assert_eq!(m.handle_request(Token(3), Request::Dtmf { tone: b'1' }), vec![failed(3)]);

        active_call(&mut m, 1);
        assert_eq!(m.handle_request(Token(4), Request::DtmfStart { tone: b'x' }), vec![failed(4)]);
    }

    #[test]
    fn dtmf_burst_completes_immediately() {
        let mut m = machine();
        active_call(&mut m, 1);
        assert_eq!(
            m.handle_request(Token(5), Request::Dtmf { tone: b'#' }),
            vec![
                Action::Issue(Command::DtmfStart {
                    call_id: CallId(1),
                    tone: b'#'
                }),
                Action::Settle(Duration::ZERO),
                Action::Issue(Command::DtmfStop { call_id: CallId(1) }),
                ok(5),
            ]
        );
    }

    #[test]
    fn shutdown_fails_every_outstanding_token() {
        let mut m = machine();
        active_call(&mut m, 1);
        m.handle_request(Token(1), Request::DtmfStart { tone: b'5' });
        m.handle_request(Token(2), Request::Hangup { index: 1 });
        ring(&mut m, 2);

        let mut actions = m.shutdown();
        actions.sort_by_key(|action| match action {
            Action::Complete { token, .. } => *token,
            _ => Token(u64::MAX),
        });
        assert_eq!(actions, vec![failed(1), failed(2)]);
        assert!(m.registry().is_empty());
        assert!(m.shutdown().is_empty());
    }

    #[test]
    fn unknown_and_malformed_messages_produce_nothing() {
        let mut m = machine();
        assert!(m.handle_message(&Message::new(0x01FF, vec![1u8, 2])).is_empty());
        assert!(m
            .handle_message(&Message::new(crate::protocol::END_IND, vec![1u8]))
            .is_empty());

        let incoming = Notification::Incoming {
            call_id: CallId(3),
            call_type: 0,
            number: String::new(),
        };
        assert_eq!(m.handle_message(&incoming.to_message()).len(), 2);
        assert_eq!(m.snapshots()[0].number_presentation, 2);
    }
}
