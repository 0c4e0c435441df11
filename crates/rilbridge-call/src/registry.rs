//! Fixed-capacity call table.
//!
//! Contexts live in numbered slots. A slot's 1-based position is the call
//! index the host sees in call lists and passes back to hang up.

use tracing::debug;

use crate::error::{CallError, Result};
use crate::types::{CallId, CallState, Token};

/// Position of a context in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    /// Slot for a 1-based call index. `None` for index 0.
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).map(SlotId)
    }

    /// 1-based call index.
    pub fn index(self) -> usize {
        self.0 + 1
    }
}

/// Record for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub call_id: CallId,
    pub state: CallState,
    pub number: String,
    pub call_type: u32,
    pub mobile_terminated: bool,
    pending: Option<Token>,
}

impl CallContext {
    /// Outgoing call awaiting its baseband id.
    pub fn outgoing(number: impl Into<String>, call_type: u32) -> Self {
        Self {
            call_id: CallId::PENDING,
            state: CallState::Dialing,
            number: number.into(),
            call_type,
            mobile_terminated: false,
            pending: None,
        }
    }

    /// Call announced by the baseband.
    pub fn incoming(
        call_id: CallId,
        call_type: u32,
        number: impl Into<String>,
        state: CallState,
    ) -> Self {
        Self {
            call_id,
            state,
            number: number.into(),
            call_type,
            mobile_terminated: true,
            pending: None,
        }
    }

    /// Token of the request awaiting a baseband response, if any.
    pub fn pending_token(&self) -> Option<Token> {
        self.pending
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Attach a token; fails if one is already pending.
    pub fn attach_token(&mut self, token: Token) -> Result<()> {
        if self.pending.is_some() {
            return Err(CallError::TokenConflict {
                call_id: self.call_id,
            });
        }
        self.pending = Some(token);
        Ok(())
    }

    /// Detach the pending token, leaving the context idle.
    pub fn take_token(&mut self) -> Option<Token> {
        self.pending.take()
    }
}

/// Slot table of call contexts.
#[derive(Debug)]
pub struct CallRegistry {
    slots: Vec<Option<CallContext>>,
}

impl CallRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Place a context in the lowest free slot.
    ///
    /// Fails when every slot is taken or another context already carries the
    /// same call id (including the pending placeholder).
    pub fn allocate(&mut self, context: CallContext) -> Result<SlotId> {
        if self.find_by_id(context.call_id).is_some() {
            return Err(CallError::DuplicateCallId(context.call_id));
        }
        let Some(free) = self.slots.iter().position(Option::is_none) else {
            return Err(CallError::RegistryFull {
                capacity: self.capacity(),
            });
        };
        debug!(
            index = free + 1,
            call_id = %context.call_id,
            state = %context.state,
            "call context allocated"
        );
        self.slots[free] = Some(context);
        Ok(SlotId(free))
    }

    pub fn get(&self, slot: SlotId) -> Option<&CallContext> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut CallContext> {
        self.slots.get_mut(slot.0).and_then(Option::as_mut)
    }

    /// Context for a 1-based call index.
    pub fn lookup_index(&self, index: usize) -> Result<SlotId> {
        SlotId::from_index(index)
            .filter(|slot| self.get(*slot).is_some())
            .ok_or_else(|| CallError::ContextNotFound(format!("index {index}")))
    }

    pub fn find_by_id(&self, call_id: CallId) -> Option<SlotId> {
        self.find(|context| context.call_id == call_id)
    }

    /// First context with an assigned id in the `Active` state.
    pub fn find_active(&self) -> Option<SlotId> {
        self.find(|context| !context.call_id.is_pending() && context.state == CallState::Active)
    }

    /// First context matching `predicate`, in slot order.
    pub fn find(&self, predicate: impl Fn(&CallContext) -> bool) -> Option<SlotId> {
        self.iter()
            .find(|(_, context)| predicate(context))
            .map(|(slot, _)| slot)
    }

    /// Attach a request token to the context in `slot`.
    pub fn attach_token(&mut self, slot: SlotId, token: Token) -> Result<()> {
        self.get_mut(slot)
            .ok_or_else(|| CallError::ContextNotFound(format!("index {}", slot.index())))?
            .attach_token(token)
    }

    /// Give the context in `slot` its baseband id.
    pub fn assign_id(&mut self, slot: SlotId, call_id: CallId) -> Result<()> {
        if let Some(owner) = self.find_by_id(call_id) {
            if owner != slot {
                return Err(CallError::DuplicateCallId(call_id));
            }
        }
        let context = self
            .get_mut(slot)
            .ok_or_else(|| CallError::ContextNotFound(format!("index {}", slot.index())))?;
        context.call_id = call_id;
        Ok(())
    }

    /// Remove and return the context in `slot`.
    pub fn release(&mut self, slot: SlotId) -> Option<CallContext> {
        let context = self.slots.get_mut(slot.0)?.take()?;
        debug!(index = slot.index(), call_id = %context.call_id, "call context released");
        Some(context)
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &CallContext)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|context| (SlotId(i), context)))
    }

    /// Empty every slot, returning the contexts that were there.
    pub fn drain(&mut self) -> Vec<CallContext> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}
