use super::delegate::{Delegate, MsgFlags, MultiSlot, SingleSlot, SlotRef};
use super::message::{AnyMessage, Message};
use crate::core::error::{FrameworkError, Result};
use crate::core::types::InstanceId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Single,
    Multi,
    Listener,
}

/// Shape of one bound slot, recorded at bind time
#[derive(Debug, Clone)]
pub(crate) struct SlotLayout {
    pub(crate) kind: SlotKind,
    pub(crate) flags: MsgFlags,
    pub(crate) type_name: &'static str,
    pub(crate) active: bool,
}

#[derive(Debug)]
enum SlotState {
    Single(Option<AnyMessage>),
    Multi(Vec<AnyMessage>),
    Listener(usize),
}

impl SlotState {
    fn empty(kind: SlotKind) -> Self {
        match kind {
            SlotKind::Single => SlotState::Single(None),
            SlotKind::Multi => SlotState::Multi(Vec::new()),
            SlotKind::Listener => SlotState::Listener(0),
        }
    }

    fn received(&self) -> bool {
        match self {
            SlotState::Single(message) => message.is_some(),
            SlotState::Multi(messages) => !messages.is_empty(),
            SlotState::Listener(count) => *count > 0,
        }
    }
}

/// Messages received by every module instance during one event.
///
/// A fresh store is created for each event, so events processed at the same
/// time on different workers never see each other's messages.
#[derive(Debug)]
pub struct MessageStore {
    event: u64,
    inboxes: HashMap<InstanceId, Vec<SlotState>>,
}

impl MessageStore {
    pub(crate) fn new(event: u64, layouts: &BTreeMap<InstanceId, Vec<SlotLayout>>) -> Self {
        let inboxes = layouts
            .iter()
            .map(|(owner, slots)| {
                let states = slots.iter().map(|layout| SlotState::empty(layout.kind)).collect();
                (*owner, states)
            })
            .collect();
        Self { event, inboxes }
    }

    /// Number of the event this store belongs to
    pub fn event(&self) -> u64 {
        self.event
    }

    /// Message currently held by a single-bound slot
    pub fn single<T: Send + Sync + 'static>(&self, slot: &SingleSlot<T>) -> Option<Arc<Message<T>>> {
        match self.state(slot.slot)? {
            SlotState::Single(Some(message)) => message.downcast::<T>(),
            _ => None,
        }
    }

    /// Messages collected by a multi-bound slot, in dispatch order
    pub fn multi<T: Send + Sync + 'static>(&self, slot: &MultiSlot<T>) -> Vec<Arc<Message<T>>> {
        match self.state(slot.slot) {
            Some(SlotState::Multi(messages)) => {
                messages.iter().filter_map(|m| m.downcast::<T>()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn received(&self, owner: InstanceId, index: usize) -> bool {
        self.state(SlotRef { owner, index })
            .map(SlotState::received)
            .unwrap_or(false)
    }

    /// Store a message for a single or multi delegate, or count a listener call
    pub(crate) fn deliver(&mut self, delegate: &Delegate, message: &AnyMessage) -> Result<()> {
        let event = self.event;
        let state = self
            .inboxes
            .get_mut(&delegate.receiver.id())
            .and_then(|slots| slots.get_mut(delegate.slot))
            .ok_or_else(|| {
                FrameworkError::logic(format!(
                    "module {} has no message slot {} in event {}",
                    delegate.receiver.name(),
                    delegate.slot,
                    event
                ))
            })?;

        match state {
            SlotState::Single(current) => {
                if current.is_some() && !delegate.flags.contains(MsgFlags::ALLOW_OVERWRITE) {
                    return Err(FrameworkError::MessageOverwrite {
                        module: delegate.receiver.name().to_string(),
                        message_type: message.type_name(),
                        event,
                    });
                }
                *current = Some(message.clone());
            }
            SlotState::Multi(messages) => messages.push(message.clone()),
            SlotState::Listener(count) => *count += 1,
        }
        Ok(())
    }

    fn state(&self, slot: SlotRef) -> Option<&SlotState> {
        self.inboxes.get(&slot.owner).and_then(|slots| slots.get(slot.index))
    }
}
