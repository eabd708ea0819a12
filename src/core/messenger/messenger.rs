use super::delegate::{
    erase_listener, Delegate, DelegateHandle, DelegateKind, MsgFlags, MultiSlot, Receiver, SingleSlot,
    SlotRef,
};
use super::message::{AnyMessage, Message};
use super::store::{MessageStore, SlotKind, SlotLayout};
use crate::core::error::{FrameworkError, Phase, Result};
use crate::core::types::InstanceId;
use log::{debug, trace};
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Delegates of one message type, grouped by the detector of their owner
/// (empty key for unique modules). Removed delegates leave a `None` behind
/// so that handles stay valid.
type DelegateLists = BTreeMap<String, Vec<Option<Delegate>>>;

/// Routes messages from producing modules to the modules bound to their type.
///
/// Delegates are only added and removed while modules are constructed or
/// destroyed. During the event loop the messenger is shared read-only; the
/// messages themselves live in the [`MessageStore`] of each event.
#[derive(Default)]
pub struct Messenger {
    delegates: HashMap<TypeId, DelegateLists>,
    owned: HashMap<InstanceId, Vec<DelegateHandle>>,
    layouts: BTreeMap<InstanceId, Vec<SlotLayout>>,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every message of type `T` sent to `receiver`,
    /// synchronously while the message is dispatched
    pub fn register_listener<T, F>(&mut self, receiver: &Receiver, callback: F, flags: MsgFlags) -> DelegateHandle
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<Message<T>>) -> Result<()> + Send + Sync + 'static,
    {
        let listener = erase_listener::<T, F>(receiver.name().to_string(), callback);
        let (handle, _) = self.add_delegate::<T>(receiver, flags, DelegateKind::Listener(listener));
        handle
    }

    /// Bind a slot holding at most one message of type `T` per event
    pub fn bind_single<T: Send + Sync + 'static>(&mut self, receiver: &Receiver, flags: MsgFlags) -> SingleSlot<T> {
        let (_, slot) = self.add_delegate::<T>(receiver, flags, DelegateKind::Single);
        SingleSlot::new(slot)
    }

    /// Bind a slot collecting every message of type `T` of an event
    pub fn bind_multi<T: Send + Sync + 'static>(&mut self, receiver: &Receiver, flags: MsgFlags) -> MultiSlot<T> {
        let (_, slot) = self.add_delegate::<T>(receiver, flags, DelegateKind::Multi);
        MultiSlot::new(slot)
    }

    fn add_delegate<T: 'static>(
        &mut self,
        receiver: &Receiver,
        flags: MsgFlags,
        kind: DelegateKind,
    ) -> (DelegateHandle, SlotRef) {
        let type_name = std::any::type_name::<T>();
        let slot_kind = match kind {
            DelegateKind::Single => SlotKind::Single,
            DelegateKind::Multi => SlotKind::Multi,
            DelegateKind::Listener(_) => SlotKind::Listener,
        };
        debug!(
            "Binding {} delegate for {} to {}",
            kind.label(),
            type_name,
            receiver.name()
        );

        let layout = self.layouts.entry(receiver.id()).or_default();
        let slot = SlotRef {
            owner: receiver.id(),
            index: layout.len(),
        };
        layout.push(SlotLayout {
            kind: slot_kind,
            flags,
            type_name,
            active: true,
        });

        let detector_key = receiver
            .detector()
            .map(|d| d.name().to_string())
            .unwrap_or_default();
        let list = self
            .delegates
            .entry(TypeId::of::<T>())
            .or_default()
            .entry(detector_key.clone())
            .or_default();
        let handle = DelegateHandle {
            type_id: TypeId::of::<T>(),
            detector_key,
            index: list.len(),
        };
        list.push(Some(Delegate {
            receiver: receiver.clone(),
            slot: slot.index,
            flags,
            kind,
        }));

        self.owned.entry(receiver.id()).or_default().push(handle.clone());
        (handle, slot)
    }

    /// Remove one delegate in constant time. The owner keeps the handle in
    /// its list; the tombstone makes a later `remove_delegates` skip it.
    pub fn remove_delegate(&mut self, handle: &DelegateHandle) -> Result<()> {
        let entry = self
            .delegates
            .get_mut(&handle.type_id)
            .and_then(|lists| lists.get_mut(&handle.detector_key))
            .and_then(|list| list.get_mut(handle.index))
            .ok_or_else(|| FrameworkError::logic("delegate handle does not belong to this messenger"))?;
        let delegate = entry
            .take()
            .ok_or_else(|| FrameworkError::logic("delegate was already removed"))?;

        let owner = delegate.receiver.id();
        if let Some(layout) = self
            .layouts
            .get_mut(&owner)
            .and_then(|slots| slots.get_mut(delegate.slot))
        {
            layout.active = false;
        }
        Ok(())
    }

    /// Remove every delegate of a module instance, returns how many were removed
    pub fn remove_delegates(&mut self, owner: InstanceId) -> usize {
        let handles = self.owned.remove(&owner).unwrap_or_default();
        let mut removed = 0;
        for handle in &handles {
            let entry = self
                .delegates
                .get_mut(&handle.type_id)
                .and_then(|lists| lists.get_mut(&handle.detector_key))
                .and_then(|list| list.get_mut(handle.index));
            if let Some(entry) = entry {
                if entry.take().is_some() {
                    removed += 1;
                }
            }
        }
        self.layouts.remove(&owner);
        trace!("Removed {} delegates of instance {}", removed, owner);
        removed
    }

    /// Number of live delegates
    pub fn delegate_count(&self) -> usize {
        self.delegates
            .values()
            .flat_map(|lists| lists.values())
            .map(|list| list.iter().flatten().count())
            .sum()
    }

    /// Whether any delegate would receive `message`
    pub fn has_receiver<T: Send + Sync + 'static>(&self, source: &Receiver, message: &Message<T>) -> bool {
        let detector = message.detector().map(|d| &**d);
        let found = self
            .delegates
            .get(&TypeId::of::<T>())
            .map(|lists| {
                lists
                    .values()
                    .flat_map(|list| list.iter().flatten())
                    .any(|delegate| delegate.accepts(detector))
            })
            .unwrap_or(false);
        trace!(
            "{} checked receivers for {}: {}",
            source.name(),
            std::any::type_name::<T>(),
            found
        );
        found
    }

    /// Deliver `message` to every matching delegate, storing it in the
    /// slots of `store`
    pub fn dispatch_message<T: Send + Sync + 'static>(
        &self,
        source: &Receiver,
        message: Message<T>,
        store: &mut MessageStore,
    ) -> Result<()> {
        self.dispatch_any(source, AnyMessage::new(message), store)
    }

    pub(crate) fn dispatch_any(&self, source: &Receiver, message: AnyMessage, store: &mut MessageStore) -> Result<()> {
        let lists = match self.delegates.get(&message.type_id()) {
            Some(lists) => lists,
            None => {
                trace!(
                    "{} dispatched {} without receivers",
                    source.name(),
                    message.type_name()
                );
                return Ok(());
            }
        };

        let mut delivered = 0;
        for delegate in lists.values().flat_map(|list| list.iter().flatten()) {
            if !delegate.accepts(message.detector()) {
                continue;
            }
            if let DelegateKind::Listener(callback) = &delegate.kind {
                callback(&message).map_err(|e| e.in_module(delegate.receiver.name(), Phase::Run))?;
            }
            store.deliver(delegate, &message)?;
            delivered += 1;
        }

        trace!(
            "{} dispatched {} to {} delegates in event {}",
            source.name(),
            message.type_name(),
            delivered,
            store.event()
        );
        Ok(())
    }

    /// Fresh per-event store with an empty slot for every bound delegate
    pub fn new_store(&self, event: u64) -> MessageStore {
        MessageStore::new(event, &self.layouts)
    }

    /// Type names of the required inputs of `owner` that received nothing
    pub(crate) fn missing_required(&self, owner: InstanceId, store: &MessageStore) -> Vec<&'static str> {
        self.layouts
            .get(&owner)
            .map(|slots| {
                slots
                    .iter()
                    .enumerate()
                    .filter(|(_, layout)| layout.active && layout.flags.contains(MsgFlags::REQUIRED))
                    .filter(|(index, _)| !store.received(owner, *index))
                    .map(|(_, layout)| layout.type_name)
                    .collect()
            })
            .unwrap_or_default()
    }
}
