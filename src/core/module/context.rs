use crate::core::error::Result;
use crate::core::geometry::Detector;
use crate::core::messenger::{DelegateHandle, Message, Messenger, MsgFlags, MultiSlot, Receiver, SingleSlot};
use crate::core::types::ModuleIdentifier;
use std::sync::Arc;

/// Binding context passed to a module factory.
///
/// It borrows the messenger for the duration of the factory call only, so
/// inputs can not be bound once the instance exists.
pub struct ModuleContext<'a> {
    messenger: &'a mut Messenger,
    receiver: Receiver,
    identifier: &'a ModuleIdentifier,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(messenger: &'a mut Messenger, receiver: Receiver, identifier: &'a ModuleIdentifier) -> Self {
        Self {
            messenger,
            receiver,
            identifier,
        }
    }

    /// Identity of the instance being constructed
    pub fn identifier(&self) -> &ModuleIdentifier {
        self.identifier
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Detector of a detector-scoped instance
    pub fn detector(&self) -> Option<&Arc<Detector>> {
        self.receiver.detector()
    }

    pub fn bind_single<T: Send + Sync + 'static>(&mut self, flags: MsgFlags) -> SingleSlot<T> {
        self.messenger.bind_single(&self.receiver, flags)
    }

    pub fn bind_multi<T: Send + Sync + 'static>(&mut self, flags: MsgFlags) -> MultiSlot<T> {
        self.messenger.bind_multi(&self.receiver, flags)
    }

    pub fn register_listener<T, F>(&mut self, callback: F, flags: MsgFlags) -> DelegateHandle
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<Message<T>>) -> Result<()> + Send + Sync + 'static,
    {
        self.messenger.register_listener(&self.receiver, callback, flags)
    }
}
