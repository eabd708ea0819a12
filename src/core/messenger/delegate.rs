use super::message::{AnyMessage, Message};
use crate::core::error::Result;
use crate::core::geometry::Detector;
use crate::core::types::InstanceId;
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

/// Flags changing how a delegate receives messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MsgFlags(u8);

impl MsgFlags {
    pub const NONE: MsgFlags = MsgFlags(0);
    /// The module is skipped for events in which this input is missing
    pub const REQUIRED: MsgFlags = MsgFlags(1);
    /// A single-bound slot may be replaced within one event
    pub const ALLOW_OVERWRITE: MsgFlags = MsgFlags(1 << 1);
    /// Receive messages of every detector, not only of the module's own
    pub const IGNORE_NAME: MsgFlags = MsgFlags(1 << 2);

    pub fn contains(self, other: MsgFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MsgFlags {
    type Output = MsgFlags;

    fn bitor(self, rhs: MsgFlags) -> MsgFlags {
        MsgFlags(self.0 | rhs.0)
    }
}

/// Identity of a module instance as seen by the messenger
#[derive(Debug, Clone)]
pub struct Receiver {
    id: InstanceId,
    name: String,
    detector: Option<Arc<Detector>>,
}

impl Receiver {
    pub fn new(id: InstanceId, name: &str, detector: Option<Arc<Detector>>) -> Self {
        Self {
            id,
            name: name.to_string(),
            detector,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Display name of the instance, e.g. `SimplePropagation:dut`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detector(&self) -> Option<&Arc<Detector>> {
        self.detector.as_ref()
    }
}

/// Location of a bound slot inside the per-event message store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRef {
    pub(crate) owner: InstanceId,
    pub(crate) index: usize,
}

/// Handle to a single-message input, returned by `bind_single`
#[derive(Debug)]
pub struct SingleSlot<T> {
    pub(crate) slot: SlotRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SingleSlot<T> {
    pub(crate) fn new(slot: SlotRef) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for SingleSlot<T> {
    fn clone(&self) -> Self {
        Self::new(self.slot)
    }
}

/// Handle to a multi-message input, returned by `bind_multi`
#[derive(Debug)]
pub struct MultiSlot<T> {
    pub(crate) slot: SlotRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MultiSlot<T> {
    pub(crate) fn new(slot: SlotRef) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for MultiSlot<T> {
    fn clone(&self) -> Self {
        Self::new(self.slot)
    }
}

/// Callback of a listener delegate, already wrapped around the type check
pub(crate) type ListenerFn = Arc<dyn Fn(&AnyMessage) -> Result<()> + Send + Sync>;

pub(crate) enum DelegateKind {
    Single,
    Multi,
    Listener(ListenerFn),
}

impl DelegateKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            DelegateKind::Single => "single",
            DelegateKind::Multi => "multi",
            DelegateKind::Listener(_) => "listener",
        }
    }
}

/// Binding of one module instance to one message type
pub(crate) struct Delegate {
    pub(crate) receiver: Receiver,
    pub(crate) slot: usize,
    pub(crate) flags: MsgFlags,
    pub(crate) kind: DelegateKind,
}

impl Delegate {
    /// Detector scoping: a delegate of a detector-scoped instance only takes
    /// global messages and messages of its own detector
    pub(crate) fn accepts(&self, detector: Option<&Detector>) -> bool {
        match (detector, self.receiver.detector()) {
            (Some(message_detector), Some(own)) => {
                message_detector.name() == own.name() || self.flags.contains(MsgFlags::IGNORE_NAME)
            }
            _ => true,
        }
    }
}

/// Opaque handle allowing constant-time removal of a delegate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateHandle {
    pub(crate) type_id: TypeId,
    pub(crate) detector_key: String,
    pub(crate) index: usize,
}

/// Wrap a typed listener closure into the type-erased form
pub(crate) fn erase_listener<T, F>(receiver_name: String, callback: F) -> ListenerFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<Message<T>>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(move |message: &AnyMessage| match message.downcast::<T>() {
        Some(typed) => callback(typed),
        None => Err(crate::core::error::FrameworkError::logic(format!(
            "listener of {} received a message of type {}",
            receiver_name,
            message.type_name()
        ))),
    })
}
