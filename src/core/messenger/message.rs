use crate::core::geometry::Detector;
use std::any::{Any, TypeId};
use std::sync::Arc;
use uuid::Uuid;

/// Payload dispatched between modules, optionally tied to one detector.
///
/// A message is immutable once dispatched; receivers get it behind an `Arc`
/// shared with every other receiver of the same event.
#[derive(Debug)]
pub struct Message<T> {
    id: Uuid,
    data: T,
    detector: Option<Arc<Detector>>,
}

impl<T> Message<T> {
    /// Message that is not bound to any detector
    pub fn new(data: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            detector: None,
        }
    }

    /// Message produced for a specific detector
    pub fn for_detector(data: T, detector: Arc<Detector>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            detector: Some(detector),
        }
    }

    /// Unique id, useful to follow a message through the log
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn detector(&self) -> Option<&Arc<Detector>> {
        self.detector.as_ref()
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> std::ops::Deref for Message<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// Type-erased message as stored in the per-event slots
#[derive(Clone)]
pub(crate) struct AnyMessage {
    inner: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    detector: Option<Arc<Detector>>,
}

impl AnyMessage {
    pub(crate) fn new<T: Send + Sync + 'static>(message: Message<T>) -> Self {
        let detector = message.detector.clone();
        Self {
            inner: Arc::new(message),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            detector,
        }
    }

    /// Recover the typed message; `None` on a type mismatch
    pub(crate) fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<Message<T>>> {
        self.inner.clone().downcast::<Message<T>>().ok()
    }

    /// Type id of the payload
    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn detector(&self) -> Option<&Detector> {
        self.detector.as_deref()
    }
}

impl std::fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyMessage")
            .field("type_name", &self.type_name)
            .field("detector", &self.detector.as_ref().map(|d| d.name().to_string()))
            .finish()
    }
}
