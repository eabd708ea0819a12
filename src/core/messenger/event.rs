use super::delegate::{MultiSlot, Receiver, SingleSlot};
use super::message::Message;
use super::messenger::Messenger;
use super::store::MessageStore;
use crate::core::error::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// Seed of the random generator of one event, derived from the run seed only
/// so the result does not depend on the worker processing the event
pub fn event_seed(run_seed: u64, event: u64) -> u64 {
    run_seed.wrapping_add(event.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Random generator for one event
pub fn event_rng(run_seed: u64, event: u64) -> StdRng {
    StdRng::seed_from_u64(event_seed(run_seed, event))
}

/// View of the current event handed to [`Module::run`](crate::core::module::Module::run).
///
/// It gives access to the messages received by the running module and lets
/// the module dispatch new messages for the same event.
pub struct Event<'a> {
    number: u64,
    receiver: &'a Receiver,
    messenger: &'a Messenger,
    store: &'a mut MessageStore,
    rng: &'a mut StdRng,
}

impl<'a> Event<'a> {
    pub(crate) fn new(
        receiver: &'a Receiver,
        messenger: &'a Messenger,
        store: &'a mut MessageStore,
        rng: &'a mut StdRng,
    ) -> Self {
        Self {
            number: store.event(),
            receiver,
            messenger,
            store,
            rng,
        }
    }

    /// Event number, starting at 1
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Random generator of this event
    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }

    /// Message received in a single-bound slot, if any
    pub fn single<T: Send + Sync + 'static>(&self, slot: &SingleSlot<T>) -> Option<Arc<Message<T>>> {
        self.store.single(slot)
    }

    /// Messages received in a multi-bound slot, in dispatch order
    pub fn multi<T: Send + Sync + 'static>(&self, slot: &MultiSlot<T>) -> Vec<Arc<Message<T>>> {
        self.store.multi(slot)
    }

    /// Whether any module would receive `message`
    pub fn has_receiver<T: Send + Sync + 'static>(&self, message: &Message<T>) -> bool {
        self.messenger.has_receiver(self.receiver, message)
    }

    /// Send a message to every bound module
    pub fn dispatch<T: Send + Sync + 'static>(&mut self, message: Message<T>) -> Result<()> {
        self.messenger.dispatch_message(self.receiver, message, &mut *self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_event_rng_is_deterministic() {
        let first: u64 = event_rng(42, 7).gen();
        let second: u64 = event_rng(42, 7).gen();
        let other: u64 = event_rng(42, 8).gen();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }
}
