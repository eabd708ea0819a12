//! Typed message passing between module instances.
//!
//! Modules bind slots for the message types they consume while they are
//! constructed. During the run the [`Messenger`] is read-only and every event
//! collects its messages in its own [`MessageStore`].

pub mod delegate;
pub mod event;
pub mod message;
pub mod messenger;
pub mod store;

pub use delegate::{DelegateHandle, MsgFlags, MultiSlot, Receiver, SingleSlot};
pub use event::{event_rng, event_seed, Event};
pub use message::Message;
pub use messenger::Messenger;
pub use store::MessageStore;
