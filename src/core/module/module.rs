use crate::core::error::Result;
use crate::core::messenger::Event;
use serde::{Deserialize, Serialize};

/// How the event loop may schedule the `run` calls of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadSafety {
    /// `run` must never be called concurrently; forces a single-threaded run
    #[default]
    NotThreadSafe,
    /// `run` may be called for several events at the same time
    ThreadSafe,
    /// Thread-safe, but `run` must see the events in increasing order
    Sequential,
}

/// A unit of simulation work.
///
/// Instances are created by the factory registered for the module type,
/// which is also the only place where inputs can be bound. The
/// [`ModuleManager`](crate::core::module::ModuleManager) then drives the
/// lifecycle: `init` once, `run` once per event, `finalize` once.
///
/// `run` takes `&self` because thread-safe modules are shared between the
/// workers of the event loop; state that changes per event must live behind
/// a lock or an atomic.
pub trait Module: Send + Sync {
    /// Called once before the first event
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called on every worker thread before it processes its first event
    fn initialize_thread(&self) -> Result<()> {
        Ok(())
    }

    /// Process one event
    fn run(&self, event: &mut Event<'_>) -> Result<()>;

    /// Called on every worker thread after it processed its last event
    fn finalize_thread(&self) -> Result<()> {
        Ok(())
    }

    /// Called once after the last event
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::NotThreadSafe
    }
}
