pub mod config;
pub(crate) mod event_loop;
pub mod sequencer;

// Re-export commonly used types
pub use config::{ConcurrencyMode, SimulationConfig};
pub use sequencer::{SequenceGate, Turn};
