pub mod core;
pub mod modules;

// Re-export commonly used types
pub use crate::core::config::{ConfigReader, Configuration};
pub use crate::core::error::{FrameworkError, Result};
pub use crate::core::execution::{ConcurrencyMode, SimulationConfig};
pub use crate::core::geometry::{Detector, GeometryManager};
pub use crate::core::messenger::{Event, Message, MsgFlags};
pub use crate::core::module::{Module, ModuleContext, ModuleDescriptor, ModuleManager, ThreadSafety};
pub use crate::core::simulation::Simulation;
