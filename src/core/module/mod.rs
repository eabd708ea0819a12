//! Module trait, registry of module types and the manager driving instances.

pub mod context;
pub(crate) mod instance;
pub mod manager;
pub mod module;
pub mod registry;

pub use context::ModuleContext;
pub use instance::ModuleRunStats;
pub use manager::{ManagerState, ModuleManager, RunReport};
pub use module::{Module, ThreadSafety};
pub use registry::{ModuleCollection, ModuleDescriptor, ModuleRegistry, ModuleScope};
