//! Built-in modules: a minimal deposition, propagation, digitization and
//! output chain, enough to run the framework end to end.

pub mod deposition;
pub mod digitizer;
pub mod objects;
pub mod propagation;
pub mod writer;

pub use deposition::DepositionGenerator;
pub use digitizer::DefaultDigitizer;
pub use propagation::SimplePropagation;
pub use writer::JsonWriter;

use crate::core::module::{ModuleCollection, ModuleDescriptor};

/// Collection holding the built-in modules, enabled as `builtin`
pub fn builtin() -> ModuleCollection {
    ModuleCollection::new("builtin")
        .with(ModuleDescriptor::unique("DepositionGenerator", DepositionGenerator::new))
        .with(ModuleDescriptor::per_detector("SimplePropagation", SimplePropagation::new))
        .with(ModuleDescriptor::per_detector("DefaultDigitizer", DefaultDigitizer::new))
        .with(ModuleDescriptor::unique("JsonWriter", JsonWriter::new))
}

/// Every collection shipped with the crate
pub fn collections() -> Vec<ModuleCollection> {
    vec![builtin()]
}
