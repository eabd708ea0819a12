//! Detector handles and the geometry manager that resolves them.

pub mod detector;
pub mod manager;

pub use detector::Detector;
pub use manager::GeometryManager;
