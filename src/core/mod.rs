pub mod config;
pub mod error;
pub mod execution;
pub mod geometry;
pub mod logging;
pub mod messenger;
pub mod module;
pub mod simulation;
pub mod types;
