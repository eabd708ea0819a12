//! Configuration sections and the reader for the sectioned configuration format.

pub mod configuration;
pub mod reader;

pub use configuration::Configuration;
pub use reader::ConfigReader;
