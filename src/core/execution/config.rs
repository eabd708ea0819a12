//! Configuration for event loop execution
//!
//! This module provides the run settings read from the header section of the
//! main configuration file, including concurrency settings and the worker pool.

use crate::core::config::Configuration;
use crate::core::error::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Enumeration of supported concurrency modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConcurrencyMode {
    /// All events are processed one after the other on the calling thread
    #[default]
    SingleThreaded,
    /// Whole events are distributed over a Rayon worker pool
    Rayon,
}

/// Global settings of a simulation run
///
/// Built from the header section with [`SimulationConfig::from_configuration`]
/// or through the builder methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of events to simulate
    pub number_of_events: u64,
    /// The concurrency mode to use for the event loop
    pub concurrency_mode: ConcurrencyMode,
    /// The size of the worker pool; defaults to the available parallelism.
    /// Only relevant when concurrency_mode is Rayon
    pub thread_pool_size: Option<usize>,
    /// Fail instead of falling back to one thread when a module is not thread-safe
    pub fail_on_thread_unsafe: bool,
    /// Seed of the per-event random generators; drawn from entropy if unset
    pub random_seed: Option<u64>,
    /// Geometry description file
    pub detectors_file: Option<PathBuf>,
    /// Module collections to enable; empty enables all
    pub modules: Vec<String>,
    /// Log level requested by the configuration file
    pub log_level: Option<String>,
}

impl SimulationConfig {
    /// Create a new simulation configuration with default values
    ///
    /// Default configuration processes one event single-threaded
    pub fn new() -> Self {
        Self {
            number_of_events: 1,
            concurrency_mode: ConcurrencyMode::default(),
            thread_pool_size: None,
            fail_on_thread_unsafe: false,
            random_seed: None,
            detectors_file: None,
            modules: Vec::new(),
            log_level: None,
        }
    }

    /// Read the run settings from the header section
    ///
    /// # Keys
    /// `number_of_events`, `multithreading`, `workers`, `fail_on_thread_unsafe`,
    /// `random_seed`, `detectors_file`, `modules`, `log_level`
    pub fn from_configuration(header: &Configuration) -> Result<Self> {
        let mut config = Self::new();
        config.number_of_events = header.get_or("number_of_events", 1)?;
        if header.get_or("multithreading", false)? {
            config.concurrency_mode = ConcurrencyMode::Rayon;
        }
        if header.has("workers") {
            let workers: usize = header.get("workers")?;
            if workers == 0 {
                warn!("Number of workers is zero, falling back to a single thread");
            }
            config.thread_pool_size = Some(workers.max(1));
        }
        config.fail_on_thread_unsafe = header.get_or("fail_on_thread_unsafe", false)?;
        if header.has("random_seed") {
            config.random_seed = Some(header.get("random_seed")?);
        }
        if header.has("detectors_file") {
            config.detectors_file = Some(header.get_path("detectors_file")?);
        }
        if header.has("modules") {
            config.modules = header.get_array("modules")?;
        }
        if header.has("log_level") {
            config.log_level = Some(header.get("log_level")?);
        }
        Ok(config)
    }

    /// Set the number of events to simulate
    pub fn with_events(mut self, events: u64) -> Self {
        self.number_of_events = events;
        self
    }

    /// Set the concurrency mode for the event loop
    ///
    /// # Arguments
    /// * `mode` - The concurrency mode to use
    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency_mode = mode;
        self
    }

    /// Set the worker pool size for parallel execution
    ///
    /// # Note
    /// This setting only affects execution when concurrency_mode is Rayon
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    /// Turn the single-threaded fallback into a configuration error
    pub fn with_strict_thread_safety(mut self, strict: bool) -> Self {
        self.fail_on_thread_unsafe = strict;
        self
    }

    /// Fix the seed of the random generators
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Number of workers requested for a multithreaded run
    pub fn workers(&self) -> usize {
        self.thread_pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.concurrency_mode, ConcurrencyMode::SingleThreaded);
        assert_eq!(config.number_of_events, 1);
        assert_eq!(config.thread_pool_size, None);
        assert!(!config.fail_on_thread_unsafe);
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::new()
            .with_events(10)
            .with_concurrency(ConcurrencyMode::Rayon)
            .with_thread_pool_size(4)
            .with_seed(7);

        assert_eq!(config.concurrency_mode, ConcurrencyMode::Rayon);
        assert_eq!(config.workers(), 4);
        assert_eq!(config.number_of_events, 10);
        assert_eq!(config.random_seed, Some(7));
    }

    #[test]
    fn test_from_header() {
        let mut header = Configuration::new("");
        header.set("number_of_events", 25);
        header.set("multithreading", true);
        header.set("workers", 3);
        header.set("modules", "builtin, extra");
        header.set("random_seed", 99);

        let config = SimulationConfig::from_configuration(&header).unwrap();
        assert_eq!(config.number_of_events, 25);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Rayon);
        assert_eq!(config.workers(), 3);
        assert_eq!(config.modules, vec!["builtin".to_string(), "extra".to_string()]);
        assert_eq!(config.random_seed, Some(99));
    }

    #[test]
    fn test_zero_workers_fall_back_to_one() {
        let mut header = Configuration::new("");
        header.set("multithreading", true);
        header.set("workers", 0);
        let config = SimulationConfig::from_configuration(&header).unwrap();
        assert_eq!(config.workers(), 1);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Rayon);
    }

    #[test]
    fn test_bad_value_reported() {
        let mut header = Configuration::new("");
        header.set("number_of_events", "many");
        assert!(SimulationConfig::from_configuration(&header).is_err());
    }
}
