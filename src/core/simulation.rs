use crate::core::config::ConfigReader;
use crate::core::error::{FrameworkError, Result};
use crate::core::execution::config::SimulationConfig;
use crate::core::geometry::GeometryManager;
use crate::core::module::{ManagerState, ModuleCollection, ModuleManager, ModuleRegistry, RunReport};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

/// A complete simulation set up from a main configuration file.
///
/// Reads the run settings from the header section, builds the geometry and
/// the module registry, and forwards the lifecycle calls to the
/// [`ModuleManager`].
pub struct Simulation {
    reader: ConfigReader,
    config: SimulationConfig,
    geometry: Arc<GeometryManager>,
    registry: ModuleRegistry,
    manager: ModuleManager,
}

impl Simulation {
    /// Read the main configuration file and set up the simulation
    ///
    /// # Arguments
    /// * `path` - Main configuration file
    /// * `overrides` - Header keys set on the command line, replacing the file values
    /// * `collections` - Module collections available to the configuration
    pub fn from_file(path: &Path, overrides: &[(String, String)], collections: Vec<ModuleCollection>) -> Result<Self> {
        info!("Reading configuration {}", path.display());
        let reader = ConfigReader::from_file(path)?;
        Self::new(reader, overrides, collections)
    }

    pub fn new(reader: ConfigReader, overrides: &[(String, String)], collections: Vec<ModuleCollection>) -> Result<Self> {
        let mut header = reader.header();
        for (key, value) in overrides {
            debug!("Overriding {} = {}", key, value);
            header.set(key, value);
        }
        let config = SimulationConfig::from_configuration(&header)?;

        let geometry = match &config.detectors_file {
            Some(path) => {
                info!("Reading detectors from {}", path.display());
                GeometryManager::from_config(&ConfigReader::from_file(path)?)?
            }
            None => GeometryManager::new(),
        };
        let registry = ModuleRegistry::from_collections(collections, &config.modules)?;

        Ok(Self {
            reader,
            config,
            geometry: Arc::new(geometry),
            registry,
            manager: ModuleManager::new(),
        })
    }

    /// Replace the geometry read from `detectors_file`; only possible before loading
    pub fn with_geometry(mut self, geometry: GeometryManager) -> Result<Self> {
        if self.manager.state() != ManagerState::Empty {
            return Err(FrameworkError::logic("geometry can not change after modules are loaded"));
        }
        self.geometry = Arc::new(geometry);
        Ok(self)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run settings, e.g. to apply command line options
    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    pub fn geometry(&self) -> &GeometryManager {
        &self.geometry
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &ModuleManager {
        &self.manager
    }

    pub fn load(&mut self) -> Result<()> {
        self.manager.load(&self.reader, &self.registry, self.geometry.clone())
    }

    pub fn init(&mut self) -> Result<()> {
        self.manager.init()
    }

    pub fn run(&mut self) -> Result<RunReport> {
        self.manager.run(&self.config)
    }

    pub fn finalize(&mut self) -> Result<()> {
        self.manager.finalize()
    }

    /// Load, initialize, run and finalize in one go
    pub fn run_all(&mut self) -> Result<RunReport> {
        self.load()?;
        self.init()?;
        let report = self.run()?;
        self.finalize()?;
        Ok(report)
    }
}
