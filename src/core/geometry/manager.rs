use super::detector::Detector;
use crate::core::config::{ConfigReader, Configuration};
use crate::core::error::{FrameworkError, Result};
use log::debug;
use std::sync::Arc;

/// Owns the detectors of the setup and resolves them by name or type
#[derive(Debug, Default)]
pub struct GeometryManager {
    detectors: Vec<Arc<Detector>>,
}

impl GeometryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the setup from a geometry description: every section is a
    /// detector named after the section, with a required `type` key
    pub fn from_config(reader: &ConfigReader) -> Result<Self> {
        let mut geometry = Self::new();
        for section in reader.module_sections() {
            let detector_type: String = section.get("type")?;
            let mut detector = Detector::new(section.name(), &detector_type);
            if section.has("position") {
                detector = detector.with_position(read_vector(section, "position")?);
            }
            if section.has("orientation") {
                detector = detector.with_orientation(read_vector(section, "orientation")?);
            }
            geometry.add_detector(detector)?;
        }
        Ok(geometry)
    }

    /// Add a detector; names must be unique
    pub fn add_detector(&mut self, detector: Detector) -> Result<Arc<Detector>> {
        if self.has_detector(detector.name()) {
            return Err(FrameworkError::DuplicateDetector(detector.name().to_string()));
        }
        debug!("Adding detector {}", detector);
        let detector = Arc::new(detector);
        self.detectors.push(detector.clone());
        Ok(detector)
    }

    pub fn has_detector(&self, name: &str) -> bool {
        self.detectors.iter().any(|d| d.name() == name)
    }

    /// Resolve a detector by name
    pub fn detector(&self, name: &str) -> Result<Arc<Detector>> {
        self.detectors
            .iter()
            .find(|d| d.name() == name)
            .cloned()
            .ok_or_else(|| FrameworkError::DetectorNotFound(name.to_string()))
    }

    /// All detectors of a given type, in the order they were added
    pub fn detectors_by_type(&self, detector_type: &str) -> Result<Vec<Arc<Detector>>> {
        let matching: Vec<Arc<Detector>> = self
            .detectors
            .iter()
            .filter(|d| d.detector_type() == detector_type)
            .cloned()
            .collect();
        if matching.is_empty() {
            return Err(FrameworkError::DetectorTypeNotFound(detector_type.to_string()));
        }
        Ok(matching)
    }

    /// All detectors, in the order they were added
    pub fn detectors(&self) -> &[Arc<Detector>] {
        &self.detectors
    }
}

fn read_vector(section: &Configuration, key: &str) -> Result<[f64; 3]> {
    let values: Vec<f64> = section.get_array(key)?;
    values
        .try_into()
        .map_err(|_| section.invalid_value(key, "expected three components"))
}
