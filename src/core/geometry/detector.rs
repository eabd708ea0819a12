use serde::{Deserialize, Serialize};

/// Handle to one detector in the setup.
///
/// The core only looks at the name and the type; placement is carried along
/// for the modules that need it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detector {
    name: String,
    detector_type: String,
    position: [f64; 3],
    orientation: [f64; 3],
}

impl Detector {
    /// Create a detector at the origin without rotation
    pub fn new(name: &str, detector_type: &str) -> Self {
        Self {
            name: name.to_string(),
            detector_type: detector_type.to_string(),
            position: [0.0; 3],
            orientation: [0.0; 3],
        }
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.position = position;
        self
    }

    pub fn with_orientation(mut self, orientation: [f64; 3]) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model type, used to instantiate modules by `type`
    pub fn detector_type(&self) -> &str {
        &self.detector_type
    }

    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    /// Rotation angles around x, y and z
    pub fn orientation(&self) -> [f64; 3] {
        self.orientation
    }
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.detector_type)
    }
}
