use serde::{Deserialize, Serialize};

/// Runtime handle of one constructed module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(usize);

impl InstanceId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a configuration section selected the detector of an instance.
///
/// The discriminant is the numeric priority class reported in logs. The
/// precedence is a separate ordering: a section naming a detector beats a
/// section selecting it by type, which beats a section applying to all
/// detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstantiationPriority {
    /// No `name` or `type` given (also used for unique modules)
    Wildcard = 0,
    /// Selected through the `name` key
    Name = 1,
    /// Selected through the `type` key
    Type = 2,
}

impl InstantiationPriority {
    /// Numeric priority class
    pub fn class(self) -> u8 {
        self as u8
    }

    fn precedence(self) -> u8 {
        match self {
            InstantiationPriority::Name => 2,
            InstantiationPriority::Type => 1,
            InstantiationPriority::Wildcard => 0,
        }
    }

    /// Whether an instance with this priority replaces one with `other`
    pub fn overrides(self, other: InstantiationPriority) -> bool {
        self.precedence() > other.precedence()
    }
}

/// Identity of a module instance: module type, detector and priority.
///
/// Two identifiers refer to the same slot in the instance list when their
/// [`key`](ModuleIdentifier::key) matches; the priority decides which one
/// survives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentifier {
    name: String,
    detector: String,
    priority: InstantiationPriority,
}

impl ModuleIdentifier {
    /// Identifier for a unique module
    pub fn unique(name: &str) -> Self {
        Self {
            name: name.to_string(),
            detector: String::new(),
            priority: InstantiationPriority::Wildcard,
        }
    }

    /// Identifier for a detector-scoped module
    pub fn for_detector(name: &str, detector: &str, priority: InstantiationPriority) -> Self {
        Self {
            name: name.to_string(),
            detector: detector.to_string(),
            priority,
        }
    }

    /// Module type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detector name, empty for unique modules
    pub fn detector(&self) -> &str {
        &self.detector
    }

    pub fn priority(&self) -> InstantiationPriority {
        self.priority
    }

    /// Key used to detect overlapping instantiations
    pub fn key(&self) -> (String, String) {
        (self.name.clone(), self.detector.clone())
    }
}

impl std::fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detector.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.detector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        use InstantiationPriority::*;
        assert!(Name.overrides(Type));
        assert!(Name.overrides(Wildcard));
        assert!(Type.overrides(Wildcard));
        assert!(!Wildcard.overrides(Type));
        assert!(!Name.overrides(Name));
    }

    #[test]
    fn test_identifier_display_and_key() {
        let unique = ModuleIdentifier::unique("Writer");
        assert_eq!(unique.to_string(), "Writer");

        let scoped = ModuleIdentifier::for_detector("Foo", "dut", InstantiationPriority::Name);
        let wildcard = ModuleIdentifier::for_detector("Foo", "dut", InstantiationPriority::Wildcard);
        assert_eq!(scoped.to_string(), "Foo:dut");
        assert_eq!(scoped.key(), wildcard.key());
        assert_ne!(scoped, wildcard);
        assert_eq!(scoped.priority().class(), 1);
    }
}
