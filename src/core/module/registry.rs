use super::context::ModuleContext;
use super::module::Module;
use crate::core::config::Configuration;
use crate::core::error::{FrameworkError, Result};
use crate::core::geometry::{Detector, GeometryManager};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Whether a module type is instantiated once per run or once per detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleScope {
    Unique,
    PerDetector,
}

type UniqueFactory =
    Box<dyn Fn(&Configuration, &mut ModuleContext<'_>, Arc<GeometryManager>) -> Result<Box<dyn Module>> + Send + Sync>;
type DetectorFactory =
    Box<dyn Fn(&Configuration, &mut ModuleContext<'_>, Arc<Detector>) -> Result<Box<dyn Module>> + Send + Sync>;

/// Entry point of a module type
pub enum ModuleFactory {
    /// Receives the geometry manager
    Unique(UniqueFactory),
    /// Receives the detector the instance is responsible for
    PerDetector(DetectorFactory),
}

/// Registration of one module type: its name and its factory
pub struct ModuleDescriptor {
    name: String,
    factory: ModuleFactory,
}

impl ModuleDescriptor {
    /// Register a module instantiated once for the whole run
    pub fn unique<M, F>(name: &str, factory: F) -> Self
    where
        M: Module + 'static,
        F: Fn(&Configuration, &mut ModuleContext<'_>, Arc<GeometryManager>) -> Result<M> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            factory: ModuleFactory::Unique(Box::new(move |config, context, geometry| {
                factory(config, context, geometry).map(|module| Box::new(module) as Box<dyn Module>)
            })),
        }
    }

    /// Register a module instantiated once per detector
    pub fn per_detector<M, F>(name: &str, factory: F) -> Self
    where
        M: Module + 'static,
        F: Fn(&Configuration, &mut ModuleContext<'_>, Arc<Detector>) -> Result<M> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            factory: ModuleFactory::PerDetector(Box::new(move |config, context, detector| {
                factory(config, context, detector).map(|module| Box::new(module) as Box<dyn Module>)
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> ModuleScope {
        match self.factory {
            ModuleFactory::Unique(_) => ModuleScope::Unique,
            ModuleFactory::PerDetector(_) => ModuleScope::PerDetector,
        }
    }

    pub(crate) fn factory(&self) -> &ModuleFactory {
        &self.factory
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("scope", &self.scope())
            .finish()
    }
}

/// Named group of module types that can be enabled together
#[derive(Debug)]
pub struct ModuleCollection {
    name: String,
    descriptors: Vec<ModuleDescriptor>,
}

impl ModuleCollection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptors: Vec::new(),
        }
    }

    /// Builder-style variant of [`add`](Self::add)
    pub fn with(mut self, descriptor: ModuleDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn add(&mut self, descriptor: ModuleDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Lookup table from module type name to its descriptor.
///
/// Built once at startup from explicit registrations; nothing is discovered
/// at run time.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    descriptors: HashMap<String, ModuleDescriptor>,
    collections: BTreeMap<String, Vec<String>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the enabled collections out of `available`.
    /// An empty `enabled` list enables every collection.
    pub fn from_collections(available: Vec<ModuleCollection>, enabled: &[String]) -> Result<Self> {
        for name in enabled {
            if !available.iter().any(|c| c.name() == name) {
                return Err(FrameworkError::CollectionNotFound(name.clone()));
            }
        }

        let mut registry = Self::new();
        for collection in available {
            if enabled.is_empty() || enabled.iter().any(|name| name == collection.name()) {
                registry.add_collection(collection)?;
            } else {
                debug!("Module collection {} is not enabled", collection.name());
            }
        }
        Ok(registry)
    }

    /// Register a single module type
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<()> {
        if self.descriptors.contains_key(descriptor.name()) {
            return Err(FrameworkError::DuplicateModule(descriptor.name().to_string()));
        }
        debug!("Registered module {} ({:?})", descriptor.name(), descriptor.scope());
        self.descriptors.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// Register every module type of a collection
    pub fn add_collection(&mut self, collection: ModuleCollection) -> Result<()> {
        let mut names = Vec::with_capacity(collection.len());
        for descriptor in collection.descriptors {
            names.push(descriptor.name().to_string());
            self.register(descriptor)?;
        }
        debug!("Enabled module collection {} with {} modules", collection.name, names.len());
        self.collections.insert(collection.name, names);
        Ok(())
    }

    /// Descriptor of a module type
    pub fn resolve(&self, name: &str) -> Result<&ModuleDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| FrameworkError::ModuleNotFound(name.to_string()))
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Names of all registered module types, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Module types registered through the named collection
    pub fn collection(&self, name: &str) -> Result<&[String]> {
        self.collections
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| FrameworkError::CollectionNotFound(name.to_string()))
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::messenger::Event;

    struct Nothing;

    impl Module for Nothing {
        fn run(&self, _event: &mut Event<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn collection(name: &str, modules: &[&str]) -> ModuleCollection {
        let mut collection = ModuleCollection::new(name);
        for module in modules {
            collection.add(ModuleDescriptor::unique(module, |_, _, _| Ok(Nothing)));
        }
        collection
    }

    #[test]
    fn test_resolve_and_scope() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::unique("Source", |_, _, _| Ok(Nothing)))
            .unwrap();
        registry
            .register(ModuleDescriptor::per_detector("Sink", |_, _, _| Ok(Nothing)))
            .unwrap();

        assert_eq!(registry.resolve("Source").unwrap().scope(), ModuleScope::Unique);
        assert_eq!(registry.resolve("Sink").unwrap().scope(), ModuleScope::PerDetector);
        assert!(matches!(
            registry.resolve("Missing"),
            Err(FrameworkError::ModuleNotFound(_))
        ));
        assert_eq!(registry.names(), vec!["Sink".to_string(), "Source".to_string()]);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::unique("Source", |_, _, _| Ok(Nothing)))
            .unwrap();
        let err = registry
            .register(ModuleDescriptor::unique("Source", |_, _, _| Ok(Nothing)))
            .unwrap_err();
        assert!(matches!(err, FrameworkError::DuplicateModule(_)));
    }

    #[test]
    fn test_collection_selection() {
        let available = vec![collection("builtin", &["A", "B"]), collection("extra", &["C"])];
        let registry = ModuleRegistry::from_collections(available, &["extra".to_string()]).unwrap();
        assert!(registry.has_module("C"));
        assert!(!registry.has_module("A"));
        assert_eq!(registry.collection("extra").unwrap(), &["C".to_string()]);

        let available = vec![collection("builtin", &["A", "B"]), collection("extra", &["C"])];
        let registry = ModuleRegistry::from_collections(available, &[]).unwrap();
        assert_eq!(registry.collections().count(), 2);

        let err = ModuleRegistry::from_collections(vec![], &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, FrameworkError::CollectionNotFound(_)));
    }
}
