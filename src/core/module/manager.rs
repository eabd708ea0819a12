use super::context::ModuleContext;
use super::instance::{ModuleInstance, ModuleRunStats};
use super::module::ThreadSafety;
use super::registry::{ModuleDescriptor, ModuleFactory, ModuleRegistry};
use crate::core::config::{ConfigReader, Configuration};
use crate::core::error::{FrameworkError, Phase, Result};
use crate::core::execution::config::{ConcurrencyMode, SimulationConfig};
use crate::core::execution::event_loop::EventLoop;
use crate::core::geometry::{Detector, GeometryManager};
use crate::core::logging::LogSection;
use crate::core::messenger::{Messenger, Receiver};
use crate::core::types::{InstanceId, InstantiationPriority, ModuleIdentifier};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Lifecycle position of the manager; every phase runs at most once and in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Empty,
    Loaded,
    Initialized,
    Ran,
    Finalized,
}

/// Summary of a completed event loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Number of events processed
    pub events: u64,
    /// Workers actually used; 1 for a single-threaded run
    pub workers: usize,
    /// Counters per instance, in run order
    pub modules: Vec<ModuleRunStats>,
}

impl RunReport {
    /// Counters of the instance with the given display name, e.g. `Foo:dut`
    pub fn module(&self, name: &str) -> Option<&ModuleRunStats> {
        self.modules.iter().find(|stats| stats.module == name)
    }
}

/// Instantiates modules from the configuration and drives their lifecycle.
///
/// Owns the [`Messenger`] shared by all instances and the ordered list of
/// instances. Instances run in the order in which they were added; an
/// instance replaced by a more specific one is removed and the replacement
/// is appended at the end.
pub struct ModuleManager {
    messenger: Messenger,
    instances: Vec<ModuleInstance>,
    next_id: usize,
    state: ManagerState,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self {
            messenger: Messenger::new(),
            instances: Vec::new(),
            next_id: 0,
            state: ManagerState::Empty,
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Identifiers of the instances in run order
    pub fn identifiers(&self) -> Vec<&ModuleIdentifier> {
        self.instances.iter().map(ModuleInstance::identifier).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Create the instances of every module section of `reader`.
    ///
    /// Sections are processed in file order. For each section the module type
    /// is resolved through `registry` and the instances it asks for are
    /// compared with the existing ones: a more specific instantiation replaces
    /// the existing instance, a less specific one is dropped, an equally
    /// specific one is an error.
    pub fn load(&mut self, reader: &ConfigReader, registry: &ModuleRegistry, geometry: Arc<GeometryManager>) -> Result<()> {
        self.expect_state(ManagerState::Empty, "load")?;

        for section in reader.module_sections() {
            let descriptor = registry.resolve(section.name())?;
            info!("Loaded module {}", descriptor.name());

            let targets = match descriptor.factory() {
                ModuleFactory::Unique(_) => vec![(ModuleIdentifier::unique(descriptor.name()), None)],
                ModuleFactory::PerDetector(_) => detector_targets(descriptor, section, &geometry)?,
            };

            for (identifier, detector) in targets {
                if !self.claim_slot(&identifier)? {
                    continue;
                }
                self.construct(descriptor, section, identifier, detector, &geometry)?;
            }
        }

        info!("Created {} module instances", self.instances.len());
        self.state = ManagerState::Loaded;
        Ok(())
    }

    /// Decide whether `identifier` may be instantiated, removing an existing
    /// instance it overrides
    fn claim_slot(&mut self, identifier: &ModuleIdentifier) -> Result<bool> {
        let key = identifier.key();
        let existing = match self.instances.iter().position(|i| i.identifier().key() == key) {
            Some(position) => position,
            None => return Ok(true),
        };

        let current = self.instances[existing].identifier().priority();
        if identifier.priority().overrides(current) {
            let replaced = self.instances.remove(existing);
            let removed = self.messenger.remove_delegates(replaced.receiver().id());
            debug!(
                "Replacing {} (priority {}) by a more specific instantiation (priority {}), removed {} delegates",
                replaced.identifier(),
                current.class(),
                identifier.priority().class(),
                removed
            );
            Ok(true)
        } else if current.overrides(identifier.priority()) {
            debug!(
                "Ignoring instantiation of {} with priority {}, already instantiated with priority {}",
                identifier,
                identifier.priority().class(),
                current.class()
            );
            Ok(false)
        } else {
            Err(FrameworkError::AmbiguousInstantiation {
                module: identifier.name().to_string(),
                detector: identifier.detector().to_string(),
            })
        }
    }

    fn construct(
        &mut self,
        descriptor: &ModuleDescriptor,
        section: &Configuration,
        identifier: ModuleIdentifier,
        detector: Option<Arc<Detector>>,
        geometry: &Arc<GeometryManager>,
    ) -> Result<()> {
        let id = InstanceId::new(self.next_id);
        self.next_id += 1;
        let receiver = Receiver::new(id, &identifier.to_string(), detector.clone());
        let _section = LogSection::enter(format!("C:{}", identifier));

        let module = {
            let mut context = ModuleContext::new(&mut self.messenger, receiver.clone(), &identifier);
            match (descriptor.factory(), detector) {
                (ModuleFactory::Unique(factory), _) => factory(section, &mut context, geometry.clone()),
                (ModuleFactory::PerDetector(factory), Some(detector)) => factory(section, &mut context, detector),
                (ModuleFactory::PerDetector(_), None) => Err(FrameworkError::logic(format!(
                    "detector-scoped module {} constructed without a detector",
                    identifier
                ))),
            }
        };

        match module {
            Ok(module) => {
                debug!("Constructed {} as instance {}", identifier, id);
                self.instances.push(ModuleInstance::new(identifier, receiver, module));
                Ok(())
            }
            Err(err) => {
                self.messenger.remove_delegates(id);
                Err(err.in_module(identifier.to_string(), Phase::Construction))
            }
        }
    }

    /// Initialize every instance in run order
    pub fn init(&mut self) -> Result<()> {
        self.expect_state(ManagerState::Loaded, "init")?;
        for instance in &mut self.instances {
            debug!("Initializing {}", instance.identifier());
            instance.init()?;
        }
        self.state = ManagerState::Initialized;
        Ok(())
    }

    /// Run the event loop.
    ///
    /// Multithreading is only used when requested with more than one worker
    /// and every instance is thread-safe; otherwise the run falls back to a
    /// single thread, or fails in strict mode.
    pub fn run(&mut self, config: &SimulationConfig) -> Result<RunReport> {
        self.expect_state(ManagerState::Initialized, "run")?;
        let workers = self.plan_workers(config)?;
        let events = config.number_of_events;
        let seed = config.random_seed.unwrap_or_else(rand::random);

        info!(
            "Running {} events with {} {} (random seed {})",
            events,
            workers,
            if workers == 1 { "worker" } else { "workers" },
            seed
        );
        for instance in &self.instances {
            instance.reset_stats();
        }

        self.state = ManagerState::Ran;
        let event_loop = EventLoop::new(&self.instances, &self.messenger, seed);
        if workers > 1 {
            event_loop.run_multithreaded(events, workers)?;
        } else {
            event_loop.run_single_threaded(events)?;
        }

        let report = RunReport {
            events,
            workers,
            modules: self.instances.iter().map(ModuleInstance::stats).collect(),
        };
        info!("Finished {} events", events);
        Ok(report)
    }

    fn plan_workers(&self, config: &SimulationConfig) -> Result<usize> {
        if config.concurrency_mode != ConcurrencyMode::Rayon {
            return Ok(1);
        }
        let workers = config.workers();
        if workers < 2 {
            debug!("Multithreading requested with a single worker");
            return Ok(1);
        }

        let unsafe_modules: Vec<String> = self
            .instances
            .iter()
            .filter(|instance| instance.thread_safety() == ThreadSafety::NotThreadSafe)
            .map(|instance| instance.identifier().to_string())
            .collect();
        if unsafe_modules.is_empty() {
            return Ok(workers);
        }
        if config.fail_on_thread_unsafe {
            return Err(FrameworkError::ThreadUnsafeModules {
                modules: unsafe_modules,
            });
        }
        warn!(
            "Modules {} are not thread-safe, running single-threaded",
            unsafe_modules.join(", ")
        );
        Ok(1)
    }

    /// Finalize every instance in run order
    pub fn finalize(&mut self) -> Result<()> {
        self.expect_state(ManagerState::Ran, "finalize")?;
        for instance in &mut self.instances {
            debug!("Finalizing {}", instance.identifier());
            instance.finalize()?;
        }
        self.state = ManagerState::Finalized;
        Ok(())
    }

    fn expect_state(&self, expected: ManagerState, phase: &str) -> Result<()> {
        if self.state != expected {
            return Err(FrameworkError::logic(format!(
                "cannot {} modules in state {:?}, expected {:?}",
                phase, self.state, expected
            )));
        }
        Ok(())
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Detectors a detector-scoped section applies to, with the priority class
/// of each selection. Names come first, then types for the detectors not
/// already named, and all detectors if neither key is given.
fn detector_targets(
    descriptor: &ModuleDescriptor,
    section: &Configuration,
    geometry: &GeometryManager,
) -> Result<Vec<(ModuleIdentifier, Option<Arc<Detector>>)>> {
    let module = descriptor.name();
    let mut targets = Vec::new();
    let mut named = HashSet::new();

    if section.has("name") {
        for name in section.get_array::<String>("name")? {
            let detector = geometry.detector(&name)?;
            let identifier = ModuleIdentifier::for_detector(module, detector.name(), InstantiationPriority::Name);
            named.insert(detector.name().to_string());
            targets.push((identifier, Some(detector)));
        }
    }

    if section.has("type") {
        for detector_type in section.get_array::<String>("type")? {
            for detector in geometry.detectors_by_type(&detector_type)? {
                if named.contains(detector.name()) {
                    continue;
                }
                let identifier = ModuleIdentifier::for_detector(module, detector.name(), InstantiationPriority::Type);
                targets.push((identifier, Some(detector)));
            }
        }
    }

    if !section.has("name") && !section.has("type") {
        for detector in geometry.detectors() {
            let identifier = ModuleIdentifier::for_detector(module, detector.name(), InstantiationPriority::Wildcard);
            targets.push((identifier, Some(detector.clone())));
        }
    }

    Ok(targets)
}
