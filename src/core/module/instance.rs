use super::module::{Module, ThreadSafety};
use crate::core::error::{Phase, Result};
use crate::core::logging::LogSection;
use crate::core::messenger::{Event, MessageStore, Messenger, Receiver};
use crate::core::types::ModuleIdentifier;
use log::debug;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A constructed module together with its identity and run counters
pub(crate) struct ModuleInstance {
    identifier: ModuleIdentifier,
    receiver: Receiver,
    module: Box<dyn Module>,
    runs: AtomicU64,
    skipped: AtomicU64,
}

/// Run counters of one instance after the event loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRunStats {
    pub module: String,
    pub runs: u64,
    pub skipped: u64,
}

impl ModuleInstance {
    pub(crate) fn new(identifier: ModuleIdentifier, receiver: Receiver, module: Box<dyn Module>) -> Self {
        Self {
            identifier,
            receiver,
            module,
            runs: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub(crate) fn identifier(&self) -> &ModuleIdentifier {
        &self.identifier
    }

    pub(crate) fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub(crate) fn thread_safety(&self) -> ThreadSafety {
        self.module.thread_safety()
    }

    pub(crate) fn init(&mut self) -> Result<()> {
        let _section = LogSection::enter(format!("I:{}", self.identifier));
        self.module.init().map_err(|e| e.in_module(self.identifier.to_string(), Phase::Init))
    }

    pub(crate) fn initialize_thread(&self) -> Result<()> {
        let _section = LogSection::enter(format!("I:{}", self.identifier));
        self.module
            .initialize_thread()
            .map_err(|e| e.in_module(self.identifier.to_string(), Phase::InitializeThread))
    }

    /// Run the module for the event of `store` unless a required input is
    /// missing. Returns whether the module ran.
    pub(crate) fn run_event(&self, messenger: &Messenger, store: &mut MessageStore, rng: &mut StdRng) -> Result<bool> {
        let missing = messenger.missing_required(self.receiver.id(), store);
        if !missing.is_empty() {
            debug!(
                "Skipping {} in event {}: no message of required type {}",
                self.identifier,
                store.event(),
                missing.join(", ")
            );
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        let _section = LogSection::enter(format!("R:{}", self.identifier));
        let mut event = Event::new(&self.receiver, messenger, store, rng);
        self.module
            .run(&mut event)
            .map_err(|e| e.in_module(self.identifier.to_string(), Phase::Run))?;
        self.runs.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    pub(crate) fn finalize_thread(&self) -> Result<()> {
        let _section = LogSection::enter(format!("F:{}", self.identifier));
        self.module
            .finalize_thread()
            .map_err(|e| e.in_module(self.identifier.to_string(), Phase::FinalizeThread))
    }

    pub(crate) fn finalize(&mut self) -> Result<()> {
        let _section = LogSection::enter(format!("F:{}", self.identifier));
        self.module
            .finalize()
            .map_err(|e| e.in_module(self.identifier.to_string(), Phase::Finalize))
    }

    pub(crate) fn reset_stats(&self) {
        self.runs.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> ModuleRunStats {
        ModuleRunStats {
            module: self.identifier.to_string(),
            runs: self.runs.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}
