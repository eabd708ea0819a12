use super::sequencer::SequenceGate;
use crate::core::error::{FrameworkError, Result};
use crate::core::messenger::{event_rng, Messenger};
use crate::core::module::instance::ModuleInstance;
use crate::core::module::ThreadSafety;
use log::{debug, error};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

type PanicPayload = Box<dyn Any + Send + 'static>;

/// Drives the module chain over all events.
///
/// Within an event the instances run in list order. In the multithreaded
/// loop every worker claims whole events from a shared counter; sequential
/// modules additionally wait for their turn at a [`SequenceGate`].
pub(crate) struct EventLoop<'a> {
    instances: &'a [ModuleInstance],
    messenger: &'a Messenger,
    seed: u64,
}

/// State shared by the workers of one multithreaded run
struct WorkerShared {
    events: u64,
    next_event: AtomicU64,
    aborted: AtomicBool,
    gates: Vec<Option<SequenceGate>>,
    failure: Mutex<Option<FrameworkError>>,
    panicked: Mutex<Option<PanicPayload>>,
}

impl WorkerShared {
    /// Run `f` on a worker; a panic becomes an error of the run and its
    /// payload is kept until every worker has been joined
    fn contain<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(&*payload).to_string();
                let mut panicked = self.panicked.lock().unwrap_or_else(PoisonError::into_inner);
                if panicked.is_none() {
                    *panicked = Some(payload);
                }
                Err(FrameworkError::runtime(format!("module panicked: {}", message)))
            }
        }
    }

    /// Keep the first error, stop claiming events and release all gates
    fn fail(&self, err: FrameworkError) {
        {
            let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            if failure.is_none() {
                error!("Stopping the event loop: {}", err);
                *failure = Some(err);
            }
        }
        self.aborted.store(true, Ordering::SeqCst);
        for gate in self.gates.iter().flatten() {
            gate.abort();
        }
    }
}

impl<'a> EventLoop<'a> {
    pub(crate) fn new(instances: &'a [ModuleInstance], messenger: &'a Messenger, seed: u64) -> Self {
        Self {
            instances,
            messenger,
            seed,
        }
    }

    /// Process events `1..=events` in order on the calling thread
    pub(crate) fn run_single_threaded(&self, events: u64) -> Result<()> {
        for number in 1..=events {
            self.process_event(number, &[])?;
        }
        Ok(())
    }

    /// Process events `1..=events` on a pool of `workers` threads
    pub(crate) fn run_multithreaded(&self, events: u64, workers: usize) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("pixsim-worker-{}", index))
            .build()
            .map_err(|e| FrameworkError::runtime(format!("could not start the worker pool: {}", e)))?;

        let shared = WorkerShared {
            events,
            next_event: AtomicU64::new(1),
            aborted: AtomicBool::new(false),
            gates: self
                .instances
                .iter()
                .map(|instance| {
                    (instance.thread_safety() == ThreadSafety::Sequential).then(|| SequenceGate::new(1))
                })
                .collect(),
            failure: Mutex::new(None),
            panicked: Mutex::new(None),
        };

        pool.scope(|scope| {
            for worker in 0..workers {
                let shared = &shared;
                scope.spawn(move |_| {
                    if let Err(err) = shared.contain(|| self.work(worker, shared)) {
                        shared.fail(err);
                    }
                });
            }
        });

        let WorkerShared { failure, panicked, .. } = shared;
        if let Some(payload) = panicked.into_inner().unwrap_or_else(PoisonError::into_inner) {
            panic::resume_unwind(payload);
        }
        match failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn work(&self, worker: usize, shared: &WorkerShared) -> Result<()> {
        for instance in self.instances {
            instance.initialize_thread()?;
        }

        let mut processed = 0;
        let result = loop {
            if shared.aborted.load(Ordering::SeqCst) {
                break Ok(());
            }
            // Events are claimed in increasing order, so the event a
            // sequential gate waits for is always held by a running worker
            let number = shared.next_event.fetch_add(1, Ordering::SeqCst);
            if number > shared.events {
                break Ok(());
            }
            if let Err(err) = shared.contain(|| self.process_event(number, &shared.gates)) {
                break Err(err);
            }
            processed += 1;
        };
        debug!("Worker {} processed {} events", worker, processed);

        let finalized = self
            .instances
            .iter()
            .try_for_each(|instance| instance.finalize_thread());
        result.and(finalized)
    }

    fn process_event(&self, number: u64, gates: &[Option<SequenceGate>]) -> Result<()> {
        debug!("Running event {}", number);
        let mut store = self.messenger.new_store(number);
        let mut rng = event_rng(self.seed, number);

        for (index, instance) in self.instances.iter().enumerate() {
            match gates.get(index).and_then(Option::as_ref) {
                Some(gate) => {
                    let _turn = gate.enter(number)?;
                    instance.run_event(self.messenger, &mut store, &mut rng)?;
                }
                None => {
                    instance.run_event(self.messenger, &mut store, &mut rng)?;
                }
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
