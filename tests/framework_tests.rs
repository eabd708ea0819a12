use pixsim::core::error::{FrameworkError, Phase};
use pixsim::core::messenger::{MultiSlot, SingleSlot};
use pixsim::core::module::{ModuleCollection, ModuleRegistry, RunReport};
use pixsim::core::types::InstantiationPriority;
use pixsim::{
    ConcurrencyMode, ConfigReader, Detector, Event, GeometryManager, Message, Module, ModuleDescriptor,
    ModuleManager, MsgFlags, Result, SimulationConfig, ThreadSafety,
};
use rand::Rng;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Payload carrying the number of the event it was produced in
#[derive(Debug)]
struct Number(u64);

/// Payload nobody produces
#[derive(Debug)]
struct Orphan;

/// What a consumer saw in one event
#[derive(Debug, Clone)]
struct Record {
    module: String,
    event: u64,
    value: u64,
    id: Option<Uuid>,
}

type Records = Arc<Mutex<Vec<Record>>>;

/// Unique module sending `per_event` numbers every event
struct Source {
    per_event: u64,
    safety: ThreadSafety,
}

impl Module for Source {
    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        for i in 0..self.per_event {
            event.dispatch(Message::new(Number(event.number() * 100 + i)))?;
        }
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        self.safety
    }
}

/// Detector-scoped module recording what its single slot received
struct SingleConsumer {
    name: String,
    input: SingleSlot<Number>,
    records: Records,
}

impl Module for SingleConsumer {
    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        let (value, id) = match event.single(&self.input) {
            Some(message) => (message.0, Some(message.id())),
            None => (0, None),
        };
        self.records.lock().unwrap().push(Record {
            module: self.name.clone(),
            event: event.number(),
            value,
            id,
        });
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::ThreadSafe
    }
}

/// Unique module recording the contents of its multi slot
struct MultiConsumer {
    input: MultiSlot<Number>,
    records: Records,
}

impl Module for MultiConsumer {
    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        for message in event.multi(&self.input) {
            records.push(Record {
                module: "multi".to_string(),
                event: event.number(),
                value: message.0,
                id: Some(message.id()),
            });
        }
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::ThreadSafe
    }
}

/// Sequential module recording the order in which it sees events
struct OrderRecorder {
    order: Arc<Mutex<Vec<u64>>>,
}

impl Module for OrderRecorder {
    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        self.order.lock().unwrap().push(event.number());
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::Sequential
    }
}

/// Thread-safe module taking uneven time per event
struct Jitter {
    thread_inits: Arc<AtomicUsize>,
    thread_finals: Arc<AtomicUsize>,
    fail_at: Option<u64>,
    panic_at: Option<u64>,
}

impl Module for Jitter {
    fn initialize_thread(&self) -> Result<()> {
        self.thread_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        if Some(event.number()) == self.fail_at {
            return Err(FrameworkError::runtime("jitter failed"));
        }
        if Some(event.number()) == self.panic_at {
            panic!("jitter panicked in event {}", event.number());
        }
        let pause = event.rng().gen_range(0..3);
        std::thread::sleep(std::time::Duration::from_millis(pause));
        Ok(())
    }

    fn finalize_thread(&self) -> Result<()> {
        self.thread_finals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::ThreadSafe
    }
}

/// Records one random number per event
struct RandomRecorder {
    values: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl Module for RandomRecorder {
    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        let value = event.rng().gen();
        self.values.lock().unwrap().push((event.number(), value));
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::ThreadSafe
    }
}

#[derive(Default)]
struct Shared {
    records: Records,
    order: Arc<Mutex<Vec<u64>>>,
    randoms: Arc<Mutex<Vec<(u64, u64)>>>,
    thread_inits: Arc<AtomicUsize>,
    thread_finals: Arc<AtomicUsize>,
}

fn registry(shared: &Shared) -> ModuleRegistry {
    let mut collection = ModuleCollection::new("test");
    collection.add(ModuleDescriptor::unique("Source", |config, _, _| {
        Ok(Source {
            per_event: config.get_or("per_event", 1)?,
            safety: ThreadSafety::ThreadSafe,
        })
    }));
    collection.add(ModuleDescriptor::unique("UnsafeSource", |_, _, _| {
        Ok(Source {
            per_event: 1,
            safety: ThreadSafety::NotThreadSafe,
        })
    }));

    let records = shared.records.clone();
    collection.add(ModuleDescriptor::per_detector("Consumer", move |config, context, detector| {
        let flags = if config.get_or("required", true)? {
            MsgFlags::REQUIRED
        } else {
            MsgFlags::NONE
        };
        Ok(SingleConsumer {
            name: detector.name().to_string(),
            input: context.bind_single(flags),
            records: records.clone(),
        })
    }));

    let records = shared.records.clone();
    collection.add(ModuleDescriptor::per_detector("OrphanConsumer", move |config, context, detector| {
        let flags = if config.get_or("required", true)? {
            MsgFlags::REQUIRED
        } else {
            MsgFlags::NONE
        };
        let _orphan: SingleSlot<Orphan> = context.bind_single(flags);
        Ok(SingleConsumer {
            name: detector.name().to_string(),
            input: context.bind_single(MsgFlags::NONE),
            records: records.clone(),
        })
    }));

    let records = shared.records.clone();
    collection.add(ModuleDescriptor::unique("MultiConsumer", move |_, context, _| {
        Ok(MultiConsumer {
            input: context.bind_multi(MsgFlags::NONE),
            records: records.clone(),
        })
    }));

    let order = shared.order.clone();
    collection.add(ModuleDescriptor::unique("OrderRecorder", move |_, _, _| {
        Ok(OrderRecorder { order: order.clone() })
    }));

    let (inits, finals) = (shared.thread_inits.clone(), shared.thread_finals.clone());
    collection.add(ModuleDescriptor::unique("Jitter", move |config, _, _| {
        Ok(Jitter {
            thread_inits: inits.clone(),
            thread_finals: finals.clone(),
            fail_at: if config.has("fail_at") { Some(config.get("fail_at")?) } else { None },
            panic_at: if config.has("panic_at") { Some(config.get("panic_at")?) } else { None },
        })
    }));

    let randoms = shared.randoms.clone();
    collection.add(ModuleDescriptor::unique("RandomRecorder", move |_, _, _| {
        Ok(RandomRecorder { values: randoms.clone() })
    }));

    collection.add(ModuleDescriptor::per_detector("Broken", |config, _, _| {
        let _: u32 = config.get("missing_key")?;
        Ok(Source {
            per_event: 0,
            safety: ThreadSafety::ThreadSafe,
        })
    }));

    ModuleRegistry::from_collections(vec![collection], &[]).unwrap()
}

fn geometry() -> Arc<GeometryManager> {
    let mut geometry = GeometryManager::new();
    geometry.add_detector(Detector::new("dut", "fei4")).unwrap();
    geometry.add_detector(Detector::new("telescope0", "timepix")).unwrap();
    geometry.add_detector(Detector::new("telescope1", "timepix")).unwrap();
    Arc::new(geometry)
}

fn load(text: &str, shared: &Shared) -> Result<(ModuleManager, SimulationConfig)> {
    let reader = ConfigReader::from_text(text)?;
    let config = SimulationConfig::from_configuration(&reader.header())?;
    let mut manager = ModuleManager::new();
    manager.load(&reader, &registry(shared), geometry())?;
    Ok((manager, config))
}

fn run(text: &str, shared: &Shared) -> Result<RunReport> {
    let (mut manager, config) = load(text, shared)?;
    manager.init()?;
    let report = manager.run(&config)?;
    manager.finalize()?;
    Ok(report)
}

fn instance_names(manager: &ModuleManager) -> Vec<String> {
    manager.identifiers().iter().map(|id| id.to_string()).collect()
}

#[test]
fn test_scenario_a_unique_source_feeds_detector_consumer() {
    let shared = Shared::default();
    let report = run(
        r#"
        number_of_events = 3

        [Source]

        [Consumer]
        name = "dut"
        "#,
        &shared,
    )
    .unwrap();

    assert_eq!(report.events, 3);
    assert_eq!(report.module("Consumer:dut").unwrap().runs, 3);

    let records = shared.records.lock().unwrap();
    let values: Vec<u64> = records.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![100, 200, 300]);
    let ids: std::collections::HashSet<_> = records.iter().map(|r| r.id.unwrap()).collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn test_scenario_b_named_instance_beats_wildcard() {
    let shared = Shared::default();
    let (manager, _) = load(
        r#"
        [Consumer]
        name = "dut"

        [Consumer]
        "#,
        &shared,
    )
    .unwrap();

    assert_eq!(
        instance_names(&manager),
        vec!["Consumer:dut", "Consumer:telescope0", "Consumer:telescope1"]
    );
    let priorities: Vec<_> = manager.identifiers().iter().map(|id| id.priority()).collect();
    assert_eq!(
        priorities,
        vec![
            InstantiationPriority::Name,
            InstantiationPriority::Wildcard,
            InstantiationPriority::Wildcard
        ]
    );
    assert_eq!(manager.messenger().delegate_count(), 3);
}

#[test]
fn test_priority_independent_of_file_order() {
    let shared = Shared::default();
    let (manager, _) = load(
        r#"
        [Consumer]

        [Consumer]
        type = "timepix"

        [Consumer]
        name = "dut", "telescope1"
        "#,
        &shared,
    )
    .unwrap();

    let mut summary: Vec<(String, InstantiationPriority)> = manager
        .identifiers()
        .iter()
        .map(|id| (id.detector().to_string(), id.priority()))
        .collect();
    summary.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        summary,
        vec![
            ("dut".to_string(), InstantiationPriority::Name),
            ("telescope0".to_string(), InstantiationPriority::Type),
            ("telescope1".to_string(), InstantiationPriority::Name),
        ]
    );
    // Replaced instances left no delegates behind
    assert_eq!(manager.messenger().delegate_count(), 3);
}

#[test]
fn test_type_section_skips_detectors_named_in_same_section() {
    let shared = Shared::default();
    let (manager, _) = load(
        r#"
        [Consumer]
        name = "telescope0"
        type = "timepix"
        "#,
        &shared,
    )
    .unwrap();

    let summary: Vec<(String, InstantiationPriority)> = manager
        .identifiers()
        .iter()
        .map(|id| (id.detector().to_string(), id.priority()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("telescope0".to_string(), InstantiationPriority::Name),
            ("telescope1".to_string(), InstantiationPriority::Type),
        ]
    );
}

#[test]
fn test_equal_priority_is_ambiguous() {
    let shared = Shared::default();
    let err = load(
        r#"
        [Consumer]
        name = "dut"

        [Consumer]
        name = "dut"
        "#,
        &shared,
    )
    .err()
    .unwrap();
    assert!(matches!(err, FrameworkError::AmbiguousInstantiation { .. }));

    let err = load("[Source]\n[Source]\n", &shared).err().unwrap();
    assert!(matches!(err, FrameworkError::AmbiguousInstantiation { .. }));
}

#[test]
fn test_unknown_module_and_detector() {
    let shared = Shared::default();
    let err = load("[DoesNotExist]\n", &shared).err().unwrap();
    assert!(matches!(err, FrameworkError::ModuleNotFound(_)));

    let err = load("[Consumer]\nname = \"nowhere\"\n", &shared).err().unwrap();
    assert!(matches!(err, FrameworkError::DetectorNotFound(_)));
}

#[test]
fn test_construction_failure_names_instance() {
    let shared = Shared::default();
    let err = load("[Broken]\nname = \"dut\"\n", &shared).err().unwrap();
    match err {
        FrameworkError::Module { module, phase, source } => {
            assert_eq!(module, "Broken:dut");
            assert_eq!(phase, Phase::Construction);
            assert!(matches!(*source, FrameworkError::MissingKey { .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_scenario_c_thread_unsafe_falls_back() {
    let shared = Shared::default();
    let text = r#"
        number_of_events = 4
        multithreading = true
        workers = 4

        [UnsafeSource]

        [Consumer]
        "#;
    let report = run(text, &shared).unwrap();
    assert_eq!(report.workers, 1);
    assert_eq!(report.module("Consumer:dut").unwrap().runs, 4);

    let strict = format!("fail_on_thread_unsafe = true\n{}", text);
    let err = run(&strict, &shared).unwrap_err();
    match err {
        FrameworkError::ThreadUnsafeModules { modules } => assert_eq!(modules, vec!["UnsafeSource"]),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_scenario_d_required_input_without_producer() {
    let shared = Shared::default();
    let report = run(
        r#"
        number_of_events = 5

        [OrphanConsumer]
        name = "dut"
        "#,
        &shared,
    )
    .unwrap();
    let stats = report.module("OrphanConsumer:dut").unwrap();
    assert_eq!(stats.runs, 0);
    assert_eq!(stats.skipped, 5);
    assert!(shared.records.lock().unwrap().is_empty());
}

#[test]
fn test_scenario_d_optional_input_runs_with_empty_slot() {
    let shared = Shared::default();
    let report = run(
        r#"
        number_of_events = 2

        [OrphanConsumer]
        name = "dut"
        required = false
        "#,
        &shared,
    )
    .unwrap();
    assert_eq!(report.module("OrphanConsumer:dut").unwrap().runs, 2);
    let records = shared.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.id.is_none()));
}

#[test]
fn test_multi_bind_keeps_dispatch_order() {
    let shared = Shared::default();
    run(
        r#"
        number_of_events = 2

        [Source]
        per_event = 3

        [MultiConsumer]
        "#,
        &shared,
    )
    .unwrap();
    let values: Vec<u64> = shared.records.lock().unwrap().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![100, 101, 102, 200, 201, 202]);
}

#[test]
fn test_single_slot_overwrite_aborts_run() {
    let shared = Shared::default();
    let err = run(
        r#"
        number_of_events = 3

        [Source]
        per_event = 2

        [Consumer]
        name = "dut"
        "#,
        &shared,
    )
    .unwrap_err();
    match err {
        FrameworkError::Module { module, phase, source } => {
            assert_eq!(module, "Source");
            assert_eq!(phase, Phase::Run);
            assert!(matches!(*source, FrameworkError::MessageOverwrite { event: 1, .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_sequential_module_sees_events_in_order() {
    let shared = Shared::default();
    let report = run(
        r#"
        number_of_events = 60
        multithreading = true
        workers = 4

        [Source]
        [Jitter]
        [Consumer]
        [OrderRecorder]
        "#,
        &shared,
    )
    .unwrap();

    assert_eq!(report.workers, 4);
    assert_eq!(*shared.order.lock().unwrap(), (1..=60).collect::<Vec<u64>>());
    assert_eq!(shared.thread_inits.load(Ordering::SeqCst), 4);
    assert_eq!(shared.thread_finals.load(Ordering::SeqCst), 4);
    let records = shared.records.lock().unwrap();
    assert_eq!(records.len(), 180);
    // Every consumer only saw the message of the event it ran for
    assert!(records.iter().all(|r| r.value == r.event * 100 && r.id.is_some()));
    for detector in ["dut", "telescope0", "telescope1"] {
        let mut events: Vec<u64> = records.iter().filter(|r| r.module == detector).map(|r| r.event).collect();
        events.sort_unstable();
        assert_eq!(events, (1..=60).collect::<Vec<u64>>());
    }
}

#[test]
fn test_failure_under_concurrency_stops_run() {
    let shared = Shared::default();
    let err = run(
        r#"
        number_of_events = 40
        multithreading = true
        workers = 3

        [Jitter]
        fail_at = 7

        [OrderRecorder]
        "#,
        &shared,
    )
    .unwrap_err();

    match err {
        FrameworkError::Module { module, phase, .. } => {
            assert_eq!(module, "Jitter");
            assert_eq!(phase, Phase::Run);
        }
        other => panic!("unexpected error {:?}", other),
    }
    let order = shared.order.lock().unwrap();
    assert!(order.len() < 40);
    assert!(order.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_panic_under_concurrency_releases_sequential_workers() {
    let (done, finished) = mpsc::channel();
    std::thread::spawn(move || {
        let shared = Shared::default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run(
                r#"
                number_of_events = 20
                multithreading = true
                workers = 3

                [Jitter]
                panic_at = 3

                [OrderRecorder]
                "#,
                &shared,
            )
        }));
        let order = shared.order.lock().unwrap().clone();
        let _ = done.send((outcome.is_err(), order));
    });

    let (panicked, order) = finished
        .recv_timeout(Duration::from_secs(30))
        .expect("run did not return after a module panicked");
    assert!(panicked);
    assert!(order.windows(2).all(|w| w[0] < w[1]));
    assert!(order.iter().all(|&event| event < 3));
}

#[test]
fn test_random_numbers_do_not_depend_on_workers() {
    let single = Shared::default();
    run(
        "number_of_events = 20\nrandom_seed = 11\n[RandomRecorder]\n",
        &single,
    )
    .unwrap();

    let threaded = Shared::default();
    run(
        "number_of_events = 20\nrandom_seed = 11\nmultithreading = true\nworkers = 3\n[RandomRecorder]\n",
        &threaded,
    )
    .unwrap();

    let mut first = single.randoms.lock().unwrap().clone();
    let mut second = threaded.randoms.lock().unwrap().clone();
    first.sort();
    second.sort();
    assert_eq!(first.len(), 20);
    assert_eq!(first, second);
}

#[test]
fn test_lifecycle_order_enforced() {
    let shared = Shared::default();
    let (mut manager, config) = load("[Source]\n", &shared).unwrap();
    assert!(matches!(manager.run(&config), Err(FrameworkError::Logic(_))));
    assert!(matches!(manager.finalize(), Err(FrameworkError::Logic(_))));

    manager.init().unwrap();
    assert!(matches!(manager.init(), Err(FrameworkError::Logic(_))));
    manager.run(&config.clone().with_concurrency(ConcurrencyMode::SingleThreaded)).unwrap();
    manager.finalize().unwrap();
}
