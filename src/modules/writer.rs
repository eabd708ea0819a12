use super::objects::{PixelHit, PixelHits};
use crate::core::config::Configuration;
use crate::core::error::{FrameworkError, Result};
use crate::core::geometry::GeometryManager;
use crate::core::messenger::{Event, MsgFlags, MultiSlot};
use crate::core::module::{Module, ModuleContext, ThreadSafety};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One output line
#[derive(Serialize)]
struct EventRecord<'a> {
    event: u64,
    hits: BTreeMap<&'a str, &'a [PixelHit]>,
}

#[derive(Default)]
struct WriterState {
    output: Option<BufWriter<File>>,
    events: u64,
    hits: u64,
}

/// Writes the pixel hits of every event as one JSON line, in event order.
///
/// # Keys
/// * `file_name` - output file, relative to the configuration file (default `output.jsonl`)
pub struct JsonWriter {
    path: PathBuf,
    hits: MultiSlot<PixelHits>,
    state: Mutex<WriterState>,
}

impl JsonWriter {
    pub fn new(config: &Configuration, context: &mut ModuleContext<'_>, _geometry: Arc<GeometryManager>) -> Result<Self> {
        let path = if config.has("file_name") {
            config.get_path("file_name")?
        } else {
            PathBuf::from("output.jsonl")
        };
        Ok(Self {
            path,
            hits: context.bind_multi(MsgFlags::NONE),
            state: Mutex::new(WriterState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Module for JsonWriter {
    fn init(&mut self) -> Result<()> {
        let file = File::create(&self.path)?;
        info!("Writing pixel hits to {}", self.path.display());
        self.lock().output = Some(BufWriter::new(file));
        Ok(())
    }

    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        let messages = event.multi(&self.hits);
        let mut record = EventRecord {
            event: event.number(),
            hits: BTreeMap::new(),
        };
        for message in &messages {
            let detector = message.detector().map(|d| d.name()).unwrap_or("");
            record.hits.insert(detector, message.hits.as_slice());
        }
        let count: usize = messages.iter().map(|m| m.hits.len()).sum();

        let mut state = self.lock();
        let output = state
            .output
            .as_mut()
            .ok_or_else(|| FrameworkError::logic("output file is not open"))?;
        serde_json::to_writer(&mut *output, &record).map_err(|e| FrameworkError::runtime(e.to_string()))?;
        output.write_all(b"\n")?;
        state.events += 1;
        state.hits += count as u64;
        debug!("Wrote {} hits of event {}", count, event.number());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let mut state = self.lock();
        if let Some(mut output) = state.output.take() {
            output.flush()?;
        }
        info!(
            "Wrote {} events with {} pixel hits to {}",
            state.events,
            state.hits,
            self.path.display()
        );
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::Sequential
    }
}
