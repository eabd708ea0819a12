use super::objects::{PixelHit, PixelHits, PropagatedCharges};
use crate::core::config::Configuration;
use crate::core::error::Result;
use crate::core::geometry::Detector;
use crate::core::messenger::{Event, Message, MsgFlags, SingleSlot};
use crate::core::module::{Module, ModuleContext, ThreadSafety};
use log::{debug, info};
use rand_distr::{Distribution, Normal};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

thread_local! {
    /// Hits counted on this thread per digitizer instance, not yet merged
    static PENDING_HITS: RefCell<HashMap<Uuid, u64>> = RefCell::new(HashMap::new());
}

/// Sums the collected charge per pixel, adds electronics noise and keeps
/// pixels above threshold.
///
/// Hit counts are kept per thread while events run and merged into the
/// module total when a worker finishes and at finalize.
///
/// # Keys
/// * `pixel_pitch` - pitch in mm as `x y` (default `0.055 0.055`)
/// * `threshold` - threshold in electrons (default 600)
/// * `electronics_noise` - noise in electrons (default 110)
pub struct DefaultDigitizer {
    detector: Arc<Detector>,
    charges: SingleSlot<PropagatedCharges>,
    pitch: [f64; 2],
    threshold: f64,
    noise: Normal<f64>,
    key: Uuid,
    total_hits: AtomicU64,
}

impl DefaultDigitizer {
    pub fn new(config: &Configuration, context: &mut ModuleContext<'_>, detector: Arc<Detector>) -> Result<Self> {
        let pitch = if config.has("pixel_pitch") {
            let values: Vec<f64> = config.get_array("pixel_pitch")?;
            match values.as_slice() {
                [x, y] if *x > 0.0 && *y > 0.0 => [*x, *y],
                _ => return Err(config.invalid_value("pixel_pitch", "expected two positive values")),
            }
        } else {
            [0.055, 0.055]
        };
        let threshold: f64 = config.get_or("threshold", 600.0)?;
        let noise_sigma: f64 = config.get_or("electronics_noise", 110.0)?;
        let noise = Normal::new(0.0, noise_sigma).map_err(|e| config.invalid_value("electronics_noise", e.to_string()))?;

        Ok(Self {
            detector,
            charges: context.bind_single(MsgFlags::REQUIRED),
            pitch,
            threshold,
            noise,
            key: Uuid::new_v4(),
            total_hits: AtomicU64::new(0),
        })
    }

    /// Hits merged from the threads that finished so far
    pub fn total_hits(&self) -> u64 {
        self.total_hits.load(Ordering::Relaxed)
    }

    fn merge_pending(&self) {
        let pending = PENDING_HITS.with(|pending| pending.borrow_mut().remove(&self.key));
        if let Some(hits) = pending {
            debug!("Merging {} hits counted on this thread", hits);
            self.total_hits.fetch_add(hits, Ordering::Relaxed);
        }
    }
}

impl Module for DefaultDigitizer {
    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        let charges = match event.single(&self.charges) {
            Some(charges) => charges,
            None => return Ok(()),
        };

        let mut pixels: BTreeMap<(i64, i64), f64> = BTreeMap::new();
        for charge in &charges.charges {
            let column = (charge.position[0] / self.pitch[0]).floor() as i64;
            let row = (charge.position[1] / self.pitch[1]).floor() as i64;
            *pixels.entry((column, row)).or_default() += charge.charge;
        }

        let mut hits = Vec::new();
        for ((column, row), charge) in pixels {
            let noise: f64 = self.noise.sample(event.rng());
            let signal = charge + noise;
            if signal >= self.threshold {
                hits.push(PixelHit { column, row, signal });
            }
        }

        PENDING_HITS.with(|pending| {
            *pending.borrow_mut().entry(self.key).or_default() += hits.len() as u64;
        });
        event.dispatch(Message::for_detector(PixelHits { hits }, self.detector.clone()))
    }

    fn finalize_thread(&self) -> Result<()> {
        self.merge_pending();
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.merge_pending();
        info!("Digitized {} pixel hits in {}", self.total_hits(), self.detector.name());
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::ThreadSafe
    }
}
