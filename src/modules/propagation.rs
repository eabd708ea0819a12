use super::objects::{DepositedCharges, PropagatedCharge, PropagatedCharges};
use crate::core::config::Configuration;
use crate::core::error::{FrameworkError, Result};
use crate::core::geometry::Detector;
use crate::core::messenger::{Event, Message, MsgFlags, SingleSlot};
use crate::core::module::{Module, ModuleContext, ThreadSafety};
use log::trace;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;

/// Projects deposited charges onto the collection surface with a Gaussian
/// spread proportional to the square root of the drift distance.
///
/// # Keys
/// * `diffusion_sigma` - spread in mm for a drift of 1 mm (default 0.01)
pub struct SimplePropagation {
    detector: Arc<Detector>,
    deposits: SingleSlot<DepositedCharges>,
    diffusion_sigma: f64,
}

impl SimplePropagation {
    pub fn new(config: &Configuration, context: &mut ModuleContext<'_>, detector: Arc<Detector>) -> Result<Self> {
        let diffusion_sigma: f64 = config.get_or("diffusion_sigma", 0.01)?;
        if diffusion_sigma < 0.0 {
            return Err(config.invalid_value("diffusion_sigma", "diffusion should not be negative"));
        }

        Ok(Self {
            detector,
            deposits: context.bind_single(MsgFlags::REQUIRED),
            diffusion_sigma,
        })
    }
}

impl Module for SimplePropagation {
    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        let deposits = match event.single(&self.deposits) {
            Some(deposits) => deposits,
            None => return Ok(()),
        };

        let mut charges = Vec::with_capacity(deposits.charges.len());
        for deposit in &deposits.charges {
            let sigma = self.diffusion_sigma * deposit.position[2].max(0.0).sqrt();
            let (dx, dy): (f64, f64) = if sigma > 0.0 {
                let spread = Normal::new(0.0, sigma).map_err(|e| FrameworkError::runtime(e.to_string()))?;
                (spread.sample(event.rng()), spread.sample(event.rng()))
            } else {
                (0.0, 0.0)
            };
            charges.push(PropagatedCharge {
                position: [deposit.position[0] + dx, deposit.position[1] + dy],
                charge: deposit.charge,
            });
        }

        trace!("Propagated {} charges in {}", charges.len(), self.detector.name());
        event.dispatch(Message::for_detector(PropagatedCharges { charges }, self.detector.clone()))
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::ThreadSafe
    }
}
