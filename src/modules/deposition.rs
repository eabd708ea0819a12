use super::objects::{DepositedCharge, DepositedCharges};
use crate::core::config::Configuration;
use crate::core::error::Result;
use crate::core::geometry::GeometryManager;
use crate::core::messenger::{Event, Message};
use crate::core::module::{Module, ModuleContext, ThreadSafety};
use log::{debug, info};
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};
use std::sync::Arc;

/// Deposits random point charges in every detector that has a consumer.
///
/// # Keys
/// * `mean_deposits` - mean number of deposits per detector and event (default 10)
/// * `charge_mean`, `charge_sigma` - charge per deposit in electrons (default 2000 and 400)
/// * `sensor_size` - sensor extent in mm as `x y thickness` (default `14.08 14.08 0.3`)
pub struct DepositionGenerator {
    geometry: Arc<GeometryManager>,
    deposits: Poisson<f64>,
    charge: Normal<f64>,
    sensor_size: [f64; 3],
}

impl DepositionGenerator {
    pub fn new(config: &Configuration, _context: &mut ModuleContext<'_>, geometry: Arc<GeometryManager>) -> Result<Self> {
        let mean_deposits: f64 = config.get_or("mean_deposits", 10.0)?;
        let charge_mean: f64 = config.get_or("charge_mean", 2000.0)?;
        let charge_sigma: f64 = config.get_or("charge_sigma", 400.0)?;
        let sensor_size = if config.has("sensor_size") {
            let values: Vec<f64> = config.get_array("sensor_size")?;
            match values.as_slice() {
                [x, y, z] if *x > 0.0 && *y > 0.0 && *z > 0.0 => [*x, *y, *z],
                _ => return Err(config.invalid_value("sensor_size", "expected three positive values")),
            }
        } else {
            [14.08, 14.08, 0.3]
        };

        let deposits = Poisson::new(mean_deposits).map_err(|e| config.invalid_value("mean_deposits", e.to_string()))?;
        let charge = Normal::new(charge_mean, charge_sigma).map_err(|e| config.invalid_value("charge_sigma", e.to_string()))?;

        Ok(Self {
            geometry,
            deposits,
            charge,
            sensor_size,
        })
    }
}

impl Module for DepositionGenerator {
    fn init(&mut self) -> Result<()> {
        info!(
            "Depositing charges in {} detectors",
            self.geometry.detectors().len()
        );
        Ok(())
    }

    fn run(&self, event: &mut Event<'_>) -> Result<()> {
        for detector in self.geometry.detectors() {
            let query = Message::for_detector(DepositedCharges::default(), detector.clone());
            if !event.has_receiver(&query) {
                continue;
            }

            let count: f64 = self.deposits.sample(event.rng());
            let count = count as usize;
            let mut charges = Vec::with_capacity(count);
            for _ in 0..count {
                let rng = event.rng();
                let position = [
                    rng.gen_range(0.0..self.sensor_size[0]),
                    rng.gen_range(0.0..self.sensor_size[1]),
                    rng.gen_range(0.0..self.sensor_size[2]),
                ];
                let charge: f64 = self.charge.sample(rng);
                charges.push(DepositedCharge {
                    position,
                    charge: charge.max(0.0),
                });
            }

            debug!("Deposited {} charges in {}", charges.len(), detector.name());
            event.dispatch(Message::for_detector(DepositedCharges { charges }, detector.clone()))?;
        }
        Ok(())
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::ThreadSafe
    }
}
