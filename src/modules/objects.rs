//! Payloads exchanged by the built-in modules.

use serde::{Deserialize, Serialize};

/// Charge deposited at a point inside the sensor, in local coordinates (mm)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositedCharge {
    pub position: [f64; 3],
    /// Number of electron-hole pairs
    pub charge: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepositedCharges {
    pub charges: Vec<DepositedCharge>,
}

/// Charge arriving at the collection surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatedCharge {
    pub position: [f64; 2],
    pub charge: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagatedCharges {
    pub charges: Vec<PropagatedCharge>,
}

impl PropagatedCharges {
    pub fn total_charge(&self) -> f64 {
        self.charges.iter().map(|c| c.charge).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelHit {
    pub column: i64,
    pub row: i64,
    pub signal: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelHits {
    pub hits: Vec<PixelHit>,
}
