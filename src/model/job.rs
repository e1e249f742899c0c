//! Job header: the KMC/MMC variant-specific run parameters, plus the
//! supercell metadata needed by the statistics module.

use serde::{Deserialize, Serialize};

use crate::fastexp::FastExpMode;
use crate::vector::Vec3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KmcJobParams {
    pub temperature_kelvin: f64,
    /// Normalization factor feeding the simulated-time step,
    /// `Δt = 1 / (normalization · selectableJumpCount · fastestRate)`.
    pub normalization: f64,
    pub fast_exp_mode: FastExpMode,
    pub use_prerun: bool,
    pub prerun_mcsp: u64,
    pub target_mcsp: u64,
    pub time_limit_secs: u64,
    /// If set, skip the energy engine for rules whose frequency factor
    /// is below 1, deciding by one uniform draw against the factor.
    pub use_frequency_precheck: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MmcJobParams {
    pub temperature_kelvin: f64,
    pub fast_exp_mode: FastExpMode,
    pub alpha: f64,
    pub target_mcsp: u64,
    pub time_limit_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum JobKind {
    Kmc(KmcJobParams),
    Mmc(MmcJobParams),
}

impl JobKind {
    pub fn temperature_kelvin(&self) -> f64 {
        match self {
            JobKind::Kmc(p) => p.temperature_kelvin,
            JobKind::Mmc(p) => p.temperature_kelvin,
        }
    }

    pub fn fast_exp_mode(&self) -> FastExpMode {
        match self {
            JobKind::Kmc(p) => p.fast_exp_mode,
            JobKind::Mmc(p) => p.fast_exp_mode,
        }
    }

    pub fn target_mcsp(&self) -> u64 {
        match self {
            JobKind::Kmc(p) => p.target_mcsp,
            JobKind::Mmc(p) => p.target_mcsp,
        }
    }
}

/// Unit cell vectors in Angstrom.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnitCell {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl UnitCell {
    /// Absolute scalar triple product `|a . (b x c)|`, the cell volume
    /// in cubic Angstrom.
    pub fn cell_volume(&self) -> f64 {
        self.a.dot(&self.b.cross(&self.c)).abs()
    }
}
