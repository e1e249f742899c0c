//! Metadynamics-style free energy sweep: ramps the MMC bias parameter
//! alpha from `alpha_min` to `alpha_max` in `alpha_count` steps, relaxes
//! and logs the energy distribution at each step to a SQLite-backed log,
//! and can resume a sweep an earlier run left unfinished.

pub mod logdb;

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::energy::total_lattice_energy;
use crate::error::{EngineError, EngineResult};
use crate::routine::Routine;
use crate::tracking::DynamicHistogram;
use crate::transition::run_mmc_cycle;

use self::logdb::LogDb;

/// `b7f2dded-daf1-40c0-a1a4-ef9b85356af8`.
pub const MMCFE_UUID: [u8; 16] = [
    0xb7, 0xf2, 0xdd, 0xed, 0xda, 0xf1, 0x40, 0xc0, 0xa1, 0xa4, 0xef, 0x9b, 0x85, 0x35, 0x6a, 0xf8,
];

const DEFAULT_ALPHA_MIN: f64 = 0.1;
const DEFAULT_ALPHA_MAX: f64 = 1.0;
const DEFAULT_ALPHA_COUNT: u32 = 9;
const DEFAULT_HISTOGRAM_RANGE: f64 = 1.0;
const DEFAULT_HISTOGRAM_SIZE: u32 = 200;
const DEFAULT_RELAX_CYCLES: u64 = 50_000;
const DEFAULT_LOG_CYCLES: u64 = 20_000;

/// Ring buffer capacity for the relaxation phase's energy samples: never
/// below 100000 regardless of how few relaxation cycles are run, so a
/// short relaxation still gets a representative window of the approach
/// to equilibrium.
fn relax_ring_capacity(relax_cycles: u64) -> usize {
    relax_cycles.max(100_000) as usize
}

pub struct MmcFeConfig {
    pub alpha_min: f64,
    pub alpha_max: f64,
    pub alpha_count: u32,
    pub histogram_range: f64,
    pub histogram_size: u32,
    pub relax_cycles: u64,
    pub log_cycles: u64,
    pub db_path: Option<PathBuf>,
}

impl Default for MmcFeConfig {
    fn default() -> Self {
        MmcFeConfig {
            alpha_min: DEFAULT_ALPHA_MIN,
            alpha_max: DEFAULT_ALPHA_MAX,
            alpha_count: DEFAULT_ALPHA_COUNT,
            histogram_range: DEFAULT_HISTOGRAM_RANGE,
            histogram_size: DEFAULT_HISTOGRAM_SIZE,
            relax_cycles: DEFAULT_RELAX_CYCLES,
            log_cycles: DEFAULT_LOG_CYCLES,
            db_path: None,
        }
    }
}

impl MmcFeConfig {
    fn to_param_state(&self) -> ParamState {
        ParamState {
            histogram_size: self.histogram_size,
            alpha_count: self.alpha_count,
            alpha_min: self.alpha_min,
            alpha_max: self.alpha_max,
            alpha_current: self.alpha_min,
            histogram_range: self.histogram_range,
            relax_cycles: self.relax_cycles,
            log_cycles: self.log_cycles,
        }
    }
}

/// The routine's persisted parameter snapshot: what gets written into
/// each row's `ParamState` blob and read back on resume. Cycle counts
/// are `u64` rather than a signed type with an explicit `>= 0` check,
/// since the type itself rules out the invalid case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ParamState {
    histogram_size: u32,
    alpha_count: u32,
    alpha_min: f64,
    alpha_max: f64,
    alpha_current: f64,
    histogram_range: f64,
    relax_cycles: u64,
    log_cycles: u64,
}

impl ParamState {
    fn is_valid(&self) -> bool {
        self.alpha_count > 0
            && self.alpha_min > 0.0
            && self.alpha_min < self.alpha_max
            && self.alpha_max <= 1.0
            && self.histogram_range > 0.0
            && self.histogram_size > 0
    }

    fn alpha_step(&self) -> f64 {
        (self.alpha_max - self.alpha_min) / self.alpha_count as f64
    }

    /// The full ramp `alpha_min, alpha_min + step, ..., alpha_max`,
    /// matching the "loop while AlphaCurrent <= AlphaMax" contract.
    fn alpha_ramp(&self) -> Vec<f64> {
        let step = self.alpha_step();
        let mut values = Vec::with_capacity(self.alpha_count as usize + 1);
        let mut current = self.alpha_min;
        while current <= self.alpha_max + f64::EPSILON {
            values.push(current);
            current += step;
        }
        values
    }
}

pub struct MmcFeRoutine {
    config: MmcFeConfig,
}

impl MmcFeRoutine {
    pub fn new() -> Self {
        MmcFeRoutine {
            config: MmcFeConfig::default(),
        }
    }

    pub fn with_config(config: MmcFeConfig) -> Self {
        MmcFeRoutine { config }
    }

    fn validate_config(&self) -> EngineResult<()> {
        if self.config.to_param_state().is_valid() {
            Ok(())
        } else {
            Err(EngineError::Validation(
                "mmcfe routine parameters out of range: require alpha_count>0, \
                 0 < alpha_min < alpha_max <= 1, histogram_range>0, histogram_size>0"
                    .into(),
            ))
        }
    }

    /// Runs the cycles of one relaxation phase for `alpha`, returning
    /// the ring buffer of sampled lattice energies used to re-center the
    /// logging phase's histogram.
    fn relax(&self, ctx: &mut Context, mode: crate::fastexp::FastExpMode, alpha: f64, relax_cycles: u64) -> EngineResult<VecDeque<f64>> {
        let capacity = relax_ring_capacity(relax_cycles);
        let mut ring: VecDeque<f64> = VecDeque::with_capacity(capacity.min(relax_cycles as usize + 1));
        for _ in 0..relax_cycles {
            run_mmc_cycle(&ctx.model, &mut ctx.lattice, &mut ctx.pool, &mut ctx.rng, mode, Some(alpha))?;
            let energy = total_lattice_energy(&ctx.model, &ctx.lattice);
            if ring.len() == capacity {
                ring.pop_front();
            }
            ring.push_back(energy);
        }
        Ok(ring)
    }

    fn log_phase(
        &self,
        ctx: &mut Context,
        mode: crate::fastexp::FastExpMode,
        alpha: f64,
        params: &ParamState,
        relax_samples: &VecDeque<f64>,
    ) -> EngineResult<DynamicHistogram> {
        let mean = mean_of(relax_samples);
        let mut histogram = DynamicHistogram::new(params.histogram_size as usize);
        histogram.set_range(mean, params.histogram_range);

        for _ in 0..params.log_cycles {
            run_mmc_cycle(&ctx.model, &mut ctx.lattice, &mut ctx.pool, &mut ctx.rng, mode, Some(alpha))?;
            histogram.record(total_lattice_energy(&ctx.model, &ctx.lattice));
        }
        Ok(histogram)
    }
}

impl Default for MmcFeRoutine {
    fn default() -> Self {
        Self::new()
    }
}

impl Routine for MmcFeRoutine {
    fn uuid(&self) -> [u8; 16] {
        MMCFE_UUID
    }

    fn name(&self) -> &'static str {
        "mmcfe"
    }

    fn run(&mut self, ctx: &mut Context) -> EngineResult<()> {
        let mode = ctx.model.job.fast_exp_mode();
        let db = match &self.config.db_path {
            Some(path) => LogDb::open(path)?,
            None => LogDb::open_in_memory()?,
        };

        // Resume contract: a prior run's last row wins over the config
        // this invocation was constructed with, provided it still
        // decodes to a valid parameter set.
        let mut params = match db.resume_param_state()? {
            Some(blob) => match bincode::deserialize::<ParamState>(&blob) {
                Ok(resumed) if resumed.is_valid() => resumed,
                _ => {
                    self.validate_config()?;
                    self.config.to_param_state()
                }
            },
            None => {
                self.validate_config()?;
                self.config.to_param_state()
            }
        };

        let step = params.alpha_step();
        while params.alpha_current <= params.alpha_max + f64::EPSILON {
            let relax_samples = self.relax(ctx, mode, params.alpha_current, params.relax_cycles)?;
            let histogram = self.log_phase(ctx, mode, params.alpha_current, &params, &relax_samples)?;

            let lattice_blob = bincode::serialize(&ctx.lattice).unwrap_or_default();
            let histogram_blob = bincode::serialize(&histogram).unwrap_or_default();
            let param_blob = bincode::serialize(&params).unwrap_or_default();
            db.insert_entry(params.alpha_current, &lattice_blob, &histogram_blob, &param_blob)?;

            params.alpha_current += step;
        }

        Ok(())
    }
}

fn mean_of(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
