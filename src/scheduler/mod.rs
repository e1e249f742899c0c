//! Block/phase scheduling: groups cycles into blocks, tracks aggregate
//! counters, performs the one-time pre-run-to-main-run reset, and
//! decides when a run should stop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::energy::JumpEnergies;
use crate::environment::EnvironmentLattice;
use crate::error::EngineResult;
use crate::model::job::{JobKind, KmcJobParams};
use crate::model::Model;
use crate::rng::Pcg32;
use crate::selection::SelectionPool;
use crate::tracking::Trackers;
use crate::transition::{run_kmc_cycle, run_mmc_cycle};

/// Cycles per block, fixed across job kinds.
pub const CYCLE_BLOCKCOUNT: u64 = 100;
/// Valid range for a block's cycle count; configs outside this range
/// are clamped at load time.
pub const CYCLE_BLOCKSIZE_MIN: u64 = 100_000;
pub const CYCLE_BLOCKSIZE_MAX: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreRun,
    Main,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Completed,
    Timeout,
    ConditionAbort,
    RateAbort,
    EnergyAbort,
}

/// The six per-particle counter kinds named by invariant #5: every
/// inner cycle increments exactly one of `mcs`, `rejection`, `skip`,
/// `site_blocking`, `unstable_start`, plus optionally `unstable_end` on
/// top of an `mcs` increment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ParticleCounters {
    pub mcs_count: u64,
    pub rejection_count: u64,
    pub skip_count: u64,
    pub site_blocking_count: u64,
    pub unstable_start_count: u64,
    pub unstable_end_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub cycles_executed: u64,
    pub cycles_accepted: u64,
    pub cycles_rejected: u64,
    pub cycles_skipped_by_frequency: u64,
    pub blocks_completed: u64,
    pub simulated_time: f64,
    pub per_particle: HashMap<u8, ParticleCounters>,
}

impl Counters {
    fn particle_mut(&mut self, particle: u8) -> &mut ParticleCounters {
        self.per_particle.entry(particle).or_default()
    }
}

pub struct SchedulerConfig {
    pub block_size: u64,
    pub block_count: u64,
    pub time_limit: Duration,
}

impl SchedulerConfig {
    pub fn from_job(job: &JobKind, time_limit_secs: u64, requested_block_size: u64) -> Self {
        SchedulerConfig {
            block_size: requested_block_size.clamp(CYCLE_BLOCKSIZE_MIN, CYCLE_BLOCKSIZE_MAX),
            block_count: CYCLE_BLOCKCOUNT,
            time_limit: Duration::from_secs(time_limit_secs),
        }
        .with_target(job)
    }

    fn with_target(self, _job: &JobKind) -> Self {
        self
    }
}

pub struct Scheduler {
    pub config: SchedulerConfig,
    pub counters: Counters,
    pub phase: Phase,
    started_at: Instant,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, use_prerun: bool) -> Self {
        Scheduler {
            config,
            counters: Counters::default(),
            phase: if use_prerun { Phase::PreRun } else { Phase::Main },
            started_at: Instant::now(),
        }
    }

    /// Resets counters, trackers, and jump-statistics histograms exactly
    /// once, marking the state image's pre-run-reset flag. Idempotent
    /// after the first call from `PreRun`: later calls are no-ops.
    pub fn transition_to_main_run(&mut self, trackers: &mut Trackers) {
        if self.phase != Phase::PreRun {
            return;
        }
        self.counters = Counters::default();
        trackers.global.clear();
        trackers.mobile.iter_mut().for_each(|v| *v = crate::vector::Vec3::zero());
        trackers.static_by_position.clear();
        trackers.jump_statistics = crate::tracking::JumpStatistics::new();
        self.phase = Phase::Main;
        self.started_at = Instant::now();
    }

    fn target_mcsp(&self, job: &JobKind) -> u64 {
        match self.phase {
            Phase::PreRun => match job {
                JobKind::Kmc(p) => p.prerun_mcsp,
                JobKind::Mmc(_) => 0,
            },
            Phase::Main => job.target_mcsp(),
        }
    }

    /// Runs cycles until the current block is exhausted, an abort
    /// condition trips, or the target cycle count for this phase is
    /// reached. Returns the reason the run stopped this call; the
    /// caller (the engine) decides whether to keep calling for more
    /// blocks or persist a checkpoint.
    pub fn run_block(
        &mut self,
        model: &Model,
        lattice: &mut EnvironmentLattice,
        pool: &mut SelectionPool,
        trackers: &mut Trackers,
        rng: &mut Pcg32,
    ) -> EngineResult<AbortReason> {
        let target = self.target_mcsp(&model.job);

        for _ in 0..self.config.block_size {
            if self.started_at.elapsed() >= self.config.time_limit {
                return Ok(AbortReason::Timeout);
            }
            if target > 0 && self.counters.cycles_executed >= target {
                return Ok(AbortReason::Completed);
            }

            match &model.job {
                JobKind::Kmc(params) => {
                    self.run_one_kmc_cycle(model, lattice, pool, trackers, rng, params)?;
                }
                JobKind::Mmc(params) => {
                    let outcome = run_mmc_cycle(model, lattice, pool, rng, params.fast_exp_mode, Some(params.alpha))?;
                    self.counters.cycles_executed += 1;
                    if outcome.accepted {
                        self.counters.cycles_accepted += 1;
                        self.counters.particle_mut(outcome.particle_a).mcs_count += 1;
                    } else {
                        self.counters.cycles_rejected += 1;
                        self.counters.particle_mut(outcome.particle_a).rejection_count += 1;
                    }
                }
            }
        }

        self.counters.blocks_completed += 1;
        if target > 0 && self.counters.cycles_executed >= target {
            Ok(AbortReason::Completed)
        } else {
            Ok(AbortReason::ConditionAbort)
        }
    }

    fn run_one_kmc_cycle(
        &mut self,
        model: &Model,
        lattice: &mut EnvironmentLattice,
        pool: &mut SelectionPool,
        trackers: &mut Trackers,
        rng: &mut Pcg32,
        params: &KmcJobParams,
    ) -> EngineResult<()> {
        let fastest_rate = 1.0;
        let outcome = run_kmc_cycle(model, lattice, pool, rng, params, fastest_rate)?;
        self.counters.cycles_executed += 1;
        self.counters.simulated_time += outcome.delta_time;
        let particle = outcome.particle;

        if !outcome.rule_found {
            self.counters.cycles_rejected += 1;
            self.counters.particle_mut(particle).site_blocking_count += 1;
            return Ok(());
        }
        if outcome.unstable_start {
            self.counters.particle_mut(particle).unstable_start_count += 1;
            return Ok(());
        }
        if outcome.skipped_by_frequency {
            self.counters.cycles_skipped_by_frequency += 1;
            self.counters.particle_mut(particle).skip_count += 1;
            return Ok(());
        }
        if outcome.accepted {
            self.counters.cycles_accepted += 1;
            self.counters.particle_mut(particle).mcs_count += 1;
            if outcome.unstable_end {
                self.counters.particle_mut(particle).unstable_end_count += 1;
            }
            trackers.apply_movement(
                lattice,
                &outcome.path,
                &outcome.movement_sequence,
                &outcome.tracker_order_code,
                outcome.collection_id,
            );
        } else {
            self.counters.cycles_rejected += 1;
            self.counters.particle_mut(particle).rejection_count += 1;
        }
        Ok(())
    }
}

/// Records a completed jump's three energies into the relevant
/// jump-statistics bucket, in eV (the histograms are calibrated against
/// physical energy, not the dimensionless kT values the engine computes
/// in).
pub fn record_jump_energies(
    trackers: &mut Trackers,
    collection_id: u32,
    particle: u8,
    energies: &JumpEnergies,
    temperature_kelvin: f64,
) {
    let bucket = trackers.jump_statistics.bucket_mut(collection_id, particle);
    let kt_ev = crate::units::kt_to_ev(1.0, temperature_kelvin);
    bucket.s1_energy.record(energies.s1_energy * kt_ev);
    bucket
        .conformation_delta
        .record(energies.conformation_delta_energy * kt_ev);
    bucket.s0_to_s2_delta.record(energies.s0_to_s2_delta_energy * kt_ev);
    bucket
        .effective_barrier
        .record((energies.s1_energy + energies.s0_to_s2_delta_energy.max(0.0)) * kt_ev);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A single sub-lattice position with one jump rule requiring
    /// `state0 = [1, 0]`; seeded fully occupied so every cycle's path
    /// occupation reads `[1, 1]` and matches no rule.
    fn fully_occupied_two_site_model() -> Model {
        use crate::model::env_def::EnvironmentDefinition;
        use crate::model::job::{KmcJobParams, UnitCell};
        use crate::model::jump::{JumpCollection, JumpDirection, JumpRule};
        use crate::model::lattice::SupercellDims;
        use crate::model::tables::PairTable;
        use crate::vector::Vec3;

        Model {
            dims: SupercellDims::new(1, 1, 2, 1),
            pair_tables: vec![PairTable::from_entries(vec![])],
            cluster_tables: vec![],
            env_defs: vec![EnvironmentDefinition {
                position_id: 0,
                selection_mask: 0b10,
                update_particle_ids: vec![],
                pair_interactions: vec![],
                cluster_interactions: vec![],
                allowed_particles: vec![0, 1],
            }],
            jump_directions: vec![JumpDirection {
                start_position_id: 0,
                jump_sequence: vec![(0, 0, 0, 0), (0, 0, 1, 0)],
                movement_sequence: vec![Vec3::zero(), Vec3::new(1.0, 0.0, 0.0)],
                collection_id: 0,
                jump_length: 2,
                electric_field_factor: 0.0,
            }],
            jump_collections: vec![JumpCollection {
                mobile_mask: 0b10,
                rules: vec![JumpRule {
                    state0: vec![1, 0],
                    state1: vec![0, 0],
                    state2: vec![0, 1],
                    frequency_factor: 1.0,
                    static_activation_energy: 0.0,
                    tracker_order_code: vec![1, 0],
                    mobile_mask: 0b10,
                }],
                direction_range: (0, 0),
            }],
            job: JobKind::Kmc(KmcJobParams {
                temperature_kelvin: 1000.0,
                normalization: 1.0,
                fast_exp_mode: crate::fastexp::FastExpMode::Rms,
                use_prerun: false,
                prerun_mcsp: 0,
                target_mcsp: 1,
                time_limit_secs: 3600,
                use_frequency_precheck: false,
            }),
            unit_cell: UnitCell {
                a: Vec3::new(4.0, 0.0, 0.0),
                b: Vec3::new(0.0, 4.0, 0.0),
                c: Vec3::new(0.0, 0.0, 4.0),
            },
            particle_charges: vec![0.0, 1.0],
            field_vector: Vec3::zero(),
            field_magnitude: 0.0,
            initial_lattice: vec![1, 1],
        }
    }

    #[test]
    fn blocked_jump_charges_site_blocking_count_and_nothing_else() {
        let model = fully_occupied_two_site_model().finalize().unwrap();
        let mut lattice = EnvironmentLattice::from_model(&model);
        let mut pool = SelectionPool::build(&model, &mut lattice);
        let mut trackers = Trackers::new(0, 1);
        let mut rng = Pcg32::new(5, 5);
        let params = match &model.job {
            JobKind::Kmc(p) => p.clone(),
            _ => unreachable!(),
        };

        let mut scheduler = Scheduler::new(SchedulerConfig::from_job(&model.job, 10, CYCLE_BLOCKSIZE_MIN), false);
        scheduler
            .run_one_kmc_cycle(&model, &mut lattice, &mut pool, &mut trackers, &mut rng, &params)
            .unwrap();

        let particle_counters = scheduler.counters.per_particle.get(&1).expect("particle 1 charged");
        assert_eq!(particle_counters.site_blocking_count, 1);
        assert_eq!(particle_counters.mcs_count, 0);
        assert_eq!(particle_counters.rejection_count, 0);
        assert_eq!(particle_counters.skip_count, 0);
        assert_eq!(particle_counters.unstable_start_count, 0);
        assert_eq!(scheduler.counters.cycles_executed, 1);
    }

    #[test]
    fn scheduler_config_clamps_block_size() {
        let job = JobKind::Mmc(crate::model::job::MmcJobParams {
            temperature_kelvin: 300.0,
            fast_exp_mode: crate::fastexp::FastExpMode::Rms,
            alpha: 1.0,
            target_mcsp: 10,
            time_limit_secs: 10,
        });
        let config = SchedulerConfig::from_job(&job, 10, 1);
        assert_eq!(config.block_size, CYCLE_BLOCKSIZE_MIN);
        let config = SchedulerConfig::from_job(&job, 10, 1_000_000_000);
        assert_eq!(config.block_size, CYCLE_BLOCKSIZE_MAX);
    }

    #[test]
    fn prerun_reset_clears_counters_and_trackers() {
        let mut trackers = Trackers::new(1, 1);
        trackers.global.insert((0, 1), crate::vector::Vec3::new(1.0, 2.0, 3.0));
        let job = JobKind::Mmc(crate::model::job::MmcJobParams {
            temperature_kelvin: 300.0,
            fast_exp_mode: crate::fastexp::FastExpMode::Rms,
            alpha: 1.0,
            target_mcsp: 10,
            time_limit_secs: 10,
        });
        let config = SchedulerConfig::from_job(&job, 10, CYCLE_BLOCKSIZE_MIN);
        let mut scheduler = Scheduler::new(config, true);
        scheduler.counters.cycles_executed = 42;
        scheduler.transition_to_main_run(&mut trackers);
        assert_eq!(scheduler.phase, Phase::Main);
        assert_eq!(scheduler.counters.cycles_executed, 0);
        assert!(trackers.global.is_empty());
    }
}
