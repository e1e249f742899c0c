//! The run-time aggregate: everything a routine needs to drive a
//! simulation, bundled so routines don't have to thread a dozen
//! parameters through every call.

use std::path::{Path, PathBuf};

use crate::environment::EnvironmentLattice;
use crate::error::{EngineError, EngineResult};
use crate::model::Model;
use crate::rng::Pcg32;
use crate::scheduler::{AbortReason, Scheduler, SchedulerConfig};
use crate::selection::SelectionPool;
use crate::tracking::Trackers;

/// Everything a routine operates on: the immutable model, the mutable
/// lattice/pool/tracker state, the RNG stream, and the scheduler.
pub struct Context {
    pub model: Model,
    pub lattice: EnvironmentLattice,
    pub pool: SelectionPool,
    pub trackers: Trackers,
    pub rng: Pcg32,
    pub scheduler: Scheduler,
    pub state_path: Option<PathBuf>,
}

impl Context {
    /// Builds a fresh run from a finalized model: links the lattice,
    /// builds the selection pool, assigns mobile trackers, and seeds the
    /// scheduler from the job header.
    pub fn new(model: Model, rng: Pcg32, requested_block_size: u64, state_path: Option<PathBuf>) -> Self {
        let mut lattice = EnvironmentLattice::from_model(&model);
        let pool = SelectionPool::build(&model, &mut lattice);

        let num_mobile = lattice.states.iter().filter(|s| s.is_mobile).count();
        let num_positions = model.env_defs.len();
        let mut trackers = Trackers::new(num_mobile, num_positions);
        trackers.assign_initial(&mut lattice);

        let use_prerun = matches!(&model.job, crate::model::job::JobKind::Kmc(p) if p.use_prerun);
        let time_limit_secs = match &model.job {
            crate::model::job::JobKind::Kmc(p) => p.time_limit_secs,
            crate::model::job::JobKind::Mmc(p) => p.time_limit_secs,
        };
        let scheduler_config = SchedulerConfig::from_job(&model.job, time_limit_secs, requested_block_size);
        let scheduler = Scheduler::new(scheduler_config, use_prerun);

        Context {
            model,
            lattice,
            pool,
            trackers,
            rng,
            scheduler,
            state_path,
        }
    }

    /// Runs one scheduler block. If the block finished the pre-run
    /// phase's cycle target, performs the one-time reset and reports
    /// `ConditionAbort` rather than `Completed` so the caller keeps
    /// looping into the main run.
    pub fn run_block(&mut self) -> EngineResult<AbortReason> {
        let reason = self.scheduler.run_block(
            &self.model,
            &mut self.lattice,
            &mut self.pool,
            &mut self.trackers,
            &mut self.rng,
        )?;

        if reason == AbortReason::Completed && self.scheduler.phase == crate::scheduler::Phase::PreRun {
            self.scheduler.transition_to_main_run(&mut self.trackers);
            return Ok(AbortReason::ConditionAbort);
        }
        Ok(reason)
    }

    pub fn save_state(&self, path: &Path) -> EngineResult<()> {
        let image = self.build_state_image();
        image.save_to_file(path)
    }

    fn build_state_image(&self) -> crate::state::StateImage {
        let lattice_bytes = bincode::serialize(&self.lattice).unwrap_or_default();
        let pool_bytes = bincode::serialize(&self.pool).unwrap_or_default();
        let counters_bytes = bincode::serialize(&self.scheduler.counters).unwrap_or_default();
        let global_bytes = bincode::serialize(&self.trackers.global).unwrap_or_default();
        let mobile_bytes = bincode::serialize(&self.trackers.mobile).unwrap_or_default();
        let static_bytes = bincode::serialize(&self.trackers.static_by_position).unwrap_or_default();
        let mapping_bytes = bincode::serialize(&self.trackers.mobile_tracker_mapping).unwrap_or_default();
        let jumpstat_bytes = bincode::serialize(&self.trackers.jump_statistics).unwrap_or_default();
        let meta_bytes = bincode::serialize(&self.rng).unwrap_or_default();

        let sizes = [
            meta_bytes.len(),
            lattice_bytes.len(),
            pool_bytes.len(),
            counters_bytes.len(),
            global_bytes.len(),
            mobile_bytes.len(),
            static_bytes.len(),
            mapping_bytes.len(),
            jumpstat_bytes.len(),
        ];
        let mut image = crate::state::StateImage::allocate(sizes);
        for (region, bytes) in [
            (crate::state::Region::Meta, &meta_bytes),
            (crate::state::Region::Lattice, &lattice_bytes),
            (crate::state::Region::Pool, &pool_bytes),
            (crate::state::Region::Counters, &counters_bytes),
            (crate::state::Region::GlobalTrackers, &global_bytes),
            (crate::state::Region::MobileTrackers, &mobile_bytes),
            (crate::state::Region::StaticTrackers, &static_bytes),
            (crate::state::Region::MobileTrackerMapping, &mapping_bytes),
            (crate::state::Region::JumpStatistics, &jumpstat_bytes),
        ] {
            image.region_mut(region)[..bytes.len()].copy_from_slice(bytes);
        }
        if self.scheduler.phase == crate::scheduler::Phase::Main {
            image.set_flag(crate::state::STATE_FLG_PRERUN_RESET);
        }
        image
    }

    /// Rebuilds a `Context` from a saved image rather than from scratch.
    /// Every region round-trips through `bincode` verbatim, including the
    /// selection pool's bucket layout, so resuming N more cycles from here
    /// draws the same sequence of sites the uninterrupted run would have
    /// (modulo the RNG's own stream position, which the meta region
    /// restores exactly too).
    pub fn restore(model: Model, path: &Path, requested_block_size: u64) -> EngineResult<Self> {
        let image = crate::state::StateImage::load_from_file(path)?;

        let rng: Pcg32 = bincode::deserialize(image.region(crate::state::Region::Meta))
            .map_err(|e| EngineError::DataConsistency(format!("meta region: {e}")))?;
        let lattice: EnvironmentLattice = bincode::deserialize(image.region(crate::state::Region::Lattice))
            .map_err(|e| EngineError::DataConsistency(format!("lattice region: {e}")))?;
        let pool: SelectionPool = bincode::deserialize(image.region(crate::state::Region::Pool))
            .map_err(|e| EngineError::DataConsistency(format!("pool region: {e}")))?;
        let counters: crate::scheduler::Counters =
            bincode::deserialize(image.region(crate::state::Region::Counters))
                .map_err(|e| EngineError::DataConsistency(format!("counters region: {e}")))?;
        let global: std::collections::HashMap<(u32, u8), crate::vector::Vec3> =
            bincode::deserialize(image.region(crate::state::Region::GlobalTrackers))
                .map_err(|e| EngineError::DataConsistency(format!("global trackers region: {e}")))?;
        let mobile: Vec<crate::vector::Vec3> =
            bincode::deserialize(image.region(crate::state::Region::MobileTrackers))
                .map_err(|e| EngineError::DataConsistency(format!("mobile trackers region: {e}")))?;
        let static_by_position: std::collections::HashMap<(u32, u8), crate::vector::Vec3> =
            bincode::deserialize(image.region(crate::state::Region::StaticTrackers))
                .map_err(|e| EngineError::DataConsistency(format!("static trackers region: {e}")))?;
        let mobile_tracker_mapping: Vec<usize> =
            bincode::deserialize(image.region(crate::state::Region::MobileTrackerMapping))
                .map_err(|e| EngineError::DataConsistency(format!("tracker mapping region: {e}")))?;
        let jump_statistics: crate::tracking::JumpStatistics =
            bincode::deserialize(image.region(crate::state::Region::JumpStatistics))
                .map_err(|e| EngineError::DataConsistency(format!("jump statistics region: {e}")))?;

        let trackers = Trackers {
            global,
            mobile,
            static_by_position,
            mobile_tracker_mapping,
            jump_statistics,
        };

        let use_prerun = !image.has_flag(crate::state::STATE_FLG_PRERUN_RESET)
            && matches!(&model.job, crate::model::job::JobKind::Kmc(p) if p.use_prerun);
        let time_limit_secs = match &model.job {
            crate::model::job::JobKind::Kmc(p) => p.time_limit_secs,
            crate::model::job::JobKind::Mmc(p) => p.time_limit_secs,
        };
        let scheduler_config = SchedulerConfig::from_job(&model.job, time_limit_secs, requested_block_size);
        let mut scheduler = Scheduler::new(scheduler_config, use_prerun);
        scheduler.counters = counters;
        if image.has_flag(crate::state::STATE_FLG_PRERUN_RESET) {
            scheduler.phase = crate::scheduler::Phase::Main;
        }

        Ok(Context {
            model,
            lattice,
            pool,
            trackers,
            rng,
            scheduler,
            state_path: Some(path.to_path_buf()),
        })
    }
}
