//! Exercises `Context` and the MMCFE routine the way `main.rs` drives
//! them: build from a finalized model, run blocks, checkpoint, and
//! reload.

use mocsim_core::context::Context;
use mocsim_core::fastexp::FastExpMode;
use mocsim_core::mmcfe::{MmcFeConfig, MmcFeRoutine, MMCFE_UUID};
use mocsim_core::model::env_def::EnvironmentDefinition;
use mocsim_core::model::job::{JobKind, KmcJobParams, MmcJobParams, UnitCell};
use mocsim_core::model::jump::{JumpCollection, JumpDirection, JumpRule};
use mocsim_core::model::lattice::SupercellDims;
use mocsim_core::model::tables::PairTable;
use mocsim_core::model::Model;
use mocsim_core::rng::Pcg32;
use mocsim_core::routine::{BuiltinRoutineRegistry, Routine};
use mocsim_core::scheduler::{AbortReason, Phase};
use mocsim_core::state::StateImage;

fn kmc_prerun_model() -> Model {
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
            movement_sequence: vec![
                mocsim_core::vector::Vec3::zero(),
                mocsim_core::vector::Vec3::new(1.0, 0.0, 0.0),
            ],
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
            fast_exp_mode: FastExpMode::Rms,
            use_prerun: true,
            prerun_mcsp: 50,
            target_mcsp: 500,
            time_limit_secs: 3600,
            use_frequency_precheck: false,
        }),
        unit_cell: UnitCell {
            a: mocsim_core::vector::Vec3::new(4.0, 0.0, 0.0),
            b: mocsim_core::vector::Vec3::new(0.0, 4.0, 0.0),
            c: mocsim_core::vector::Vec3::new(0.0, 0.0, 4.0),
        },
        particle_charges: vec![0.0, 1.0],
        field_vector: mocsim_core::vector::Vec3::zero(),
        field_magnitude: 0.0,
        initial_lattice: vec![1, 0],
    }
}

#[test]
fn context_transitions_out_of_prerun_exactly_once() {
    let model = kmc_prerun_model().finalize().unwrap();
    let mut ctx = Context::new(model, Pcg32::new(1, 1), 100_000, None);
    assert_eq!(ctx.scheduler.phase, Phase::PreRun);

    let mut saw_reset = false;
    for _ in 0..5 {
        let reason = ctx.run_block().unwrap();
        if ctx.scheduler.phase == Phase::Main {
            saw_reset = true;
            break;
        }
        assert_eq!(reason, AbortReason::Completed);
    }
    assert!(saw_reset, "the pre-run target should have tripped within a few blocks");
    assert_eq!(ctx.scheduler.counters.cycles_executed, 0, "transition resets the cycle counter");
}

#[test]
fn checkpoint_round_trips_and_reflects_the_prerun_flag() {
    let model = kmc_prerun_model().finalize().unwrap();
    let mut ctx = Context::new(model, Pcg32::new(2, 2), 100_000, None);
    while ctx.scheduler.phase == Phase::PreRun {
        ctx.run_block().unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.mcs");
    ctx.save_state(&path).unwrap();

    let restored = StateImage::load_from_file(&path).unwrap();
    assert!(restored.has_flag(mocsim_core::state::STATE_FLG_PRERUN_RESET));
}

fn mmc_model_for_mmcfe() -> Model {
    let mut model = kmc_prerun_model();
    model.job = JobKind::Mmc(MmcJobParams {
        temperature_kelvin: 1000.0,
        fast_exp_mode: FastExpMode::Rms,
        alpha: 1.0,
        target_mcsp: 10_000,
        time_limit_secs: 3600,
    });
    model
}

#[test]
fn mmcfe_sweep_logs_one_entry_per_alpha_step_at_the_documented_values() {
    let model = mmc_model_for_mmcfe().finalize().unwrap();
    let mut ctx = Context::new(model, Pcg32::new(3, 3), 100_000, None);

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("mmcfe.db");
    let mut routine = MmcFeRoutine::with_config(MmcFeConfig {
        alpha_min: 0.2,
        alpha_max: 0.8,
        alpha_count: 2,
        relax_cycles: 200,
        log_cycles: 100,
        db_path: Some(db_path.clone()),
        ..MmcFeConfig::default()
    });
    assert_eq!(routine.uuid(), MMCFE_UUID);
    routine.run(&mut ctx).unwrap();

    let db = mocsim_core::mmcfe::logdb::LogDb::open(&db_path).unwrap();
    // AlphaStep = (0.8 - 0.2) / 2 = 0.3, so the sweep visits 0.2, 0.5, 0.8.
    assert_eq!(db.entry_count().unwrap(), 3);
    let latest = db.latest_entry().unwrap().unwrap();
    assert!((latest.alpha - 0.8).abs() < 1e-9, "latest row should be the final alpha in the ramp");
    assert!(!latest.lattice.is_empty());
    assert!(!latest.param_state.is_empty());
}

#[test]
fn resuming_from_a_checkpoint_matches_an_uninterrupted_run() {
    let seed = Pcg32::new(5, 5);

    let mut uninterrupted = Context::new(kmc_prerun_model().finalize().unwrap(), seed, 100_000, None);
    for _ in 0..6 {
        uninterrupted.run_block().unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resume.mcs");

    let mut first_half = Context::new(kmc_prerun_model().finalize().unwrap(), Pcg32::new(5, 5), 100_000, None);
    for _ in 0..3 {
        first_half.run_block().unwrap();
    }
    first_half.save_state(&path).unwrap();

    let mut resumed = Context::restore(kmc_prerun_model().finalize().unwrap(), &path, 100_000).unwrap();
    for _ in 0..3 {
        resumed.run_block().unwrap();
    }

    assert_eq!(resumed.scheduler.counters.cycles_executed, uninterrupted.scheduler.counters.cycles_executed);
    assert_eq!(resumed.scheduler.counters.cycles_accepted, uninterrupted.scheduler.counters.cycles_accepted);
    let resumed_occupation: Vec<u8> = resumed.lattice.states.iter().map(|s| s.particle).collect();
    let uninterrupted_occupation: Vec<u8> = uninterrupted.lattice.states.iter().map(|s| s.particle).collect();
    assert_eq!(resumed_occupation, uninterrupted_occupation);
}

#[test]
fn builtin_registry_dispatches_to_mmcfe_by_uuid() {
    let mut registry = BuiltinRoutineRegistry::new();
    let routine = registry.find(MMCFE_UUID).expect("mmcfe is a builtin routine");
    assert_eq!(routine.name(), "mmcfe");
}
