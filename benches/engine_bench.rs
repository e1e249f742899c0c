//! Benchmarks the per-cycle cost of the KMC and MMC transition loops on
//! a modest supercell, to track regressions in the selection pool and
//! energy engine hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mocsim_core::environment::EnvironmentLattice;
use mocsim_core::fastexp::FastExpMode;
use mocsim_core::model::env_def::EnvironmentDefinition;
use mocsim_core::model::job::{JobKind, KmcJobParams, MmcJobParams, UnitCell};
use mocsim_core::model::jump::{JumpCollection, JumpDirection, JumpRule};
use mocsim_core::model::lattice::SupercellDims;
use mocsim_core::model::tables::PairTable;
use mocsim_core::model::Model;
use mocsim_core::rng::Pcg32;
use mocsim_core::selection::SelectionPool;
use mocsim_core::transition::{run_kmc_cycle, run_mmc_cycle};
use mocsim_core::vector::Vec3;

const EXTENT: u32 = 8;

/// An `EXTENT^3` supercell, one sub-lattice position, half filled with
/// a mobile ion and half vacant in a checkerboard pattern, with a
/// single jump direction along `+c`.
fn benchmark_model(job: JobKind) -> Model {
    let dims = SupercellDims::new(EXTENT, EXTENT, EXTENT, 1);
    let site_count = dims.site_count();
    let initial_lattice = (0..site_count).map(|i| (i % 2) as u8).collect();

    Model {
        dims,
        pair_tables: vec![PairTable::from_entries(vec![(1, 1, 0.05)])],
        cluster_tables: vec![],
        env_defs: vec![EnvironmentDefinition {
            position_id: 0,
            selection_mask: 0b10,
            update_particle_ids: vec![],
            pair_interactions: vec![
                mocsim_core::model::env_def::PairInteraction { offset: (1, 0, 0, 0), pair_table_id: 0 },
                mocsim_core::model::env_def::PairInteraction { offset: (0, 1, 0, 0), pair_table_id: 0 },
                mocsim_core::model::env_def::PairInteraction { offset: (0, 0, 1, 0), pair_table_id: 0 },
            ],
            cluster_interactions: vec![],
            allowed_particles: vec![0, 1],
        }],
        jump_directions: vec![JumpDirection {
            start_position_id: 0,
            jump_sequence: vec![(0, 0, 0, 0), (0, 0, 1, 0)],
            movement_sequence: vec![Vec3::zero(), Vec3::new(0.0, 0.0, 1.0)],
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
                static_activation_energy: 0.2,
                tracker_order_code: vec![1, 0],
                mobile_mask: 0b10,
            }],
            direction_range: (0, 0),
        }],
        job,
        unit_cell: UnitCell {
            a: Vec3::new(4.0, 0.0, 0.0),
            b: Vec3::new(0.0, 4.0, 0.0),
            c: Vec3::new(0.0, 0.0, 4.0),
        },
        particle_charges: vec![0.0, 1.0],
        field_vector: Vec3::zero(),
        field_magnitude: 0.0,
        initial_lattice,
    }
}

fn kmc_cycle_benchmark(c: &mut Criterion) {
    let model = benchmark_model(JobKind::Kmc(KmcJobParams {
        temperature_kelvin: 800.0,
        normalization: 1.0,
        fast_exp_mode: FastExpMode::Rms,
        use_prerun: false,
        prerun_mcsp: 0,
        target_mcsp: 0,
        time_limit_secs: 3600,
        use_frequency_precheck: false,
    }))
    .finalize()
    .unwrap();
    let params = match &model.job {
        JobKind::Kmc(p) => p.clone(),
        _ => unreachable!(),
    };

    c.bench_function("kmc_cycle_8x8x8", |b| {
        let mut lattice = EnvironmentLattice::from_model(&model);
        let mut pool = SelectionPool::build(&model, &mut lattice);
        let mut rng = Pcg32::new(1, 1);
        b.iter(|| {
            let outcome = run_kmc_cycle(&model, &mut lattice, &mut pool, &mut rng, &params, 1.0).unwrap();
            black_box(outcome.accepted);
        });
    });
}

fn mmc_cycle_benchmark(c: &mut Criterion) {
    let model = benchmark_model(JobKind::Mmc(MmcJobParams {
        temperature_kelvin: 800.0,
        fast_exp_mode: FastExpMode::Rms,
        alpha: 1.0,
        target_mcsp: 0,
        time_limit_secs: 3600,
    }))
    .finalize()
    .unwrap();

    c.bench_function("mmc_cycle_8x8x8", |b| {
        let mut lattice = EnvironmentLattice::from_model(&model);
        let mut pool = SelectionPool::build(&model, &mut lattice);
        let mut rng = Pcg32::new(1, 1);
        b.iter(|| {
            let outcome = run_mmc_cycle(&model, &mut lattice, &mut pool, &mut rng, FastExpMode::Rms, None).unwrap();
            black_box(outcome.accepted);
        });
    });
}

criterion_group!(benches, kmc_cycle_benchmark, mmc_cycle_benchmark);
criterion_main!(benches);
