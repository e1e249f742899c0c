//! Observables derived from a completed or in-progress run: particle
//! densities, mobility and diffusion figures, and ionic conductivity via
//! the Nernst-Einstein relation.
//!
//! All of this module's public functions are pure reductions over
//! `Model`/`EnvironmentLattice`/`Trackers` state; none of it mutates the
//! run, so it can be called mid-simulation from a periodic reporting
//! hook as well as at the end of a job.

use crate::environment::EnvironmentLattice;
use crate::model::Model;
use crate::tracking::Trackers;
use crate::units::{angstrom3_to_meter3, angstrom_to_meter, BOLTZMANN_EV_PER_K, ELEMENTARY_CHARGE};
use crate::vector::Vec3;

/// Supercell volume in cubic meters.
pub fn supercell_volume(model: &Model) -> f64 {
    let cell_volume_a3 = model.unit_cell.cell_volume();
    let num_cells = (model.dims.a as f64) * (model.dims.b as f64) * (model.dims.c as f64);
    angstrom3_to_meter3(cell_volume_a3 * num_cells)
}

/// Number density of sites occupied by `particle`, in particles per
/// cubic meter.
pub fn particle_density(model: &Model, lattice: &EnvironmentLattice, particle: u8) -> f64 {
    let count = lattice.states.iter().filter(|s| s.particle == particle).count();
    count as f64 / supercell_volume(model)
}

/// Mean displacement across all mobile-tracker slots, in meters.
pub fn mobile_tracker_ensemble_shift(trackers: &Trackers) -> Vec3 {
    if trackers.mobile.is_empty() {
        return Vec3::zero();
    }
    let sum = trackers
        .mobile
        .iter()
        .fold(Vec3::zero(), |acc, v| acc + scaled(*v));
    sum * (1.0 / trackers.mobile.len() as f64)
}

fn scaled(v: Vec3) -> Vec3 {
    Vec3::new(
        angstrom_to_meter(v.x),
        angstrom_to_meter(v.y),
        angstrom_to_meter(v.z),
    )
}

/// Average drift velocity of the mobile ensemble, in meters/second.
pub fn mobility_vector(trackers: &Trackers, elapsed_time_secs: f64) -> Vec3 {
    if elapsed_time_secs <= 0.0 {
        return Vec3::zero();
    }
    mobile_tracker_ensemble_shift(trackers) * (1.0 / elapsed_time_secs)
}

/// Drift speed projected onto the normalized field direction; `0.0` if
/// no field is configured.
pub fn field_projected_mobility(mobility: Vec3, field_direction: Vec3) -> f64 {
    let norm = field_direction.norm();
    if norm <= 0.0 {
        return 0.0;
    }
    mobility.dot(&(field_direction * (1.0 / norm)))
}

/// Self-diffusion coefficient via the Einstein relation,
/// `D = <r^2> / (2 * 3 * t)`, in square meters/second.
pub fn diffusion_coefficient(trackers: &Trackers, elapsed_time_secs: f64) -> f64 {
    if trackers.mobile.is_empty() || elapsed_time_secs <= 0.0 {
        return 0.0;
    }
    let mean_squared_displacement = trackers
        .mobile
        .iter()
        .map(|v| scaled(*v).norm_squared())
        .sum::<f64>()
        / trackers.mobile.len() as f64;
    mean_squared_displacement / (6.0 * elapsed_time_secs)
}

/// Accepted jumps per second.
pub fn migration_rate(accepted_cycles: u64, elapsed_time_secs: f64) -> f64 {
    if elapsed_time_secs <= 0.0 {
        return 0.0;
    }
    accepted_cycles as f64 / elapsed_time_secs
}

/// Nernst-Einstein ionic conductivity, `sigma = n * (q*e)^2 * D / (kB * T)`,
/// in Siemens/meter.
pub fn nernst_einstein_conductivity(
    density_per_m3: f64,
    particle_charge: f64,
    diffusion_coefficient_m2_per_s: f64,
    temperature_kelvin: f64,
) -> f64 {
    if temperature_kelvin <= 0.0 {
        return 0.0;
    }
    let boltzmann_joules_per_k = BOLTZMANN_EV_PER_K * ELEMENTARY_CHARGE;
    let charge_coulomb = particle_charge * ELEMENTARY_CHARGE;
    density_per_m3 * charge_coulomb * charge_coulomb * diffusion_coefficient_m2_per_s
        / (boltzmann_joules_per_k * temperature_kelvin)
}

/// Per-particle-species mobility figures, as reported by
/// `-print-jump-histograms`-style summaries.
#[derive(Debug, Clone)]
pub struct ParticleMobilityReport {
    pub particle: u8,
    pub density_per_m3: f64,
    pub diffusion_coefficient_m2_per_s: f64,
    pub drift_mobility_m_per_s: Vec3,
    pub field_projected_mobility_m_per_s: f64,
    pub conductivity_s_per_m: f64,
}

/// Builds one report per particle species present on the lattice.
/// Diffusion and drift figures are computed from the whole mobile
/// ensemble; this assumes a single mobile species, the common case for
/// the ionic conductors this simulates, and will understate the
/// per-species figures in mixed-mobility models.
pub fn populate_mobility_report(
    model: &Model,
    lattice: &EnvironmentLattice,
    trackers: &Trackers,
    elapsed_time_secs: f64,
) -> Vec<ParticleMobilityReport> {
    let diffusion = diffusion_coefficient(trackers, elapsed_time_secs);
    let mobility = mobility_vector(trackers, elapsed_time_secs);
    let field_projected = field_projected_mobility(mobility, model.field_vector);
    let temperature = model.job.temperature_kelvin();

    let mut species: Vec<u8> = lattice.states.iter().map(|s| s.particle).collect();
    species.sort_unstable();
    species.dedup();

    species
        .into_iter()
        .map(|particle| {
            let density = particle_density(model, lattice, particle);
            let charge = model.charge_of(particle);
            ParticleMobilityReport {
                particle,
                density_per_m3: density,
                diffusion_coefficient_m2_per_s: diffusion,
                drift_mobility_m_per_s: mobility,
                field_projected_mobility_m_per_s: field_projected,
                conductivity_s_per_m: nernst_einstein_conductivity(density, charge, diffusion, temperature),
            }
        })
        .collect()
}

/// Sum of every species' Nernst-Einstein conductivity.
pub fn total_conductivity(reports: &[ParticleMobilityReport]) -> f64 {
    reports.iter().map(|r| r.conductivity_s_per_m).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastexp::FastExpMode;
    use crate::model::env_def::EnvironmentDefinition;
    use crate::model::job::{JobKind, KmcJobParams, UnitCell};
    use crate::model::lattice::SupercellDims;
    use crate::model::tables::PairTable;
    use crate::environment::NOT_SELECTABLE;

    fn two_site_model() -> Model {
        Model {
            dims: SupercellDims::new(1, 1, 2, 1),
            pair_tables: vec![PairTable::from_entries(vec![])],
            cluster_tables: vec![],
            env_defs: vec![EnvironmentDefinition {
                position_id: 0,
                selection_mask: 0,
                update_particle_ids: vec![],
                pair_interactions: vec![],
                cluster_interactions: vec![],
                allowed_particles: vec![0, 1, 2],
            }],
            jump_directions: vec![],
            jump_collections: vec![],
            job: JobKind::Kmc(KmcJobParams {
                temperature_kelvin: 500.0,
                normalization: 1.0,
                fast_exp_mode: FastExpMode::Rms,
                use_prerun: false,
                prerun_mcsp: 0,
                target_mcsp: 10,
                time_limit_secs: 10,
                use_frequency_precheck: false,
            }),
            unit_cell: UnitCell {
                a: Vec3::new(4.0, 0.0, 0.0),
                b: Vec3::new(0.0, 4.0, 0.0),
                c: Vec3::new(0.0, 0.0, 4.0),
            },
            particle_charges: vec![0.0, 1.0, -1.0],
            field_vector: Vec3::zero(),
            field_magnitude: 0.0,
            initial_lattice: vec![1, 2],
        }
    }

    #[test]
    fn supercell_volume_matches_unit_cell_times_extent() {
        let model = two_site_model();
        let expected = angstrom3_to_meter3(64.0);
        assert!((supercell_volume(&model) - expected).abs() < 1e-40);
    }

    #[test]
    fn particle_density_counts_matching_sites() {
        let model = two_site_model();
        let lattice = EnvironmentLattice::from_model(&model);
        let density = particle_density(&model, &lattice, 1);
        assert!(density > 0.0);
    }

    #[test]
    fn zero_elapsed_time_yields_zero_rates() {
        let trackers = Trackers::new(2, 1);
        assert_eq!(mobility_vector(&trackers, 0.0), Vec3::zero());
        assert_eq!(diffusion_coefficient(&trackers, 0.0), 0.0);
        assert_eq!(migration_rate(10, 0.0), 0.0);
    }

    #[test]
    fn mobility_report_has_one_entry_per_species() {
        let model = two_site_model();
        let lattice = EnvironmentLattice::from_model(&model);
        let mut trackers = Trackers::new(0, 1);
        trackers.mobile_tracker_mapping = Vec::new();
        let _ = NOT_SELECTABLE;
        let report = populate_mobility_report(&model, &lattice, &trackers, 1.0);
        assert_eq!(report.len(), 2);
    }
}
