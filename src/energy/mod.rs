//! Energy engine: resolves a selected direction into a jump path and
//! computes the three delta-energy quantities (in kT) the transition
//! protocol needs for its accept/reject test.

use crate::environment::EnvironmentLattice;
use crate::model::jump::JumpDirection;
use crate::model::tables::encode_occupation_code;
use crate::model::Model;
use crate::rng::Pcg32;

const FREQUENCY_EPSILON: f64 = 1e-9;

/// The ordered sequence of lattice site indices a jump direction
/// touches, resolved against a concrete start site.
#[derive(Debug, Clone)]
pub struct JumpPath {
    pub sites: Vec<usize>,
}

/// Resolves `direction.jump_sequence` against `start_index`'s
/// coordinate, wrapping each relative offset modulo the supercell.
pub fn resolve_jump_path(
    model: &Model,
    lattice: &EnvironmentLattice,
    start_index: usize,
    direction: &JumpDirection,
) -> JumpPath {
    let start_coord = lattice.site(start_index).coord;
    let sites = direction
        .jump_sequence
        .iter()
        .map(|&offset| {
            let coord = model.dims.resolve_offset(start_coord, offset);
            lattice.index_of(coord)
        })
        .collect();
    JumpPath { sites }
}

/// Total pair + cluster interaction energy (kT) for `site_index` as if
/// it were occupied by `hypothetical_particle`, holding every other
/// site's current occupation fixed. Neighbors are resolved relative to
/// the site's own environment definition.
pub fn site_energy_for_particle(
    model: &Model,
    lattice: &EnvironmentLattice,
    site_index: usize,
    hypothetical_particle: u8,
) -> f64 {
    let site = lattice.site(site_index);
    let env_def = model.env_def(site.position_id);
    let mut energy = 0.0;

    for pair in &env_def.pair_interactions {
        let neighbor_coord = model.dims.resolve_offset(site.coord, pair.offset);
        let neighbor_index = lattice.index_of(neighbor_coord);
        let neighbor_particle = lattice.site(neighbor_index).particle;
        energy += model
            .pair_table(pair.pair_table_id)
            .energy(hypothetical_particle, neighbor_particle);
    }

    for cluster in &env_def.cluster_interactions {
        let members: Vec<u8> = cluster
            .offsets
            .iter()
            .map(|&offset| {
                let coord = model.dims.resolve_offset(site.coord, offset);
                lattice.site(lattice.index_of(coord)).particle
            })
            .collect();
        let code = encode_occupation_code(&members);
        energy += model
            .cluster_table(cluster.cluster_table_id)
            .energy(code, hypothetical_particle);
    }

    energy
}

/// The three delta-energy quantities (kT) for a candidate jump along
/// `path`, given the matched rule's state-0/state-2 occupations.
pub struct JumpEnergies {
    pub s1_energy: f64,
    pub conformation_delta_energy: f64,
    pub s0_to_s2_delta_energy: f64,
}

/// Computes `S1Energy`, `ConformationDeltaEnergy`, and
/// `S0toS2DeltaEnergy` for a candidate jump.
///
/// `S1Energy` is the rule's static activation energy plus the electric
/// field's work term `ElectricFieldFactor * |E| * q`, where `q` is the
/// charge of the particle occupying the path's start slot.
/// `ConformationDeltaEnergy` sums each path slot's per-site energy
/// change from its state-0 to its state-2 occupation.
/// `S0toS2DeltaEnergy` is the same total state-2-minus-state-0
/// difference (the original and this port agree no additional term
/// survives beyond the per-site conformational sum; see DESIGN.md for
/// the resolution of this spec ambiguity).
pub fn compute_jump_energies(
    model: &Model,
    lattice: &EnvironmentLattice,
    path: &JumpPath,
    direction: &JumpDirection,
    rule_static_activation_energy: f64,
    rule_state0: &[u8],
    rule_state2: &[u8],
) -> JumpEnergies {
    let mut conformation_delta_energy = 0.0;
    for (slot, &site_index) in path.sites.iter().enumerate() {
        let state0_particle = rule_state0[slot];
        let state2_particle = rule_state2[slot];
        let before = site_energy_for_particle(model, lattice, site_index, state0_particle);
        let after = site_energy_for_particle(model, lattice, site_index, state2_particle);
        conformation_delta_energy += after - before;
    }

    let start_particle = rule_state0[0];
    let charge = model.charge_of(start_particle);
    let field_work = direction.electric_field_factor * model.field_magnitude * charge;
    let s1_energy = rule_static_activation_energy + field_work;

    JumpEnergies {
        s1_energy,
        conformation_delta_energy,
        s0_to_s2_delta_energy: conformation_delta_energy,
    }
}

/// Total pair + cluster interaction energy of the whole lattice (kT),
/// halved to correct for each pair/cluster term being counted once from
/// each member's perspective.
pub fn total_lattice_energy(model: &Model, lattice: &EnvironmentLattice) -> f64 {
    let sum: f64 = (0..lattice.states.len())
        .map(|site_index| {
            let particle = lattice.site(site_index).particle;
            site_energy_for_particle(model, lattice, site_index, particle)
        })
        .sum();
    sum / 2.0
}

/// One uniform draw against `frequency_factor`: `true` means "skip
/// without computing ΔE", incrementing the caller's skip counter.
/// Only meaningful when `frequency_factor <= 1 - epsilon`; factors at
/// or above that always proceed.
pub fn frequency_precheck(rng: &mut Pcg32, frequency_factor: f64) -> bool {
    if frequency_factor > 1.0 - FREQUENCY_EPSILON {
        return false;
    }
    let u = rng.next_random_double();
    u > frequency_factor
}
