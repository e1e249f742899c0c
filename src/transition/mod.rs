//! The transition protocol: KMC and MMC cycles built on top of the
//! selection pool and energy engine. A cycle draws a candidate event,
//! evaluates it, and either commits the resulting occupation change or
//! leaves the lattice untouched.
//!
//! Trial energies are evaluated against the lattice as it stands before
//! any mutation (`energy::site_energy_for_particle` takes a hypothetical
//! occupation rather than requiring an in-place edit), so there is no
//! backup/restore step: a rejected cycle simply never calls
//! `apply_state2`.

use crate::energy::{compute_jump_energies, frequency_precheck, resolve_jump_path};
use crate::environment::{EnvironmentLattice, JPOOL_DIRCOUNT_STATIC};
use crate::error::{EngineError, EngineResult};
use crate::fastexp::{fast_exp, FastExpMode};
use crate::model::job::KmcJobParams;
use crate::model::Model;
use crate::rng::Pcg32;
use crate::selection::SelectionPool;
use crate::vector::Vec3;

/// Clamp applied to a Metropolis exponent before handing it to
/// `fast_exp`; barriers above this are accepted with probability 0
/// regardless, and the bit-trick approximation is only calibrated near
/// the region libm's `exp` itself stays normal.
const EXPONENT_FLOOR: f64 = -700.0;

/// `min(1, fast_exp(-delta_e_kt))`. `delta_e_kt` is a barrier or energy
/// difference already expressed in kT; non-positive values always
/// accept without invoking the approximation.
pub fn acceptance_probability(delta_e_kt: f64, mode: FastExpMode) -> f64 {
    if delta_e_kt <= 0.0 {
        return 1.0;
    }
    let exponent = (-delta_e_kt).max(EXPONENT_FLOOR);
    fast_exp(exponent, mode).min(1.0)
}

/// `min(1, frequencyFactor * exp(-delta_e_kt))`, per spec.md §4.6 step
/// 5. Folding `frequencyFactor` in via `-ln(frequencyFactor)` shifted
/// into the exponent (rather than multiplying `acceptance_probability`'s
/// result afterward) keeps the favorable-move case correct: a
/// favorable barrier with a sub-unity frequency factor must still come
/// out below 1, which post-multiplying the already-clamped `1.0` would
/// lose. `frequency_factor <= 0.0` drives the exponent to `+inf`
/// (`ln(0) = -inf`), so such a rule never accepts.
pub fn frequency_weighted_acceptance_probability(delta_e_kt: f64, frequency_factor: f64, mode: FastExpMode) -> f64 {
    let exponent_shift = -frequency_factor.ln();
    acceptance_probability(delta_e_kt + exponent_shift, mode)
}

fn refresh_site_stability(model: &Model, lattice: &mut EnvironmentLattice, site_index: usize) {
    let (position_id, particle) = {
        let site = lattice.site(site_index);
        (site.position_id, site.particle)
    };
    let jump_count = model.jump_count(position_id, particle);
    let site = lattice.site_mut(site_index);
    site.is_stable = jump_count != JPOOL_DIRCOUNT_STATIC;
    site.is_mobile = site.is_stable && jump_count >= 0;
}

/// Result of one KMC cycle.
#[derive(Debug, Clone)]
pub struct KmcCycleOutcome {
    pub site_index: usize,
    pub path: Vec<usize>,
    /// The particle species whose counters this cycle charges against,
    /// i.e. the mobile occupant of the pool-selected site.
    pub particle: u8,
    /// `false` when no rule's state-0 matched the path's current
    /// occupation (a neighbor along the path blocked the jump).
    pub rule_found: bool,
    /// `true` when a matching rule was found but a path site was
    /// already unstable at state-0; the cycle returns without touching
    /// the energy engine.
    pub unstable_start: bool,
    pub skipped_by_frequency: bool,
    pub accepted: bool,
    /// Set when an accepted jump leaves a path site unstable at
    /// state-2; still counts as an accepted step.
    pub unstable_end: bool,
    pub delta_time: f64,
    pub movement_sequence: Vec<Vec3>,
    pub tracker_order_code: Vec<u8>,
    pub collection_id: u32,
}

/// Runs one KMC cycle: select, match a rule against the path's current
/// occupation, optionally frequency-precheck, evaluate the Metropolis
/// barrier, and commit on accept.
///
/// Simulated time always advances by
/// `1 / (normalization * selectableJumpCount * fastestRate)`, independent
/// of whether this particular cycle's event was accepted — the fixed
/// time step is an ensemble-average residence time, not a per-event one.
pub fn run_kmc_cycle(
    model: &Model,
    lattice: &mut EnvironmentLattice,
    pool: &mut SelectionPool,
    rng: &mut Pcg32,
    params: &KmcJobParams,
    fastest_rate: f64,
) -> EngineResult<KmcCycleOutcome> {
    let selection = pool.select_uniform(rng)?;
    let site_index = selection.site_index;
    let (position_id, particle) = {
        let site = lattice.site(site_index);
        (site.position_id, site.particle)
    };
    let direction = model
        .matching_direction(position_id, particle, selection.direction_index)
        .clone();
    let path = resolve_jump_path(model, lattice, site_index, &direction);
    let occupations: Vec<u8> = path.sites.iter().map(|&s| lattice.site(s).particle).collect();
    let collection = model.jump_collection(direction.collection_id);
    let rule = collection
        .rules
        .iter()
        .find(|rule| rule.matches_state0(&occupations));

    let selectable_jump_count = pool.selectable_jump_count().max(1);
    let delta_time = 1.0 / (params.normalization * selectable_jump_count as f64 * fastest_rate);

    let Some(rule) = rule else {
        return Ok(KmcCycleOutcome {
            site_index,
            path: path.sites,
            particle,
            rule_found: false,
            unstable_start: false,
            skipped_by_frequency: false,
            accepted: false,
            unstable_end: false,
            delta_time,
            movement_sequence: direction.movement_sequence,
            tracker_order_code: Vec::new(),
            collection_id: direction.collection_id,
        });
    };

    if path.sites.iter().any(|&s| !lattice.site(s).is_stable) {
        return Ok(KmcCycleOutcome {
            site_index,
            path: path.sites,
            particle,
            rule_found: true,
            unstable_start: true,
            skipped_by_frequency: false,
            accepted: false,
            unstable_end: false,
            delta_time,
            movement_sequence: direction.movement_sequence,
            tracker_order_code: rule.tracker_order_code.clone(),
            collection_id: direction.collection_id,
        });
    }

    if params.use_frequency_precheck && frequency_precheck(rng, rule.frequency_factor) {
        return Ok(KmcCycleOutcome {
            site_index,
            path: path.sites,
            particle,
            rule_found: true,
            unstable_start: false,
            skipped_by_frequency: true,
            accepted: false,
            unstable_end: false,
            delta_time,
            movement_sequence: direction.movement_sequence,
            tracker_order_code: rule.tracker_order_code.clone(),
            collection_id: direction.collection_id,
        });
    }

    let energies = compute_jump_energies(
        model,
        lattice,
        &path,
        &direction,
        rule.static_activation_energy,
        &rule.state0,
        &rule.state2,
    );
    let effective_barrier = energies.s1_energy + energies.s0_to_s2_delta_energy.max(0.0);
    let probability = frequency_weighted_acceptance_probability(effective_barrier, rule.frequency_factor, params.fast_exp_mode);
    let accepted = rng.next_random_double() < probability;

    let mut unstable_end = false;
    if accepted {
        apply_state2(model, lattice, pool, &path.sites, &rule.state2);
        unstable_end = path.sites.iter().any(|&s| !lattice.site(s).is_stable);
    }

    Ok(KmcCycleOutcome {
        site_index,
        path: path.sites,
        particle,
        rule_found: true,
        unstable_start: false,
        skipped_by_frequency: false,
        accepted,
        unstable_end,
        delta_time,
        movement_sequence: direction.movement_sequence,
        tracker_order_code: rule.tracker_order_code.clone(),
        collection_id: direction.collection_id,
    })
}

fn apply_state2(
    model: &Model,
    lattice: &mut EnvironmentLattice,
    pool: &mut SelectionPool,
    path: &[usize],
    state2: &[u8],
) {
    for (&site_index, &particle) in path.iter().zip(state2) {
        lattice.site_mut(site_index).particle = particle;
    }
    for &site_index in path {
        refresh_site_stability(model, lattice, site_index);
        pool.update_after_cycle(model, lattice, site_index);
    }
}

/// Result of one MMC cycle.
#[derive(Debug, Clone, Copy)]
pub struct MmcCycleOutcome {
    pub site_a: usize,
    pub site_b: usize,
    /// The species occupying `site_a` before the trial swap; the
    /// species charged for this cycle's counters.
    pub particle_a: u8,
    pub accepted: bool,
}

/// Runs one MMC cycle: draw a mobile site from the pool, draw an
/// independent uniform partner site across the whole lattice, and test
/// the occupation swap with a Metropolis criterion on the total energy
/// difference (scaled by `alpha` when given, per the MMCFE sweep). No
/// jump-rule catalog or simulated time is involved; this samples
/// configuration space directly rather than following physical jump
/// paths.
pub fn run_mmc_cycle(
    model: &Model,
    lattice: &mut EnvironmentLattice,
    pool: &mut SelectionPool,
    rng: &mut Pcg32,
    mode: FastExpMode,
    alpha: Option<f64>,
) -> EngineResult<MmcCycleOutcome> {
    let selection = pool.select_uniform(rng)?;
    let site_a = selection.site_index;
    let site_b = SelectionPool::select_partner_offset(rng, model.site_count());

    let particle_a = lattice.site(site_a).particle;

    if site_a == site_b {
        return Ok(MmcCycleOutcome {
            site_a,
            site_b,
            particle_a,
            accepted: false,
        });
    }

    let particle_b = lattice.site(site_b).particle;
    if particle_a == particle_b {
        return Ok(MmcCycleOutcome {
            site_a,
            site_b,
            particle_a,
            accepted: false,
        });
    }

    let before = crate::energy::site_energy_for_particle(model, lattice, site_a, particle_a)
        + crate::energy::site_energy_for_particle(model, lattice, site_b, particle_b);
    let after = crate::energy::site_energy_for_particle(model, lattice, site_a, particle_b)
        + crate::energy::site_energy_for_particle(model, lattice, site_b, particle_a);
    let delta_e = (after - before) * alpha.unwrap_or(1.0);

    let probability = acceptance_probability(delta_e, mode);
    let accepted = rng.next_random_double() < probability;

    if accepted {
        lattice.site_mut(site_a).particle = particle_b;
        lattice.site_mut(site_b).particle = particle_a;
        refresh_site_stability(model, lattice, site_a);
        refresh_site_stability(model, lattice, site_b);
        pool.update_after_cycle(model, lattice, site_a);
        pool.update_after_cycle(model, lattice, site_b);
    }

    Ok(MmcCycleOutcome {
        site_a,
        site_b,
        particle_a,
        accepted,
    })
}
