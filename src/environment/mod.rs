//! Environment lattice: the dense, per-site mutable state the
//! transition protocol reads and writes every cycle. Definitions
//! (immutable blueprints) live in `model::env_def`; this module is the
//! per-site instance data derived from them at startup.

use serde::{Deserialize, Serialize};

use crate::model::lattice::{CellCoord, SupercellDims};
use crate::model::Model;

/// Sentinel used for "not currently in a selection pool" and "no
/// mobile-tracker assigned".
pub const NOT_SELECTABLE: usize = usize::MAX;

/// Returned by `Model::jump_count` for a position type that never
/// participates in any modeled transition.
pub const JPOOL_DIRCOUNT_STATIC: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub coord: CellCoord,
    pub particle: u8,
    pub is_stable: bool,
    pub is_mobile: bool,
    pub pool_id: usize,
    pub pool_position: usize,
    pub mobile_tracker_id: usize,
    pub position_id: u32,
    /// Per-interaction energy contributions (pair then cluster, in the
    /// order the environment definition lists them), kept current so
    /// the total site energy is O(1) after an update.
    pub energy_partials: Vec<f64>,
}

impl EnvironmentState {
    pub fn is_selectable(&self) -> bool {
        self.pool_id != NOT_SELECTABLE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentLattice {
    pub dims: SupercellDims,
    pub states: Vec<EnvironmentState>,
}

impl EnvironmentLattice {
    /// Builds the initial lattice from a finalized model: links each
    /// site's environment definition by sub-lattice position id, sets
    /// its particle id from the input lattice, and derives `is_stable`
    /// from `jump_count(positionType, particle) != JPOOL_DIRCOUNT_STATIC`.
    /// Per-interaction energy partials start at zero; the energy engine
    /// populates them lazily on first touch.
    pub fn from_model(model: &Model) -> Self {
        let dims = model.dims;
        let mut states = Vec::with_capacity(model.site_count());
        for idx in 0..model.site_count() {
            let coord = dims.coord_of(idx);
            let position_id = coord.d as u32;
            let particle = model.initial_lattice[idx];
            let env_def = model.env_def(position_id);
            let jump_count = model.jump_count(position_id, particle);
            let is_stable = jump_count != JPOOL_DIRCOUNT_STATIC;
            let is_mobile = is_stable && jump_count >= 0;
            let num_partials = env_def.pair_interactions.len() + env_def.cluster_interactions.len();
            states.push(EnvironmentState {
                coord,
                particle,
                is_stable,
                is_mobile,
                pool_id: NOT_SELECTABLE,
                pool_position: 0,
                mobile_tracker_id: NOT_SELECTABLE,
                position_id,
                energy_partials: vec![0.0; num_partials],
            });
        }
        EnvironmentLattice { dims, states }
    }

    pub fn site(&self, index: usize) -> &EnvironmentState {
        &self.states[index]
    }

    pub fn site_mut(&mut self, index: usize) -> &mut EnvironmentState {
        &mut self.states[index]
    }

    pub fn index_of(&self, coord: CellCoord) -> usize {
        self.dims.linear_index(coord)
    }

    /// `particle(s) in allowedParticles(envDef(s))` for every stable
    /// site — invariant #3 of the testable properties.
    pub fn check_allowed_particles(&self, model: &Model) -> bool {
        self.states.iter().all(|s| {
            !s.is_stable || model.env_def(s.position_id).allows(s.particle)
        })
    }
}
