//! Environment definitions: the per-sub-lattice-position blueprint of
//! neighbor interactions that every environment state (`environment`
//! module) links back to by position id.

use serde::{Deserialize, Serialize};

use super::lattice::RelativeOffset;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInteraction {
    pub offset: RelativeOffset,
    pub pair_table_id: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInteraction {
    pub offsets: Vec<RelativeOffset>,
    pub cluster_table_id: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDefinition {
    pub position_id: u32,
    /// Bitmask over particle ids (bit `p` set means particle `p` makes a
    /// site of this position type a selection candidate).
    pub selection_mask: u64,
    pub update_particle_ids: Vec<u8>,
    pub pair_interactions: Vec<PairInteraction>,
    pub cluster_interactions: Vec<ClusterInteraction>,
    pub allowed_particles: Vec<u8>,
}

impl EnvironmentDefinition {
    pub fn allows(&self, particle: u8) -> bool {
        self.allowed_particles.contains(&particle)
    }

    pub fn is_selection_candidate(&self, particle: u8) -> bool {
        particle < 64 && self.selection_mask & (1 << particle) != 0
    }
}
