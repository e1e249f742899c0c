//! The immutable input model: lattice geometry, particles, pair/cluster
//! tables, jump directions/rules, and the job header. Loaded once,
//! never mutated afterward — every kernel component borrows from it.

pub mod env_def;
pub mod job;
pub mod jump;
pub mod lattice;
pub mod source;
pub mod tables;

use serde::{Deserialize, Serialize};

use self::env_def::EnvironmentDefinition;
use self::job::{JobKind, UnitCell};
use self::jump::{normalize_direction_ranges, JumpCollection, JumpDirection};
use self::lattice::SupercellDims;
use self::tables::{ClusterTable, PairTable};
use crate::error::{EngineError, EngineResult};
use crate::vector::Vec3;

pub const PARTICLE_VOID: u8 = 0;
pub const PARTICLE_SENTINEL: u8 = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub dims: SupercellDims,
    pub pair_tables: Vec<PairTable>,
    pub cluster_tables: Vec<ClusterTable>,
    pub env_defs: Vec<EnvironmentDefinition>,
    /// Dense, collection-id-sorted sequence; collections reference a
    /// contiguous sub-range by index (see `JumpCollection::direction_range`).
    pub jump_directions: Vec<JumpDirection>,
    pub jump_collections: Vec<JumpCollection>,
    pub job: JobKind,
    pub unit_cell: UnitCell,
    /// Elementary-charge multiples, indexed by particle id.
    pub particle_charges: Vec<f64>,
    /// Normalized electric field direction.
    pub field_vector: Vec3,
    pub field_magnitude: f64,
    /// Initial particle id per site, in linear-index order.
    pub initial_lattice: Vec<u8>,
}

impl Model {
    /// Runs post-load normalization: computes each jump collection's
    /// `[begin, end)` direction range in one linear scan, and performs
    /// the structural validation a real DB loader would have to do
    /// before handing a model to the kernel.
    pub fn finalize(mut self) -> EngineResult<Self> {
        normalize_direction_ranges(&self.jump_directions, &mut self.jump_collections);
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.initial_lattice.len() != self.dims.site_count() {
            return Err(EngineError::Validation(format!(
                "initial lattice has {} sites, supercell expects {}",
                self.initial_lattice.len(),
                self.dims.site_count()
            )));
        }
        for dir in &self.jump_directions {
            if !(2..=8).contains(&dir.path_len()) {
                return Err(EngineError::Validation(format!(
                    "jump direction path length {} outside [2, 8]",
                    dir.path_len()
                )));
            }
            if dir.movement_sequence.len() != dir.jump_sequence.len() {
                return Err(EngineError::Validation(
                    "jump direction movement sequence length mismatch".into(),
                ));
            }
        }
        for (idx, def) in self.env_defs.iter().enumerate() {
            if def.position_id as usize != idx {
                return Err(EngineError::Validation(format!(
                    "environment definition at slot {idx} has mismatched position_id {}",
                    def.position_id
                )));
            }
        }
        Ok(())
    }

    pub fn env_def(&self, position_id: u32) -> &EnvironmentDefinition {
        &self.env_defs[position_id as usize]
    }

    pub fn pair_table(&self, id: usize) -> &PairTable {
        &self.pair_tables[id]
    }

    pub fn cluster_table(&self, id: usize) -> &ClusterTable {
        &self.cluster_tables[id]
    }

    pub fn jump_collection(&self, id: u32) -> &JumpCollection {
        &self.jump_collections[id as usize]
    }

    /// Directions belonging to `collection_id`, via the normalized range.
    pub fn directions_of(&self, collection_id: u32) -> &[JumpDirection] {
        let (begin, end) = self.jump_collection(collection_id).direction_range;
        &self.jump_directions[begin..end]
    }

    pub fn charge_of(&self, particle: u8) -> f64 {
        self.particle_charges
            .get(particle as usize)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn site_count(&self) -> usize {
        self.dims.site_count()
    }

    /// Number of `(direction, rule)` combinations by which `particle`
    /// could start a jump from a site of position type `position_id`.
    ///
    /// Returns `-1` if no jump direction in the model ever starts at
    /// this position type at all (the position is structurally static
    /// and never participates in transitions); returns `0` if
    /// directions exist there but none apply to `particle` (a
    /// passively-mobile site); otherwise the positive count used to
    /// bucket the site into the selection pool.
    pub fn jump_count(&self, position_id: u32, particle: u8) -> i32 {
        let mut any_direction_here = false;
        let mut matching = 0i32;
        for dir in &self.jump_directions {
            if dir.start_position_id != position_id {
                continue;
            }
            any_direction_here = true;
            let collection = self.jump_collection(dir.collection_id);
            if collection.mobile_mask & (1u64 << particle) == 0 {
                continue;
            }
            let matches_any_rule = collection
                .rules
                .iter()
                .any(|rule| rule.state0.first() == Some(&particle));
            if matches_any_rule {
                matching += 1;
            }
        }
        if !any_direction_here {
            -1
        } else {
            matching
        }
    }

    /// The `index`-th direction (in declaration order) that would be
    /// counted by `jump_count(position_id, particle)` for the same
    /// arguments. Panics if `index` is out of range; callers only ever
    /// pass indices a selection draw produced against that same count.
    pub fn matching_direction(&self, position_id: u32, particle: u8, index: usize) -> &JumpDirection {
        let mut seen = 0usize;
        for dir in &self.jump_directions {
            if dir.start_position_id != position_id {
                continue;
            }
            let collection = self.jump_collection(dir.collection_id);
            if collection.mobile_mask & (1u64 << particle) == 0 {
                continue;
            }
            let matches_any_rule = collection
                .rules
                .iter()
                .any(|rule| rule.state0.first() == Some(&particle));
            if !matches_any_rule {
                continue;
            }
            if seen == index {
                return dir;
            }
            seen += 1;
        }
        panic!("direction index {index} out of range for position {position_id} particle {particle}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastexp::FastExpMode;
    use crate::model::job::{JobKind, KmcJobParams, UnitCell};

    fn minimal_model() -> Model {
        Model {
            dims: SupercellDims::new(1, 1, 2, 1),
            pair_tables: vec![PairTable::from_entries(vec![(1, 2, 1.0)])],
            cluster_tables: vec![],
            env_defs: vec![EnvironmentDefinition {
                position_id: 0,
                selection_mask: 0b110,
                update_particle_ids: vec![1, 2],
                pair_interactions: vec![],
                cluster_interactions: vec![],
                allowed_particles: vec![0, 1, 2],
            }],
            jump_directions: vec![],
            jump_collections: vec![],
            job: JobKind::Kmc(KmcJobParams {
                temperature_kelvin: 1000.0,
                normalization: 1.0,
                fast_exp_mode: FastExpMode::Rms,
                use_prerun: false,
                prerun_mcsp: 0,
                target_mcsp: 100,
                time_limit_secs: 3600,
                use_frequency_precheck: true,
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
    fn finalize_accepts_a_well_formed_model() {
        assert!(minimal_model().finalize().is_ok());
    }

    #[test]
    fn finalize_rejects_lattice_size_mismatch() {
        let mut model = minimal_model();
        model.initial_lattice.push(1);
        assert!(model.finalize().is_err());
    }
}
