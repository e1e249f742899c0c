//! Jump directions, rules, and collections — the transition catalog a
//! selected site is matched against.

use serde::{Deserialize, Serialize};

use super::lattice::RelativeOffset;
use crate::vector::Vec3;

/// A named transition of path length `L` in `[2, 8]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpDirection {
    pub start_position_id: u32,
    /// Relative 4-vector offsets, one per path slot, resolved against
    /// the start site under periodic boundary conditions.
    pub jump_sequence: Vec<RelativeOffset>,
    /// Cartesian displacement per path slot.
    pub movement_sequence: Vec<Vec3>,
    pub collection_id: u32,
    pub jump_length: u8,
    pub electric_field_factor: f64,
}

impl JumpDirection {
    pub fn path_len(&self) -> usize {
        self.jump_sequence.len()
    }
}

/// A rule belonging to a jump collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpRule {
    pub state0: Vec<u8>,
    pub state1: Vec<u8>,
    pub state2: Vec<u8>,
    pub frequency_factor: f64,
    pub static_activation_energy: f64,
    /// Length-`L` permutation applied to the path's mobile-tracker
    /// indices on accept.
    pub tracker_order_code: Vec<u8>,
    pub mobile_mask: u64,
}

impl JumpRule {
    /// Whether this rule's state-0 vector matches the particles
    /// currently occupying the path slots.
    pub fn matches_state0(&self, occupations: &[u8]) -> bool {
        self.state0 == occupations
    }
}

/// A family of rules and directions sharing a mobile-particle mask. The
/// direction range is a `[begin, end)` slice into the model's single
/// dense, collection-sorted direction sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpCollection {
    pub mobile_mask: u64,
    pub rules: Vec<JumpRule>,
    pub direction_range: (usize, usize),
}

/// Computes `[begin, end)` sub-sequence bounds for each collection in a
/// single linear scan over a directions sequence sorted by
/// `collection_id`. Mutates each `JumpCollection.direction_range`
/// in-place.
///
/// # Panics
/// Panics if `directions` is not sorted by `collection_id`, or if a
/// direction references a collection index out of range — both
/// indicate a malformed model that should have been rejected at load.
pub fn normalize_direction_ranges(
    directions: &[JumpDirection],
    collections: &mut [JumpCollection],
) {
    let mut last_collection: i64 = -1;
    let mut start = 0usize;
    for (idx, dir) in directions.iter().enumerate() {
        let collection_id = dir.collection_id as i64;
        assert!(
            collection_id >= last_collection,
            "jump directions must be sorted by collection_id"
        );
        if collection_id != last_collection {
            if last_collection >= 0 {
                collections[last_collection as usize].direction_range = (start, idx);
            }
            start = idx;
            last_collection = collection_id;
        }
    }
    if last_collection >= 0 {
        collections[last_collection as usize].direction_range = (start, directions.len());
    }
}
