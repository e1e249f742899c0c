//! Movement bookkeeping: global/mobile/static displacement trackers and
//! the jump-energy histograms the statistics module later reduces into
//! mobility and conductivity figures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::environment::{EnvironmentLattice, NOT_SELECTABLE};
use crate::vector::Vec3;

/// Number of bins in a fixed-range jump-energy histogram.
pub const STATE_JUMPSTAT_SIZE: usize = 1000;
/// Upper edge (eV) of the fixed jump-energy histogram range; the lower
/// edge is always zero.
pub const STATE_JUMPSTAT_MAX_EV: f64 = 5.0;

/// A fixed-range histogram over `[0, STATE_JUMPSTAT_MAX_EV)` eV, used
/// for the per-(jump-collection, particle) energy distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedHistogram {
    bins: Vec<u64>,
    underflow: u64,
    overflow: u64,
}

impl FixedHistogram {
    pub fn new() -> Self {
        FixedHistogram {
            bins: vec![0; STATE_JUMPSTAT_SIZE],
            underflow: 0,
            overflow: 0,
        }
    }

    pub fn record(&mut self, value_ev: f64) {
        if value_ev < 0.0 {
            self.underflow += 1;
            return;
        }
        if value_ev >= STATE_JUMPSTAT_MAX_EV {
            self.overflow += 1;
            return;
        }
        let bin = (value_ev / STATE_JUMPSTAT_MAX_EV * STATE_JUMPSTAT_SIZE as f64) as usize;
        self.bins[bin.min(STATE_JUMPSTAT_SIZE - 1)] += 1;
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }
}

impl Default for FixedHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// The four fixed-range histograms kept per `(jump collection, particle)`
/// pair: the activation (S1) energy, the conformational delta, the
/// total state-0-to-state-2 delta, and the effective Metropolis barrier
/// actually tested against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JumpStatBucket {
    pub s1_energy: FixedHistogram,
    pub conformation_delta: FixedHistogram,
    pub s0_to_s2_delta: FixedHistogram,
    pub effective_barrier: FixedHistogram,
}

/// Per-`(collection_id, particle)` jump statistics, built lazily as new
/// combinations are observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JumpStatistics {
    buckets: HashMap<(u32, u8), JumpStatBucket>,
}

impl JumpStatistics {
    pub fn new() -> Self {
        JumpStatistics::default()
    }

    pub fn bucket_mut(&mut self, collection_id: u32, particle: u8) -> &mut JumpStatBucket {
        self.buckets.entry((collection_id, particle)).or_default()
    }

    pub fn bucket(&self, collection_id: u32, particle: u8) -> Option<&JumpStatBucket> {
        self.buckets.get(&(collection_id, particle))
    }

    /// Every observed `(collection_id, particle)` bucket, for reporting.
    pub fn iter(&self) -> impl Iterator<Item = (&(u32, u8), &JumpStatBucket)> {
        self.buckets.iter()
    }
}

/// A histogram whose range is reconfigured at runtime around a center
/// value, used by the MMCFE logging phase to sample lattice energy
/// fluctuations around an evolving mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicHistogram {
    bins: Vec<u64>,
    center: f64,
    half_width: f64,
    underflow: u64,
    overflow: u64,
}

impl DynamicHistogram {
    pub fn new(num_bins: usize) -> Self {
        DynamicHistogram {
            bins: vec![0; num_bins],
            center: 0.0,
            half_width: 1.0,
            underflow: 0,
            overflow: 0,
        }
    }

    /// Re-centers the histogram on `[center - half_width, center + half_width)`
    /// and clears all accumulated counts.
    pub fn set_range(&mut self, center: f64, half_width: f64) {
        self.center = center;
        self.half_width = half_width;
        self.bins.iter_mut().for_each(|b| *b = 0);
        self.underflow = 0;
        self.overflow = 0;
    }

    pub fn record(&mut self, value: f64) {
        let low = self.center - self.half_width;
        let high = self.center + self.half_width;
        if value < low {
            self.underflow += 1;
            return;
        }
        if value >= high {
            self.overflow += 1;
            return;
        }
        let bin = ((value - low) / (high - low) * self.bins.len() as f64) as usize;
        self.bins[bin.min(self.bins.len() - 1)] += 1;
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }
}

/// Global (keyed by `(jump_collection_id, particle)`), per-mobile-tracker,
/// and static (keyed by `(position_id, particle)`) displacement
/// accumulators, plus the inverse mapping from mobile-tracker id to its
/// current lattice site. The global and static trackers are keyed the
/// same way `JumpStatistics` already is, so two mobile species sharing a
/// jump collection or a position type never have their displacements
/// summed together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trackers {
    pub global: HashMap<(u32, u8), Vec3>,
    pub mobile: Vec<Vec3>,
    pub static_by_position: HashMap<(u32, u8), Vec3>,
    pub mobile_tracker_mapping: Vec<usize>,
    pub jump_statistics: JumpStatistics,
}

impl Trackers {
    pub fn new(num_mobile_trackers: usize, _num_position_ids: usize) -> Self {
        Trackers {
            global: HashMap::new(),
            mobile: vec![Vec3::zero(); num_mobile_trackers],
            static_by_position: HashMap::new(),
            mobile_tracker_mapping: vec![NOT_SELECTABLE; num_mobile_trackers],
            jump_statistics: JumpStatistics::new(),
        }
    }

    /// Assigns sequential tracker ids to every mobile site in `lattice`,
    /// in linear-index order. Called once at startup (and again after
    /// the pre-run reset, per the scheduler's phase transition).
    pub fn assign_initial(&mut self, lattice: &mut EnvironmentLattice) {
        let mut next_id = 0usize;
        for (idx, site) in lattice.states.iter_mut().enumerate() {
            if site.is_mobile {
                site.mobile_tracker_id = next_id;
                if next_id < self.mobile_tracker_mapping.len() {
                    self.mobile_tracker_mapping[next_id] = idx;
                }
                next_id += 1;
            }
        }
    }

    /// Records the displacement an accepted jump along `path` induces,
    /// then permutes the path slots' mobile-tracker ids per
    /// `tracker_order_code` (the identity of a tracked particle follows
    /// it across the jump, even though the lattice addresses its new
    /// position by slot, not by tracker). `collection_id` keys the
    /// global accumulator alongside each slot's own particle species, so
    /// it must be the jump collection the moving path belongs to.
    pub fn apply_movement(
        &mut self,
        lattice: &mut EnvironmentLattice,
        path: &[usize],
        movement_sequence: &[Vec3],
        tracker_order_code: &[u8],
        collection_id: u32,
    ) {
        for (slot, &site_index) in path.iter().enumerate() {
            let site = lattice.site(site_index);
            if site.mobile_tracker_id == NOT_SELECTABLE {
                continue;
            }
            let movement = movement_sequence[slot];
            let particle = site.particle;
            let position_id = site.position_id as u32;
            self.mobile[site.mobile_tracker_id] += movement;
            *self.static_by_position.entry((position_id, particle)).or_insert_with(Vec3::zero) += movement;
            *self.global.entry((collection_id, particle)).or_insert_with(Vec3::zero) += movement;
        }

        if tracker_order_code.is_empty() {
            return;
        }
        let trackers_before: Vec<usize> = path.iter().map(|&s| lattice.site(s).mobile_tracker_id).collect();
        for (new_slot, &old_slot) in tracker_order_code.iter().enumerate() {
            let tracker_id = trackers_before[old_slot as usize];
            let new_site = path[new_slot];
            lattice.site_mut(new_site).mobile_tracker_id = tracker_id;
            if tracker_id != NOT_SELECTABLE && tracker_id < self.mobile_tracker_mapping.len() {
                self.mobile_tracker_mapping[tracker_id] = new_site;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_histogram_buckets_in_range_values() {
        let mut hist = FixedHistogram::new();
        hist.record(0.0);
        hist.record(4.999);
        hist.record(-1.0);
        hist.record(5.0);
        assert_eq!(hist.underflow(), 1);
        assert_eq!(hist.overflow(), 1);
        assert_eq!(hist.bins().iter().sum::<u64>(), 2);
    }

    #[test]
    fn dynamic_histogram_reset_on_set_range() {
        let mut hist = DynamicHistogram::new(10);
        hist.set_range(0.0, 1.0);
        hist.record(0.5);
        assert_eq!(hist.bins().iter().sum::<u64>(), 1);
        hist.set_range(5.0, 2.0);
        assert_eq!(hist.bins().iter().sum::<u64>(), 0);
    }

    #[test]
    fn movement_permutes_tracker_ids_along_path() {
        let dims = crate::model::lattice::SupercellDims::new(1, 1, 2, 1);
        let mut lattice = EnvironmentLattice {
            dims,
            states: (0..2)
                .map(|i| crate::environment::EnvironmentState {
                    coord: dims.coord_of(i),
                    particle: 1,
                    is_stable: true,
                    is_mobile: true,
                    pool_id: NOT_SELECTABLE,
                    pool_position: 0,
                    mobile_tracker_id: NOT_SELECTABLE,
                    position_id: 0,
                    energy_partials: vec![],
                })
                .collect(),
        };
        let mut trackers = Trackers::new(2, 1);
        trackers.assign_initial(&mut lattice);
        let tracker_at_0 = lattice.site(0).mobile_tracker_id;

        let movement = vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        trackers.apply_movement(&mut lattice, &[0, 1], &movement, &[1, 0], 0);

        assert_eq!(lattice.site(1).mobile_tracker_id, tracker_at_0);
        assert_eq!(
            trackers.mobile_tracker_mapping[tracker_at_0],
            1
        );
        assert_eq!(trackers.global[&(0, 1)], Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn movement_keeps_global_and_static_trackers_separate_per_particle() {
        let dims = crate::model::lattice::SupercellDims::new(1, 1, 2, 1);
        let mut lattice = EnvironmentLattice {
            dims,
            states: vec![
                crate::environment::EnvironmentState {
                    coord: dims.coord_of(0),
                    particle: 1,
                    is_stable: true,
                    is_mobile: true,
                    pool_id: NOT_SELECTABLE,
                    pool_position: 0,
                    mobile_tracker_id: NOT_SELECTABLE,
                    position_id: 0,
                    energy_partials: vec![],
                },
                crate::environment::EnvironmentState {
                    coord: dims.coord_of(1),
                    particle: 2,
                    is_stable: true,
                    is_mobile: true,
                    pool_id: NOT_SELECTABLE,
                    pool_position: 0,
                    mobile_tracker_id: NOT_SELECTABLE,
                    position_id: 0,
                    energy_partials: vec![],
                },
            ],
        };
        let mut trackers = Trackers::new(2, 1);
        trackers.assign_initial(&mut lattice);

        let movement = vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0)];
        trackers.apply_movement(&mut lattice, &[0, 1], &movement, &[], 0);

        // Two distinct species sharing one position type and one
        // collection must not have their displacements summed together.
        assert_eq!(trackers.global[&(0, 1)], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(trackers.global[&(0, 2)], Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(trackers.static_by_position[&(0, 1)], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(trackers.static_by_position[&(0, 2)], Vec3::new(3.0, 0.0, 0.0));
    }
}
