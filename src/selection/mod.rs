//! Selection pool: buckets sites by their available-direction count and
//! draws uniformly over `(site, direction)` pairs in O(buckets) time.
//! Grounded in the original solver's jump-selection routines: pools are
//! walked in declared order, entries are removed by swap-pop, and the
//! running `SelectableJumpCount` is maintained incrementally rather than
//! recomputed from scratch every cycle.

use serde::{Deserialize, Serialize};

use crate::environment::{EnvironmentLattice, JPOOL_DIRCOUNT_STATIC, NOT_SELECTABLE};
use crate::error::{EngineError, EngineResult};
use crate::model::Model;
use crate::rng::Pcg32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PoolBucket {
    /// Site indices currently bucketed here (bucket index == direction
    /// count `d` for every entry in it).
    entries: Vec<usize>,
}

impl PoolBucket {
    fn position_count(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionPool {
    buckets: Vec<PoolBucket>,
    selectable_jump_count: usize,
}

/// A drawn `(site, direction index within that site's d)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub site_index: usize,
    pub direction_index: usize,
}

impl SelectionPool {
    pub fn selectable_jump_count(&self) -> usize {
        self.selectable_jump_count
    }

    /// Builds the pool from scratch for every site currently in
    /// `lattice`, per §4.4's registration rule.
    pub fn build(model: &Model, lattice: &mut EnvironmentLattice) -> Self {
        let mut pool = SelectionPool {
            buckets: Vec::new(),
            selectable_jump_count: 0,
        };
        for site_index in 0..lattice.states.len() {
            let target = target_pool_bucket(model, lattice, site_index);
            if target != NOT_SELECTABLE {
                pool.push(target, site_index, lattice);
            }
        }
        pool
    }

    fn ensure_bucket(&mut self, bucket_id: usize) {
        if self.buckets.len() <= bucket_id {
            self.buckets.resize(bucket_id + 1, PoolBucket::default());
        }
    }

    fn push(&mut self, bucket_id: usize, site_index: usize, lattice: &mut EnvironmentLattice) {
        self.ensure_bucket(bucket_id);
        let bucket = &mut self.buckets[bucket_id];
        bucket.entries.push(site_index);
        let pos = bucket.entries.len() - 1;
        let site = lattice.site_mut(site_index);
        site.pool_id = bucket_id;
        site.pool_position = pos;
        self.selectable_jump_count += bucket_id;
    }

    fn swap_pop(&mut self, bucket_id: usize, pos: usize, lattice: &mut EnvironmentLattice) {
        let bucket = &mut self.buckets[bucket_id];
        let last = bucket.entries.len() - 1;
        bucket.entries.swap(pos, last);
        let moved_into_pos = bucket.entries[pos];
        bucket.entries.pop();
        if pos != last {
            // The peer that used to sit at `last` now lives at `pos`.
            lattice.site_mut(moved_into_pos).pool_position = pos;
        }
        self.selectable_jump_count -= bucket_id;
    }

    /// Draws a uniform `(site, direction)` pair over the whole pool.
    /// Bias-corrected via `Pcg32::next_ceiled`.
    pub fn select_uniform(&self, rng: &mut Pcg32) -> EngineResult<Selection> {
        if self.selectable_jump_count == 0 {
            return Err(EngineError::NoMobiles);
        }
        let mut r = rng.next_ceiled(self.selectable_jump_count as u32) as usize;
        for (bucket_id, bucket) in self.buckets.iter().enumerate().skip(1) {
            let jump_count = bucket.position_count() * bucket_id;
            if jump_count == 0 {
                continue;
            }
            if jump_count > r {
                let q = r / bucket_id;
                let m = r % bucket_id;
                return Ok(Selection {
                    site_index: bucket.entries[q],
                    direction_index: m,
                });
            }
            r -= jump_count;
        }
        Err(EngineError::Unknown(
            "selection draw matched no pool bucket".into(),
        ))
    }

    /// MMC's extra uniform draw for the swap partner's lattice offset.
    pub fn select_partner_offset(rng: &mut Pcg32, site_count: usize) -> usize {
        rng.next_ceiled(site_count as u32) as usize
    }

    /// Re-derives the pool membership of `site_index` and applies one of
    /// the four documented transitions (no-op / invalid→selectable /
    /// selectable→invalid / selectable→different-selectable). Returns
    /// whether `selectable_jump_count` changed.
    pub fn update_after_cycle(
        &mut self,
        model: &Model,
        lattice: &mut EnvironmentLattice,
        site_index: usize,
    ) -> bool {
        let old_bucket = lattice.site(site_index).pool_id;
        let old_pos = lattice.site(site_index).pool_position;
        let new_bucket = target_pool_bucket(model, lattice, site_index);

        if new_bucket == old_bucket {
            return false;
        }

        if old_bucket != NOT_SELECTABLE {
            self.swap_pop(old_bucket, old_pos, lattice);
        }
        if new_bucket != NOT_SELECTABLE {
            self.push(new_bucket, site_index, lattice);
        } else {
            lattice.site_mut(site_index).pool_id = NOT_SELECTABLE;
        }
        true
    }

    /// Invariant #1: `SelectableJumpCount == Σ pool[k].PositionCount · k`.
    pub fn check_selectable_count_invariant(&self) -> bool {
        let expected: usize = self
            .buckets
            .iter()
            .enumerate()
            .map(|(k, bucket)| bucket.position_count() * k)
            .sum();
        expected == self.selectable_jump_count
    }

    /// Invariant #2: pool membership and site bookkeeping agree in both
    /// directions.
    pub fn check_membership_invariant(&self, lattice: &EnvironmentLattice) -> bool {
        for (bucket_id, bucket) in self.buckets.iter().enumerate() {
            for (pos, &site_index) in bucket.entries.iter().enumerate() {
                let site = lattice.site(site_index);
                if site.pool_id != bucket_id || site.pool_position != pos {
                    return false;
                }
            }
        }
        lattice.states.iter().enumerate().all(|(idx, site)| {
            if site.pool_id == NOT_SELECTABLE {
                true
            } else {
                self.buckets[site.pool_id]
                    .entries
                    .get(site.pool_position)
                    == Some(&idx)
            }
        })
    }
}

/// Target bucket id (== direction count `d`) for a site, or
/// `NOT_SELECTABLE`. Does not mutate the site; callers compare against
/// the site's current `pool_id` to decide which of the four transition
/// cases applies.
fn target_pool_bucket(model: &Model, lattice: &EnvironmentLattice, site_index: usize) -> usize {
    let site = lattice.site(site_index);
    if !site.is_stable {
        return NOT_SELECTABLE;
    }
    let d = model.jump_count(site.position_id, site.particle);
    if d == JPOOL_DIRCOUNT_STATIC || d <= 0 {
        return NOT_SELECTABLE;
    }
    let env_def = model.env_def(site.position_id);
    if env_def.is_selection_candidate(site.particle) {
        d as usize
    } else {
        NOT_SELECTABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentState;
    use crate::model::lattice::{CellCoord, SupercellDims};

    fn stub_lattice(pool_ids: &[usize]) -> EnvironmentLattice {
        let dims = SupercellDims::new(1, 1, pool_ids.len() as u32, 1);
        let states = pool_ids
            .iter()
            .enumerate()
            .map(|(i, _)| EnvironmentState {
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
            .collect();
        EnvironmentLattice { dims, states }
    }

    #[test]
    fn manual_push_then_pop_maintains_invariants() {
        let mut lattice = stub_lattice(&[0, 0, 0]);
        let mut pool = SelectionPool {
            buckets: Vec::new(),
            selectable_jump_count: 0,
        };
        pool.push(2, 0, &mut lattice);
        pool.push(2, 1, &mut lattice);
        pool.push(3, 2, &mut lattice);
        assert_eq!(pool.selectable_jump_count(), 2 + 2 + 3);
        assert!(pool.check_selectable_count_invariant());
        assert!(pool.check_membership_invariant(&lattice));

        let old_pos = lattice.site(0).pool_position;
        pool.swap_pop(2, old_pos, &mut lattice);
        assert_eq!(pool.selectable_jump_count(), 2 + 3);
        assert!(pool.check_selectable_count_invariant());
        assert!(pool.check_membership_invariant(&lattice));
    }

    #[test]
    fn uniform_selection_with_one_entry_always_returns_it() {
        let mut lattice = stub_lattice(&[0]);
        let mut pool = SelectionPool {
            buckets: Vec::new(),
            selectable_jump_count: 0,
        };
        pool.push(1, 0, &mut lattice);
        let mut rng = crate::rng::Pcg32::new(1, 2);
        for _ in 0..50 {
            let selection = pool.select_uniform(&mut rng).unwrap();
            assert_eq!(selection.site_index, 0);
            assert_eq!(selection.direction_index, 0);
        }
    }

    #[test]
    fn empty_pool_is_no_mobiles() {
        let pool = SelectionPool {
            buckets: Vec::new(),
            selectable_jump_count: 0,
        };
        let mut rng = crate::rng::Pcg32::new(1, 2);
        assert!(matches!(
            pool.select_uniform(&mut rng),
            Err(EngineError::NoMobiles)
        ));
    }
}
