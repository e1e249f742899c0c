//! Pair and cluster interaction energy tables.
//!
//! Both tables are stored sorted by key and looked up with binary
//! search, matching the original solver's `BinarySearch.h` templates —
//! the cluster table additionally permits a linear scan for small
//! (≤8-member) clusters, which is what the occupation code packing
//! below is built for.

use serde::{Deserialize, Serialize};

/// Packs up to 8 surrounding particle ids (one byte each) into a single
/// occupation code, most-significant slot first. `particles.len()` must
/// be `<= 8`.
pub fn encode_occupation_code(particles: &[u8]) -> u64 {
    debug_assert!(particles.len() <= 8);
    let mut code: u64 = 0;
    for &p in particles {
        code = (code << 8) | p as u64;
    }
    code
}

/// Maps an unordered `(particleA, particleB)` pair to an energy in kT.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairTable {
    // Sorted by (a, b) with a <= b.
    entries: Vec<(u8, u8, f64)>,
}

impl PairTable {
    pub fn from_entries(mut entries: Vec<(u8, u8, f64)>) -> Self {
        for entry in &mut entries {
            if entry.0 > entry.1 {
                std::mem::swap(&mut entry.0, &mut entry.1);
            }
        }
        entries.sort_by_key(|e| (e.0, e.1));
        PairTable { entries }
    }

    /// Energy for the unordered pair, or `0.0` if the pair is absent
    /// from the table (no interaction defined).
    pub fn energy(&self, a: u8, b: u8) -> f64 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        match self.entries.binary_search_by_key(&(lo, hi), |e| (e.0, e.1)) {
            Ok(idx) => self.entries[idx].2,
            Err(_) => 0.0,
        }
    }
}

/// Maps `(occupation-code, center-particle)` to an energy in kT.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterTable {
    // Sorted by (code, center).
    entries: Vec<(u64, u8, f64)>,
}

impl ClusterTable {
    pub fn from_entries(mut entries: Vec<(u64, u8, f64)>) -> Self {
        entries.sort_by_key(|e| (e.0, e.1));
        ClusterTable { entries }
    }

    pub fn energy(&self, code: u64, center: u8) -> f64 {
        if self.entries.len() <= 8 {
            return self
                .entries
                .iter()
                .find(|e| e.0 == code && e.1 == center)
                .map(|e| e.2)
                .unwrap_or(0.0);
        }
        match self
            .entries
            .binary_search_by_key(&(code, center), |e| (e.0, e.1))
        {
            Ok(idx) => self.entries[idx].2,
            Err(_) => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_table_is_symmetric() {
        let table = PairTable::from_entries(vec![(1, 2, 1.0), (1, 1, 0.0), (2, 2, 0.0)]);
        assert_eq!(table.energy(1, 2), 1.0);
        assert_eq!(table.energy(2, 1), 1.0);
        assert_eq!(table.energy(1, 1), 0.0);
    }

    #[test]
    fn pair_table_missing_entry_is_zero() {
        let table = PairTable::from_entries(vec![(1, 2, 1.0)]);
        assert_eq!(table.energy(3, 4), 0.0);
    }

    #[test]
    fn cluster_table_lookup_matches_linear_and_binary_paths() {
        let small = ClusterTable::from_entries(vec![(encode_occupation_code(&[1, 2]), 1, 0.5)]);
        assert_eq!(small.energy(encode_occupation_code(&[1, 2]), 1), 0.5);

        let mut large_entries: Vec<(u64, u8, f64)> = (0..20)
            .map(|i| (encode_occupation_code(&[i as u8]), 1, i as f64))
            .collect();
        large_entries.push((encode_occupation_code(&[7]), 1, 7.0));
        let large = ClusterTable::from_entries(large_entries);
        assert_eq!(large.energy(encode_occupation_code(&[7]), 1), 7.0);
        assert_eq!(large.energy(encode_occupation_code(&[99]), 1), 0.0);
    }

    #[test]
    fn occupation_code_packs_msb_first() {
        assert_eq!(encode_occupation_code(&[1, 2]), (1u64 << 8) | 2);
    }
}
