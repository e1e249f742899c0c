//! Lattice addressing: converting between the 4-vector site address
//! `(a, b, c, d)` and the linear index used everywhere else, and
//! resolving relative jump offsets against a start site under periodic
//! boundary conditions.

use serde::{Deserialize, Serialize};

/// A site address: `(a, b, c)` indexes a unit cell, `d` indexes the
/// sub-lattice position within that cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
}

impl CellCoord {
    pub fn new(a: i32, b: i32, c: i32, d: i32) -> Self {
        CellCoord { a, b, c, d }
    }
}

/// A relative 4-vector offset, as stored on a jump direction's sequence.
pub type RelativeOffset = (i32, i32, i32, i32);

/// Supercell extents in unit cells (`a`, `b`, `c`) plus the number of
/// sub-lattice positions per cell (`d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupercellDims {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl SupercellDims {
    pub fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        SupercellDims { a, b, c, d }
    }

    /// Block sizes `{B0, B1, B2}` used for linear indexing: `B2 = d`,
    /// `B1 = c * B2`, `B0 = b * B1`.
    #[inline]
    pub fn blocks(&self) -> (u32, u32, u32) {
        let b2 = self.d;
        let b1 = self.c * b2;
        let b0 = self.b * b1;
        (b0, b1, b2)
    }

    pub fn site_count(&self) -> usize {
        (self.a as usize) * (self.b as usize) * (self.c as usize) * (self.d as usize)
    }

    /// Linear index for a normalized (already-wrapped) coordinate.
    #[inline]
    pub fn linear_index(&self, coord: CellCoord) -> usize {
        let (b0, b1, b2) = self.blocks();
        (coord.a as u32 * b0 + coord.b as u32 * b1 + coord.c as u32 * b2 + coord.d as u32) as usize
    }

    /// Inverse of `linear_index`: successive quotient/remainder against
    /// the block sizes.
    pub fn coord_of(&self, mut index: usize) -> CellCoord {
        let (b0, b1, b2) = self.blocks();
        let a = index / b0 as usize;
        index -= a * b0 as usize;
        let b = index / b1 as usize;
        index -= b * b1 as usize;
        let c = index / b2 as usize;
        index -= c * b2 as usize;
        let d = index;
        CellCoord::new(a as i32, b as i32, c as i32, d as i32)
    }

    /// Resolves a relative offset against a start coordinate, wrapping
    /// the (a, b, c) part modulo the supercell extents. `d` is not
    /// periodic: it must already land inside `[0, d)`.
    pub fn resolve_offset(&self, start: CellCoord, offset: RelativeOffset) -> CellCoord {
        let wrap = |v: i32, extent: u32| -> i32 {
            let extent = extent as i32;
            ((v % extent) + extent) % extent
        };
        CellCoord::new(
            wrap(start.a + offset.0, self.a),
            wrap(start.b + offset.1, self.b),
            wrap(start.c + offset.2, self.c),
            start.d + offset.3,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_index_roundtrips() {
        let dims = SupercellDims::new(4, 3, 2, 2);
        for a in 0..4 {
            for b in 0..3 {
                for c in 0..2 {
                    for d in 0..2 {
                        let coord = CellCoord::new(a, b, c, d);
                        let idx = dims.linear_index(coord);
                        assert_eq!(dims.coord_of(idx), coord);
                    }
                }
            }
        }
    }

    #[test]
    fn resolve_offset_wraps_periodically() {
        let dims = SupercellDims::new(2, 2, 2, 1);
        let start = CellCoord::new(0, 0, 0, 0);
        let wrapped = dims.resolve_offset(start, (-1, 0, 0, 0));
        assert_eq!(wrapped, CellCoord::new(1, 0, 0, 0));
    }

    #[test]
    fn site_count_matches_volume() {
        let dims = SupercellDims::new(3, 3, 3, 2);
        assert_eq!(dims.site_count(), 3 * 3 * 3 * 2);
    }
}
