//! The state image: one contiguous byte buffer partitioned by a header
//! into typed sub-regions, and the serialization anchor for run/prerun
//! checkpoint files.
//!
//! Per the design notes this is realized as a single owned `Vec<u8>`
//! plus a set of range views derived from the header; raw offset
//! arithmetic is confined to this module. Every other component reads
//! and writes its region through `StateImage::region`/`region_mut` and
//! (de)serializes its own logical contents with `bincode`.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Set once, after the pre-run phase has reset counters/trackers/histograms.
pub const STATE_FLG_PRERUN_RESET: u32 = 1 << 0;
/// Set when the kernel detects an internal inconsistency (e.g. a
/// selection draw that matches no pool) so the saved image records it.
pub const STATE_FLG_SIMERROR: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Meta,
    Lattice,
    /// The selection pool's bucket layout. Not named among the
    /// original region list, but required for exact post-restore
    /// determinism: rebuilding the pool from the lattice alone yields
    /// buckets in ascending site-index order, which generally differs
    /// from the scrambled order a pool reaches after many swap-pop
    /// updates, and that ordering is what `select_uniform` maps RNG
    /// draws through.
    Pool,
    Counters,
    GlobalTrackers,
    MobileTrackers,
    StaticTrackers,
    MobileTrackerMapping,
    JumpStatistics,
}

const REGION_ORDER: [Region; 9] = [
    Region::Meta,
    Region::Lattice,
    Region::Pool,
    Region::Counters,
    Region::GlobalTrackers,
    Region::MobileTrackers,
    Region::StaticTrackers,
    Region::MobileTrackerMapping,
    Region::JumpStatistics,
];

const NUM_REGIONS: usize = REGION_ORDER.len();
/// 8 region start offsets (u64) + buffer length (u64) + flags (u32), with
/// 4 bytes of padding so the header has a fixed, alignment-friendly size.
const HEADER_SIZE: usize = NUM_REGIONS * 8 + 8 + 4 + 4;

#[derive(Debug, Clone, Copy)]
struct StateHeader {
    region_starts: [u64; NUM_REGIONS],
    buffer_len: u64,
    flags: u32,
}

impl StateHeader {
    fn write_to(&self, buffer: &mut [u8]) {
        let mut cursor = 0usize;
        for start in &self.region_starts {
            buffer[cursor..cursor + 8].copy_from_slice(&start.to_le_bytes());
            cursor += 8;
        }
        buffer[cursor..cursor + 8].copy_from_slice(&self.buffer_len.to_le_bytes());
        cursor += 8;
        buffer[cursor..cursor + 4].copy_from_slice(&self.flags.to_le_bytes());
    }

    fn read_from(buffer: &[u8]) -> EngineResult<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(EngineError::DataConsistency(
                "buffer too small to contain a state header".into(),
            ));
        }
        let mut region_starts = [0u64; NUM_REGIONS];
        let mut cursor = 0usize;
        for slot in &mut region_starts {
            *slot = u64::from_le_bytes(buffer[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
        }
        let buffer_len = u64::from_le_bytes(buffer[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let flags = u32::from_le_bytes(buffer[cursor..cursor + 4].try_into().unwrap());
        Ok(StateHeader {
            region_starts,
            buffer_len,
            flags,
        })
    }
}

pub struct StateImage {
    buffer: Vec<u8>,
    header: StateHeader,
}

impl StateImage {
    /// Allocates a fresh image with the given per-region byte sizes
    /// (in `REGION_ORDER`), zero-initialized.
    pub fn allocate(region_sizes: [usize; NUM_REGIONS]) -> Self {
        let mut region_starts = [0u64; NUM_REGIONS];
        let mut cursor = HEADER_SIZE;
        for (i, size) in region_sizes.iter().enumerate() {
            region_starts[i] = cursor as u64;
            cursor += size;
        }
        let header = StateHeader {
            region_starts,
            buffer_len: cursor as u64,
            flags: 0,
        };
        let mut buffer = vec![0u8; cursor];
        header.write_to(&mut buffer);
        StateImage { buffer, header }
    }

    /// Validates the header against the buffer and yields an image with
    /// typed-view accessors over its regions. Any offset out of bounds
    /// or out of order is a `DataConsistency` error — the kernel must
    /// refuse to run on such an image.
    pub fn restore_access(buffer: Vec<u8>) -> EngineResult<Self> {
        let header = StateHeader::read_from(&buffer)?;

        if header.buffer_len as usize != buffer.len() {
            return Err(EngineError::DataConsistency(format!(
                "header declares buffer length {} but got {} bytes",
                header.buffer_len,
                buffer.len()
            )));
        }

        // Region 0 may start exactly at the header boundary (the common
        // case), but every later region must start strictly past the one
        // before it: a zero-size region sharing its predecessor's start
        // is not a region at all.
        let mut previous: Option<u64> = None;
        for (i, &start) in header.region_starts.iter().enumerate() {
            match previous {
                None if start < HEADER_SIZE as u64 => {
                    return Err(EngineError::DataConsistency(format!(
                        "region {i} start {start} falls inside the header"
                    )));
                }
                Some(prev) if start <= prev => {
                    return Err(EngineError::DataConsistency(format!(
                        "region {i} start {start} does not strictly increase past {prev}"
                    )));
                }
                _ => {}
            }
            if start > header.buffer_len {
                return Err(EngineError::DataConsistency(format!(
                    "region {i} start {start} exceeds buffer end {}",
                    header.buffer_len
                )));
            }
            previous = Some(start);
        }

        Ok(StateImage { buffer, header })
    }

    pub fn load_from_file(path: &Path) -> EngineResult<Self> {
        let bytes = fs::read(path).map_err(|e| EngineError::file(path, e))?;
        Self::restore_access(bytes)
    }

    /// Atomic write: write to a `.tmp` sibling, then rename over the
    /// destination.
    pub fn save_to_file(&self, path: &Path) -> EngineResult<()> {
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| EngineError::file(&tmp_path, e))?;
            file.write_all(&self.buffer)
                .map_err(|e| EngineError::file(&tmp_path, e))?;
            file.sync_all().map_err(|e| EngineError::file(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, path).map_err(|e| EngineError::file(path, e))?;
        Ok(())
    }

    fn region_index(region: Region) -> usize {
        REGION_ORDER.iter().position(|r| *r == region).unwrap()
    }

    /// `[start, end)` byte range of a region within the buffer.
    pub fn region_range(&self, region: Region) -> (usize, usize) {
        let idx = Self::region_index(region);
        let start = self.header.region_starts[idx] as usize;
        let end = if idx + 1 < NUM_REGIONS {
            self.header.region_starts[idx + 1] as usize
        } else {
            self.header.buffer_len as usize
        };
        (start, end)
    }

    pub fn region(&self, region: Region) -> &[u8] {
        let (start, end) = self.region_range(region);
        &self.buffer[start..end]
    }

    pub fn region_mut(&mut self, region: Region) -> &mut [u8] {
        let (start, end) = self.region_range(region);
        &mut self.buffer[start..end]
    }

    pub fn flags(&self) -> u32 {
        self.header.flags
    }

    pub fn set_flag(&mut self, flag: u32) {
        self.header.flags |= flag;
        self.header.write_to(&mut self.buffer);
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.header.flags & flag != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}
