//! The model-loading seam. A real deployment loads `Model` from the
//! relational schema described in the job database (`JobModels`,
//! `StructureModels`, ... — out of scope for this crate beyond the
//! shape it produces); tests, demos, and standalone runs instead go
//! through `InMemoryModelSource`, which decodes a JSON-described model
//! whose BLOB-shaped fields use the same *array blob* / *span blob*
//! binary layouts the database loader would have to parse.

use serde::{Deserialize, Serialize};

use super::Model;
use crate::error::{EngineError, EngineResult};

/// Implemented by anything that can produce a finalized `Model` for a
/// job id. A SQL-backed loader is the expected production
/// implementation; this crate ships only `InMemoryModelSource`.
pub trait ModelSource {
    fn load_job(&self, job_id: i64) -> EngineResult<Model>;
}

/// A model description keyed by job id, held entirely in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryModelSource {
    jobs: Vec<(i64, Model)>,
}

impl InMemoryModelSource {
    pub fn new() -> Self {
        InMemoryModelSource { jobs: Vec::new() }
    }

    pub fn with_job(mut self, job_id: i64, model: Model) -> Self {
        self.jobs.push((job_id, model));
        self
    }

    pub fn from_json(bytes: &[u8]) -> EngineResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| EngineError::Validation(format!("invalid model JSON: {e}")))
    }
}

impl Default for InMemoryModelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSource for InMemoryModelSource {
    fn load_job(&self, job_id: i64) -> EngineResult<Model> {
        self.jobs
            .iter()
            .find(|(id, _)| *id == job_id)
            .map(|(_, model)| model.clone())
            .ok_or_else(|| EngineError::Argument(format!("no job with id {job_id}")))?
            .finalize()
    }
}

/// Decodes an *array blob*: `{rank:i32, size:i32, blockSizes[rank-1]:i32 ...}`
/// followed by `size` row-major `f64` elements. Returns the block sizes
/// (length `rank - 1`) and the flat element data.
pub fn decode_array_blob(bytes: &[u8]) -> EngineResult<(Vec<i32>, Vec<f64>)> {
    let read_i32 = |offset: usize| -> EngineResult<i32> {
        bytes
            .get(offset..offset + 4)
            .map(|b| i32::from_le_bytes(b.try_into().unwrap()))
            .ok_or_else(|| EngineError::DataConsistency("array blob header truncated".into()))
    };

    let rank = read_i32(0)?;
    let size = read_i32(4)?;
    if rank < 1 || size < 0 {
        return Err(EngineError::DataConsistency(
            "array blob has invalid rank or size".into(),
        ));
    }

    let mut block_sizes = Vec::with_capacity((rank - 1).max(0) as usize);
    let mut cursor = 8usize;
    for _ in 0..(rank - 1) {
        block_sizes.push(read_i32(cursor)?);
        cursor += 4;
    }

    let expected_bytes = cursor + size as usize * 8;
    if bytes.len() < expected_bytes {
        return Err(EngineError::DataConsistency(format!(
            "array blob declares {size} elements but only {} payload bytes remain",
            bytes.len() - cursor
        )));
    }

    let mut data = Vec::with_capacity(size as usize);
    for i in 0..size as usize {
        let start = cursor + i * 8;
        let value = f64::from_le_bytes(bytes[start..start + 8].try_into().unwrap());
        data.push(value);
    }
    Ok((block_sizes, data))
}

/// Decodes a *span blob*: a raw sequence of `f64` elements with no header.
pub fn decode_span_blob(bytes: &[u8]) -> EngineResult<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(EngineError::DataConsistency(
            "span blob length is not a multiple of 8".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_array_blob(block_sizes: &[i32], data: &[f64]) -> Vec<u8> {
        let rank = block_sizes.len() as i32 + 1;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&rank.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as i32).to_le_bytes());
        for b in block_sizes {
            bytes.extend_from_slice(&b.to_le_bytes());
        }
        for v in data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn array_blob_roundtrips() {
        let blob = encode_array_blob(&[2, 3], &[1.0, 2.0, 3.0, 4.0]);
        let (blocks, data) = decode_array_blob(&blob).unwrap();
        assert_eq!(blocks, vec![2, 3]);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn array_blob_rejects_truncated_payload() {
        let mut blob = encode_array_blob(&[1], &[1.0, 2.0]);
        blob.truncate(blob.len() - 4);
        assert!(decode_array_blob(&blob).is_err());
    }

    #[test]
    fn span_blob_roundtrips() {
        let mut bytes = Vec::new();
        for v in [1.0f64, -2.5, 3.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode_span_blob(&bytes).unwrap(), vec![1.0, -2.5, 3.25]);
    }

    #[test]
    fn span_blob_rejects_misaligned_length() {
        assert!(decode_span_blob(&[0u8; 5]).is_err());
    }
}
