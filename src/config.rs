//! Run configuration: the TOML file describing which model to load,
//! where to read/write state, and how the scheduler should be sized.
//! Kept separate from `Model` itself, which is the simulation's own
//! input data rather than an operator-facing setting.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

fn default_block_size() -> u64 {
    crate::scheduler::CYCLE_BLOCKSIZE_MIN
}

fn default_save_interval_blocks() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Path to the JSON-encoded `InMemoryModelSource` dump to load from.
    pub model_path: PathBuf,
    pub job_id: i64,
    /// Path to write/read the state image checkpoint.
    pub state_path: PathBuf,
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    #[serde(default = "default_save_interval_blocks")]
    pub save_interval_blocks: u64,
    /// Fixed RNG seed pair; omit to seed from wall-clock time.
    pub rng_seed: Option<(u64, u64)>,
    /// Directory scanned for `*.mocext.<dl-suffix>` routine plugins.
    pub routine_plugin_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::file(path, e))?;
        toml::from_str(&text).map_err(|e| EngineError::Validation(format!("invalid run config: {e}")))
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Validation(format!("could not serialize run config: {e}")))?;
        fs::write(path, text).map_err(|e| EngineError::file(path, e))
    }
}
