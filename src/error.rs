//! Engine-wide error taxonomy.
//!
//! Mirrors the original solver's `error_t` return codes, but as a typed
//! Rust enum instead of an integer code threaded through every call site.
//! Most kernel functions return `Result<T, EngineError>` and propagate with
//! `?`; a handful of per-cycle conditions (a forbidden jump, a blocked
//! site) are not errors at all and are represented as plain enum values or
//! counters rather than `Err` variants — see `transition` and `selection`.

use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the simulation engine.
///
/// `is_fatal` distinguishes conditions that must abort the current routine
/// (and trigger a best-effort state save) from those that are logged and
/// tallied but otherwise survived.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("null pointer / missing required field: {0}")]
    NullPointer(String),

    #[error("memory allocation failed: {0}")]
    MemAllocation(String),

    #[error("buffer overflow: wrote {attempted} bytes into a {capacity}-byte region")]
    BufferOverflow { attempted: usize, capacity: usize },

    #[error("state image is internally inconsistent: {0}")]
    DataConsistency(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("file error at {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no mobile particles are registered in this model")]
    NoMobiles,

    #[error("requested feature is unavailable, falling back to default: {0}")]
    UseDefault(String),

    #[error("routine loading failed: {0}")]
    RoutineLoad(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl EngineError {
    /// Whether this condition must abort the routine that raised it.
    ///
    /// `UseDefault` is deliberately non-fatal: callers that receive it are
    /// expected to fall back to a default value and keep running, the same
    /// contract the original solver used for its `ERR_USEDEFAULT` code.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::UseDefault(_))
    }

    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::File {
            path: path.into(),
            source,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
