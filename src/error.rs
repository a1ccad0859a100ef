//! Error type shared by the profiling engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by profiler operations
#[derive(Error, Debug)]
pub enum ProfileError {
    /// Every slot of a track table is bound; more call sites than capacity.
    /// This is a configuration error: raise `BLOCK_CAPACITY`.
    #[error("block table of track {track} is exhausted ({capacity} slots); increase BLOCK_CAPACITY")]
    TableExhausted { track: usize, capacity: usize },

    #[error("track \"{name}\" could not be added: profiler already holds {capacity} tracks")]
    TrackCapacityExceeded { name: String, capacity: usize },

    #[error("track index {index} out of range (capacity {capacity})")]
    TrackOutOfRange { index: usize, capacity: usize },

    #[error("slot index {index} out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },

    #[error("no active profiler; call set_profiler first")]
    NoActiveProfiler,

    #[error("active profiler is already borrowed")]
    ProfilerBusy,

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProfileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProfileError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for profiler operations
pub type Result<T> = std::result::Result<T, ProfileError>;
