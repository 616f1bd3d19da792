//! Error types for Sp3ctra

use thiserror::Error;

/// Core error type
///
/// Init failures are fatal: the caller must refuse to start. Runtime
/// conditions (ingest stalls, underruns, bad buffers) are absorbed locally
/// with silence and bounded logging and never surface here.
#[derive(Error, Debug)]
pub enum SpError {
    #[error("Waveform table ram overflow: {requested} samples exceeds cap of {cap}")]
    RamOverflow { requested: usize, cap: usize },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type SpResult<T> = Result<T, SpError>;
