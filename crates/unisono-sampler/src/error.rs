//! Error types for unisono-sampler.

use thiserror::Error;

/// Error type for sampler load operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed file: {0}")]
    Format(String),

    #[error("Required chunk missing: {0}")]
    ChunkMissing(&'static str),

    #[error("No sample data loaded")]
    NotLoaded,

    #[error("Unknown preset: bank {bank}, program {program}")]
    UnknownPreset { bank: u16, program: u16 },

    #[error("Invalid slice range: {start}..{end}")]
    InvalidSlice { start: usize, end: usize },
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
