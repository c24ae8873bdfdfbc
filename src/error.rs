//! Error types shared by the index readers, generators and tile loaders.

use mapscout_types::GeoBox;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::TypeId;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MapscoutError>;

#[derive(Error, Debug)]
pub enum MapscoutError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrong magic or unsupported version in a file header.
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// A structural invariant of an index file does not hold.
    #[error("Corrupt index '{}' at offset {offset}: expected {expected}, found {actual}", file.display())]
    CorruptIndex {
        file: PathBuf,
        offset: u64,
        expected: String,
        actual: String,
    },

    #[error("Unknown type id {0}")]
    UnknownType(TypeId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Box {0} is not valid for this operation")]
    InvalidBox(GeoBox),

    /// A breaker fired while the operation was running.
    #[error("Operation aborted")]
    Aborted,

    #[error("Database '{}' is not open", .0.display())]
    DatabaseClosed(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MapscoutError {
    pub(crate) fn corrupt(
        file: impl Into<PathBuf>,
        offset: u64,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        MapscoutError::CorruptIndex {
            file: file.into(),
            offset,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
