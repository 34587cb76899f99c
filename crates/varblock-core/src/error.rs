//! Error types for varblock-core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlockError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    /// A vector, slice or sink does not have the size the block range needs.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Rejected parameter value; the previous value is kept.
    #[error("Invalid parameter '{name}': {value} (must be finite and positive)")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Block has no global offset assigned")]
    Unassigned,

    #[error("Offsets are stale: call update_offsets() after changing the block set")]
    StaleOffsets,

    #[error("Block range starting at {offset} overlaps previous range ending at {previous_end}")]
    OverlappingOffsets { offset: usize, previous_end: usize },

    #[error("Archive error on field '{field}': {message}")]
    Archive { field: String, message: String },

    #[error("Unsupported version {found} for '{class}' (supported up to {supported})")]
    UnsupportedVersion {
        class: String,
        found: u32,
        supported: u32,
    },

    #[error("Unknown block kind: {0}")]
    UnknownKind(String),

    #[error("Sparse format error: {0}")]
    Sparse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BlockError {
    pub(crate) fn archive(field: &str, message: impl Into<String>) -> Self {
        BlockError::Archive {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Checks a local vector length against the block DOF count.
pub(crate) fn check_len(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(BlockError::DimensionMismatch { expected, found });
    }
    Ok(())
}
