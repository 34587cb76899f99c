//! Error types for varblock-io

use thiserror::Error;
use varblock_core::BlockError;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(#[from] BlockError),

    #[error("Unsupported block set schema version {found} (supported up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}
