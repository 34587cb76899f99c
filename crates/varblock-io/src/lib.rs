//! Persistence for variable-block sets.
//!
//! This crate provides:
//! - **JSON block sets**: one versioned record per block plus free-form
//!   metadata, loaded back through the block factory
//! - **Descriptor config** files (`DescriptorConfig` as JSON)

mod block_set;
pub mod error;

pub use block_set::{
    BLOCK_SET_SCHEMA_VERSION, BlockSetFile, load_block_set, load_config, read_block_set,
    save_block_set, save_config,
};
pub use error::{IoError, Result};
