use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use varblock_core::{BlockRecord, DescriptorConfig, VariableDescriptor};

use crate::error::{IoError, Result};

pub const BLOCK_SET_SCHEMA_VERSION: u32 = 1;

/// On-disk form of a descriptor's blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockSetFile {
    pub schema_version: u32,
    pub records: Vec<BlockRecord>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for BlockSetFile {
    fn default() -> Self {
        Self {
            schema_version: BLOCK_SET_SCHEMA_VERSION,
            records: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl BlockSetFile {
    pub fn from_descriptor(descriptor: &VariableDescriptor, metadata: BTreeMap<String, String>) -> Self {
        Self {
            records: descriptor.to_records(),
            metadata,
            ..Self::default()
        }
    }

    /// Rebuild the descriptor. The result still needs `update_offsets()`.
    pub fn into_descriptor(self, config: DescriptorConfig) -> Result<VariableDescriptor> {
        if self.schema_version > BLOCK_SET_SCHEMA_VERSION {
            return Err(IoError::UnsupportedSchema {
                found: self.schema_version,
                supported: BLOCK_SET_SCHEMA_VERSION,
            });
        }
        Ok(VariableDescriptor::from_records(&self.records, config)?)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn save_block_set(
    path: impl AsRef<Path>,
    descriptor: &VariableDescriptor,
    metadata: BTreeMap<String, String>,
) -> Result<()> {
    let path = path.as_ref();
    let file = BlockSetFile::from_descriptor(descriptor, metadata);
    write_json(path, &file)?;
    log::debug!("Saved {} block records to {}", file.records.len(), path.display());
    Ok(())
}

pub fn read_block_set(path: impl AsRef<Path>) -> Result<BlockSetFile> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Load a block set into a descriptor using `config`.
pub fn load_block_set(path: impl AsRef<Path>, config: DescriptorConfig) -> Result<VariableDescriptor> {
    let path = path.as_ref();
    let descriptor = read_block_set(path)?.into_descriptor(config)?;
    log::debug!("Loaded {} blocks from {}", descriptor.len(), path.display());
    Ok(descriptor)
}

pub fn save_config(path: impl AsRef<Path>, config: &DescriptorConfig) -> Result<()> {
    write_json(path.as_ref(), config)
}

/// Read a descriptor config; missing fields take their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<DescriptorConfig> {
    let bytes = fs::read(path)?;
    let config: DescriptorConfig = serde_json::from_slice(&bytes)?;
    config.validate()?;
    Ok(config)
}
