//! Versioned archive interface for block state.
//!
//! Blocks report their persistent fields to an [`ArchiveOut`] and restore
//! them from an [`ArchiveIn`]. The traits are deliberately small so that any
//! storage format can sit behind them; [`BlockRecord`] is the in-memory,
//! serde-serializable implementation used by the descriptor and by
//! `varblock-io`.

use crate::error::{BlockError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field sink for serializing a block.
pub trait ArchiveOut {
    fn write_version(&mut self, class: &str, version: u32);
    fn write_f64(&mut self, name: &str, value: f64);
    fn write_usize(&mut self, name: &str, value: usize);
    fn write_bool(&mut self, name: &str, value: bool);
}

/// Field source for deserializing a block.
pub trait ArchiveIn {
    /// Version the record was written with for `class`.
    fn read_version(&mut self, class: &str) -> Result<u32>;
    fn read_f64(&mut self, name: &str) -> Result<f64>;
    fn read_usize(&mut self, name: &str) -> Result<usize>;
    fn read_bool(&mut self, name: &str) -> Result<bool>;
}

/// Reads the version for `class` and rejects anything newer than `supported`.
pub fn read_checked_version(archive: &mut dyn ArchiveIn, class: &str, supported: u32) -> Result<u32> {
    let found = archive.read_version(class)?;
    if found > supported {
        return Err(BlockError::UnsupportedVersion {
            class: class.to_string(),
            found,
            supported,
        });
    }
    Ok(found)
}

/// A single named field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Integer(u64),
    Real(f64),
}

/// One persisted block: its factory kind, per-class versions and fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockRecord {
    pub kind: String,
    pub versions: BTreeMap<String, u32>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl BlockRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    fn field(&self, name: &str) -> Result<FieldValue> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| BlockError::archive(name, "missing field"))
    }
}

impl ArchiveOut for BlockRecord {
    fn write_version(&mut self, class: &str, version: u32) {
        self.versions.insert(class.to_string(), version);
    }

    fn write_f64(&mut self, name: &str, value: f64) {
        self.fields.insert(name.to_string(), FieldValue::Real(value));
    }

    fn write_usize(&mut self, name: &str, value: usize) {
        self.fields
            .insert(name.to_string(), FieldValue::Integer(value as u64));
    }

    fn write_bool(&mut self, name: &str, value: bool) {
        self.fields.insert(name.to_string(), FieldValue::Bool(value));
    }
}

impl ArchiveIn for BlockRecord {
    fn read_version(&mut self, class: &str) -> Result<u32> {
        self.versions
            .get(class)
            .copied()
            .ok_or_else(|| BlockError::archive(class, "missing version"))
    }

    fn read_f64(&mut self, name: &str) -> Result<f64> {
        // JSON drops the fractional part of integral reals, so accept both.
        match self.field(name)? {
            FieldValue::Real(v) => Ok(v),
            FieldValue::Integer(v) => Ok(v as f64),
            FieldValue::Bool(_) => Err(BlockError::archive(name, "expected a real number")),
        }
    }

    fn read_usize(&mut self, name: &str) -> Result<usize> {
        match self.field(name)? {
            FieldValue::Integer(v) => {
                usize::try_from(v).map_err(|_| BlockError::archive(name, "integer out of range"))
            }
            _ => Err(BlockError::archive(name, "expected an unsigned integer")),
        }
    }

    fn read_bool(&mut self, name: &str) -> Result<bool> {
        match self.field(name)? {
            FieldValue::Bool(v) => Ok(v),
            _ => Err(BlockError::archive(name, "expected a boolean")),
        }
    }
}
