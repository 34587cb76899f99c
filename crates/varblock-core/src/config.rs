//! Descriptor configuration.

use crate::error::{BlockError, Result};
use serde::{Deserialize, Serialize};

/// Options for the global passes run by a
/// [`VariableDescriptor`](crate::descriptor::VariableDescriptor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Run block passes on the rayon pool
    pub parallel: bool,
    /// Minimum number of active blocks before a pass goes parallel
    pub parallel_min_blocks: usize,
    /// Entries with magnitude at or below this are dropped from assembled
    /// sparse mass matrices (0 keeps everything)
    pub drop_tolerance: f64,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_min_blocks: 256,
            drop_tolerance: 0.0,
        }
    }
}

impl DescriptorConfig {
    /// Always sequential, for reproducing reference results.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Default::default()
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_parallel_min_blocks(mut self, min_blocks: usize) -> Self {
        self.parallel_min_blocks = min_blocks;
        self
    }

    pub fn with_drop_tolerance(mut self, tolerance: f64) -> Self {
        self.drop_tolerance = tolerance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.drop_tolerance.is_finite() || self.drop_tolerance < 0.0 {
            return Err(BlockError::Config(format!(
                "drop_tolerance must be finite and non-negative, got {}",
                self.drop_tolerance
            )));
        }
        Ok(())
    }

    /// Whether a pass over `active_blocks` blocks should run in parallel.
    pub fn use_parallel(&self, active_blocks: usize) -> bool {
        self.parallel && active_blocks >= self.parallel_min_blocks.max(1)
    }
}
