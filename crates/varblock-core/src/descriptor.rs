//! Variable descriptor: owns the blocks of a system, assigns their global
//! offsets and runs the per-iteration passes over them.
//!
//! ## Offset epochs
//!
//! 1. Blocks are inserted, removed or (de)activated; the indexing is stale.
//! 2. [`VariableDescriptor::update_offsets`] walks blocks in insertion order
//!    and gives every active block a contiguous range `[offset, offset + dof)`.
//! 3. Passes (products, diagonal, sparse paste, gather/scatter) may run until
//!    the next structural change.
//!
//! ## Parallel passes
//!
//! Each active block owns a disjoint slice of any global vector, so a pass
//! can carve the output vector into per-block `&mut` slices and hand them to
//! rayon workers without locking. Results match the sequential path exactly
//! because every index is written by one block only.

use crate::archive::BlockRecord;
use crate::config::DescriptorConfig;
use crate::error::{BlockError, Result};
use crate::sink::{SparseSink, SparseTriplets};
use crate::variables::{VariableBlock, block_from_record, block_to_record};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use std::ops::Range;

/// Handle of a block inside a [`VariableDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Global assembler and pass runner for a set of variable blocks.
#[derive(Debug)]
pub struct VariableDescriptor {
    blocks: Vec<Option<Box<dyn VariableBlock>>>,
    config: DescriptorConfig,
    total_dofs: usize,
    epoch: u64,
    stale: bool,
}

impl Default for VariableDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableDescriptor {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            config: DescriptorConfig::default(),
            total_dofs: 0,
            epoch: 0,
            stale: true,
        }
    }

    pub fn with_config(config: DescriptorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DescriptorConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    // Block set

    pub fn insert<B: VariableBlock + 'static>(&mut self, block: B) -> BlockId {
        self.insert_boxed(Box::new(block))
    }

    pub fn insert_boxed(&mut self, mut block: Box<dyn VariableBlock>) -> BlockId {
        block.header_mut().set_offset(None);
        self.blocks.push(Some(block));
        self.stale = true;
        BlockId(self.blocks.len() - 1)
    }

    /// Remove a block. Its id is not reused.
    pub fn remove(&mut self, id: BlockId) -> Option<Box<dyn VariableBlock>> {
        let mut block = self.blocks.get_mut(id.0)?.take()?;
        block.header_mut().set_offset(None);
        self.stale = true;
        Some(block)
    }

    pub fn get(&self, id: BlockId) -> Option<&dyn VariableBlock> {
        self.blocks.get(id.0)?.as_deref()
    }

    /// Mutable access. Ends the current offset epoch, since the caller may
    /// toggle activity.
    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut dyn VariableBlock> {
        let slot = self.blocks.get_mut(id.0)?.as_mut()?;
        self.stale = true;
        Some(&mut **slot)
    }

    pub fn get_as<T: VariableBlock + 'static>(&self, id: BlockId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    /// Typed mutable access; ends the offset epoch like [`Self::get_mut`].
    pub fn get_mut_as<T: VariableBlock + 'static>(&mut self, id: BlockId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn set_active(&mut self, id: BlockId, active: bool) -> bool {
        match self.get_mut(id) {
            Some(block) => {
                block.set_active(active);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &dyn VariableBlock)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_deref().map(|b| (BlockId(i), b)))
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_count(&self) -> usize {
        self.blocks.iter().flatten().filter(|b| b.is_active()).count()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.total_dofs = 0;
        self.stale = true;
    }

    // Offset assembly

    /// Assign contiguous offsets to all active blocks and start a new epoch.
    ///
    /// Inactive blocks lose their offset. Returns the number of active DOFs.
    pub fn update_offsets(&mut self) -> usize {
        let mut offset = 0;
        for block in self.blocks.iter_mut().flatten() {
            if block.is_active() {
                block.header_mut().set_offset(Some(offset));
                offset += block.dof();
            } else {
                block.header_mut().set_offset(None);
            }
        }

        self.total_dofs = offset;
        self.epoch += 1;
        self.stale = false;
        log::debug!(
            "Assigned offsets for epoch {}: {} active DOFs in {} blocks",
            self.epoch,
            offset,
            self.active_count()
        );
        offset
    }

    /// Drop every offset; passes fail until the next `update_offsets()`.
    pub fn invalidate_offsets(&mut self) {
        for block in self.blocks.iter_mut().flatten() {
            block.header_mut().set_offset(None);
        }
        self.total_dofs = 0;
        self.stale = true;
    }

    /// Number of active DOFs of the current epoch.
    pub fn total_dofs(&self) -> usize {
        self.total_dofs
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Check that active block ranges are assigned and pairwise disjoint.
    pub fn validate_offsets(&self) -> Result<()> {
        let mut ranges = self
            .active_blocks()
            .iter()
            .map(|b| b.assigned_offset().map(|o| o..o + b.dof()))
            .collect::<Result<Vec<_>>>()?;
        ranges.sort_by_key(|r| r.start);

        let mut previous_end = 0;
        for range in ranges {
            if range.start < previous_end {
                return Err(BlockError::OverlappingOffsets {
                    offset: range.start,
                    previous_end,
                });
            }
            previous_end = range.end;
        }
        Ok(())
    }

    fn ensure_ready(&self, len: usize) -> Result<()> {
        if self.stale {
            return Err(BlockError::StaleOffsets);
        }
        if len < self.total_dofs {
            return Err(BlockError::DimensionMismatch {
                expected: self.total_dofs,
                found: len,
            });
        }
        Ok(())
    }

    fn active_blocks(&self) -> Vec<&dyn VariableBlock> {
        self.blocks
            .iter()
            .flatten()
            .filter(|b| b.is_active())
            .map(|b| &**b)
            .collect()
    }

    /// Run `op` once per active block with the block's range and its slice
    /// of `out`, sequentially or on the rayon pool.
    fn for_each_block_slice<F>(&self, out: &mut [f64], op: F) -> Result<()>
    where
        F: Fn(&dyn VariableBlock, Range<usize>, &mut [f64]) -> Result<()> + Send + Sync,
    {
        let blocks = self.active_blocks();
        if self.config.use_parallel(blocks.len()) {
            log::trace!("Parallel pass over {} blocks", blocks.len());
            split_disjoint(blocks, out)?
                .into_par_iter()
                .try_for_each(|(block, range, slice)| op(block, range, slice))
        } else {
            log::trace!("Sequential pass over {} blocks", blocks.len());
            debug_assert!(self.validate_offsets().is_ok());
            blocks.into_iter().try_for_each(|block| {
                let range = block.global_range(out.len())?;
                op(block, range.clone(), &mut out[range])
            })
        }
    }

    // Passes

    /// `result += scale · M · vect` over all active blocks.
    pub fn system_product(&self, result: &mut [f64], vect: &[f64], scale: f64) -> Result<()> {
        self.ensure_ready(result.len())?;
        self.ensure_ready(vect.len())?;
        self.for_each_block_slice(result, |block, range, out| {
            block.accumulate_scaled_mass_times_slice(out, &vect[range], scale)
        })
    }

    /// `result[block] := M⁻¹ · vect[block]` for every active block.
    ///
    /// Indices not owned by an active block are left alone.
    pub fn inverse_mass_product(&self, result: &mut [f64], vect: &[f64]) -> Result<()> {
        self.ensure_ready(result.len())?;
        self.ensure_ready(vect.len())?;
        self.for_each_block_slice(result, |block, range, out| {
            block.compute_inverse_mass_times_vector(out, &vect[range])
        })
    }

    /// `diag += scale · diag(M)` over all active blocks.
    pub fn build_diagonal(&self, diag: &mut [f64], scale: f64) -> Result<()> {
        self.ensure_ready(diag.len())?;
        self.for_each_block_slice(diag, |block, _, out| {
            block.accumulate_scaled_mass_diagonal_slice(out, scale)
        })
    }

    /// Paste `scale · M` of every active block into `sink`.
    pub fn paste_mass_into(
        &self,
        sink: &mut dyn SparseSink,
        row_offset: usize,
        col_offset: usize,
        scale: f64,
    ) -> Result<()> {
        self.ensure_ready(self.total_dofs)?;
        for block in self.active_blocks() {
            block.write_mass_block_into_sparse_matrix(sink, row_offset, col_offset, scale)?;
        }
        Ok(())
    }

    /// Scaled global mass matrix as COO triplets (`total_dofs` square).
    pub fn mass_triplets(&self, scale: f64) -> Result<SparseTriplets> {
        let n = self.total_dofs;
        let mut triplets = SparseTriplets::with_capacity(n, n, n);
        self.paste_mass_into(&mut triplets, 0, 0, scale)?;
        Ok(triplets)
    }

    /// Scaled global mass matrix in CSR format.
    pub fn mass_matrix(&self, scale: f64) -> Result<CsrMatrix<f64>> {
        self.mass_triplets(scale)?
            .to_csr(self.config.drop_tolerance)
    }

    // Block state gather/scatter

    /// Gather block velocities into a global vector.
    pub fn velocities_to_vector(&self) -> Result<DVector<f64>> {
        self.gather(|block| block.header().velocity().as_slice())
    }

    /// Scatter a global vector into block velocities.
    pub fn vector_to_velocities(&mut self, vect: &[f64]) -> Result<()> {
        self.ensure_ready(vect.len())?;
        for block in self.blocks.iter_mut().flatten().filter(|b| b.is_active()) {
            let range = block.global_range(vect.len())?;
            block.header_mut().velocity_mut().copy_from_slice(&vect[range]);
        }
        Ok(())
    }

    /// Gather block forces into a global vector.
    pub fn forces_to_vector(&self) -> Result<DVector<f64>> {
        self.gather(|block| block.header().force().as_slice())
    }

    /// Scatter a global vector into block forces.
    pub fn vector_to_forces(&mut self, vect: &[f64]) -> Result<()> {
        self.ensure_ready(vect.len())?;
        for block in self.blocks.iter_mut().flatten().filter(|b| b.is_active()) {
            let range = block.global_range(vect.len())?;
            block.header_mut().force_mut().copy_from_slice(&vect[range]);
        }
        Ok(())
    }

    fn gather<'a, F>(&'a self, local: F) -> Result<DVector<f64>>
    where
        F: Fn(&'a dyn VariableBlock) -> &'a [f64],
    {
        self.ensure_ready(self.total_dofs)?;
        let mut global = DVector::zeros(self.total_dofs);
        for block in self.active_blocks() {
            let range = block.global_range(global.len())?;
            global.as_mut_slice()[range].copy_from_slice(local(block));
        }
        Ok(global)
    }

    /// Set each active block's velocity to `M⁻¹ · force`.
    pub fn solve_free_velocities(&mut self) -> Result<()> {
        if self.stale {
            return Err(BlockError::StaleOffsets);
        }
        let parallel = self.config.use_parallel(self.active_count());
        let solve = |block: &mut Box<dyn VariableBlock>| -> Result<()> {
            let mut velocity = DVector::zeros(block.dof());
            block.compute_inverse_mass_times_vector(
                velocity.as_mut_slice(),
                block.header().force().as_slice(),
            )?;
            *block.header_mut().velocity_mut() = velocity;
            Ok(())
        };

        if parallel {
            self.blocks
                .par_iter_mut()
                .flatten()
                .filter(|b| b.is_active())
                .try_for_each(solve)
        } else {
            self.blocks
                .iter_mut()
                .flatten()
                .filter(|b| b.is_active())
                .try_for_each(solve)
        }
    }

    // Persistence

    /// One record per block, in insertion order. Offsets are not persisted.
    pub fn to_records(&self) -> Vec<BlockRecord> {
        self.iter().map(|(_, block)| block_to_record(block)).collect()
    }

    /// Rebuild a descriptor from records. Fails on the first bad record;
    /// the returned descriptor is stale until `update_offsets()`.
    pub fn from_records(records: &[BlockRecord], config: DescriptorConfig) -> Result<Self> {
        let mut descriptor = Self::with_config(config)?;
        for (index, record) in records.iter().enumerate() {
            let block = block_from_record(record).inspect_err(|err| {
                log::warn!("Rejecting block record {index} ({}): {err}", record.kind);
            })?;
            descriptor.insert_boxed(block);
        }
        log::debug!("Restored {} blocks from records", descriptor.len());
        Ok(descriptor)
    }
}

/// Carve `out` into one disjoint slice per block.
///
/// Blocks are sorted by offset first; overlapping ranges are refused since
/// two workers would otherwise alias the same indices.
fn split_disjoint<'a>(
    mut blocks: Vec<&'a dyn VariableBlock>,
    out: &'a mut [f64],
) -> Result<Vec<(&'a dyn VariableBlock, Range<usize>, &'a mut [f64])>> {
    blocks.sort_by_key(|b| b.offset());
    let len = out.len();

    let mut pieces = Vec::with_capacity(blocks.len());
    let mut rest = out;
    let mut consumed = 0;
    for block in blocks {
        let range = block.global_range(len)?;
        if range.start < consumed {
            return Err(BlockError::OverlappingOffsets {
                offset: range.start,
                previous_end: consumed,
            });
        }
        let tail = std::mem::take(&mut rest);
        let (_, tail) = tail.split_at_mut(range.start - consumed);
        let (slice, tail) = tail.split_at_mut(range.len());
        rest = tail;
        consumed = range.end;
        pieces.push((block, range, slice));
    }
    Ok(pieces)
}
