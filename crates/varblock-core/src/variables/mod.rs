//! Variable blocks: groups of DOFs owned by one physical entity.
//!
//! Every block carries a local mass operator and a slot for its global
//! offset. The offset is written by the assembler
//! ([`crate::descriptor::VariableDescriptor`]); blocks only ever read and
//! write the index range `[offset, offset + dof)` of shared global vectors.

use crate::archive::{ArchiveIn, ArchiveOut, read_checked_version};
use crate::error::{BlockError, Result, check_len};
use crate::sink::SparseSink;
use nalgebra::{DMatrix, DVector};
use std::any::Any;
use std::fmt;
use std::ops::Range;

pub mod factory;
pub mod node;

pub use factory::{block_from_record, block_to_record, create_block, registered_kinds};
pub use node::PointMassBlock;

/// Archive class name and version of the shared block state.
pub const HEADER_CLASS: &str = "variables";
pub const HEADER_VERSION: u32 = 1;

/// Non-owning key into a host-side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(pub u64);

/// State shared by every block kind.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    dof: usize,
    offset: Option<usize>,
    disabled: bool,
    /// Local velocities (solver scratch, not persisted)
    velocity: DVector<f64>,
    /// Local forces (solver scratch, not persisted)
    force: DVector<f64>,
}

impl BlockHeader {
    /// Create a header for a block of `dof` DOFs.
    ///
    /// # Panics
    /// If `dof` is zero.
    pub fn new(dof: usize) -> Self {
        assert!(dof > 0, "a variable block needs at least one DOF");
        Self {
            dof,
            offset: None,
            disabled: false,
            velocity: DVector::zeros(dof),
            force: DVector::zeros(dof),
        }
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Assign or clear the global offset. Meant for the assembler.
    pub fn set_offset(&mut self, offset: Option<usize>) {
        self.offset = offset;
    }

    pub fn is_active(&self) -> bool {
        !self.disabled
    }

    pub fn set_active(&mut self, active: bool) {
        self.disabled = !active;
    }

    pub fn velocity(&self) -> &DVector<f64> {
        &self.velocity
    }

    pub fn velocity_mut(&mut self) -> &mut DVector<f64> {
        &mut self.velocity
    }

    pub fn force(&self) -> &DVector<f64> {
        &self.force
    }

    pub fn force_mut(&mut self) -> &mut DVector<f64> {
        &mut self.force
    }

    pub fn archive_out(&self, archive: &mut dyn ArchiveOut) {
        archive.write_version(HEADER_CLASS, HEADER_VERSION);
        archive.write_usize("dof", self.dof);
        archive.write_bool("active", self.is_active());
    }

    /// Read the shared fields without applying them.
    ///
    /// Returns the stored activity flag. The DOF count in the record must
    /// match this header.
    pub fn read_archived(&self, archive: &mut dyn ArchiveIn) -> Result<bool> {
        read_checked_version(archive, HEADER_CLASS, HEADER_VERSION)?;
        let dof = archive.read_usize("dof")?;
        check_len(self.dof, dof)?;
        archive.read_bool("active")
    }
}

/// Algebraic contract of a variable block.
///
/// `M` is the block's local `dof × dof` mass operator. Local operators take
/// length-`dof` vectors. Global operators take vectors sized to the whole
/// system and use the block offset to find their slice; they never touch
/// indices outside `[offset, offset + dof)`.
///
/// Blocks are `Send + Sync` so a descriptor can run one block per worker
/// over disjoint slices of the same global vector.
pub trait VariableBlock: fmt::Debug + Send + Sync {
    fn header(&self) -> &BlockHeader;

    fn header_mut(&mut self) -> &mut BlockHeader;

    /// Factory tag, see [`create_block`].
    fn kind(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `result := M⁻¹ · vect`
    fn compute_inverse_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()>;

    /// `result += M⁻¹ · vect`
    fn accumulate_inverse_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()>;

    /// `result += M · vect`
    fn accumulate_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()>;

    /// `result += scale · M · vect` on this block's already-extracted slices.
    fn accumulate_scaled_mass_times_slice(
        &self,
        result: &mut [f64],
        vect: &[f64],
        scale: f64,
    ) -> Result<()>;

    /// `result += scale · diag(M)` on this block's already-extracted slice.
    fn accumulate_scaled_mass_diagonal_slice(&self, result: &mut [f64], scale: f64) -> Result<()>;

    /// Paste `scale · M` into `sink` at rows `offset + row_offset + i` and
    /// columns `offset + col_offset + j`.
    fn write_mass_block_into_sparse_matrix(
        &self,
        sink: &mut dyn SparseSink,
        row_offset: usize,
        col_offset: usize,
        scale: f64,
    ) -> Result<()>;

    /// Dense local mass matrix.
    fn mass_matrix(&self) -> DMatrix<f64>;

    fn archive_out(&self, archive: &mut dyn ArchiveOut);

    /// Restore persisted state. On error the block is left untouched.
    fn archive_in(&mut self, archive: &mut dyn ArchiveIn) -> Result<()>;

    fn dof(&self) -> usize {
        self.header().dof()
    }

    fn offset(&self) -> Option<usize> {
        self.header().offset()
    }

    fn is_active(&self) -> bool {
        self.header().is_active()
    }

    fn set_active(&mut self, active: bool) {
        self.header_mut().set_active(active);
    }

    /// Offset, or [`BlockError::Unassigned`] before the first assembly.
    fn assigned_offset(&self) -> Result<usize> {
        self.offset().ok_or(BlockError::Unassigned)
    }

    /// Index range of this block in a global vector of length `len`.
    fn global_range(&self, len: usize) -> Result<Range<usize>> {
        let start = self.assigned_offset()?;
        match start.checked_add(self.dof()) {
            Some(end) if end <= len => Ok(start..end),
            end => Err(BlockError::DimensionMismatch {
                expected: end.unwrap_or(usize::MAX),
                found: len,
            }),
        }
    }

    /// `global_result[slice] += scale · M · global_vect[slice]`
    fn accumulate_scaled_mass_times_global_vector(
        &self,
        global_result: &mut [f64],
        global_vect: &[f64],
        scale: f64,
    ) -> Result<()> {
        let out = self.global_range(global_result.len())?;
        let inp = self.global_range(global_vect.len())?;
        self.accumulate_scaled_mass_times_slice(&mut global_result[out], &global_vect[inp], scale)
    }

    /// `global_result[slice] += scale · diag(M)`
    fn accumulate_scaled_mass_diagonal(&self, global_result: &mut [f64], scale: f64) -> Result<()> {
        let out = self.global_range(global_result.len())?;
        self.accumulate_scaled_mass_diagonal_slice(&mut global_result[out], scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SparseTriplets;

    /// Six DOFs with a diagonal mass, standing in for a rigid body block.
    #[derive(Debug, Clone)]
    struct DiagonalBlock {
        header: BlockHeader,
        diag: [f64; 6],
    }

    impl VariableBlock for DiagonalBlock {
        fn header(&self) -> &BlockHeader {
            &self.header
        }
        fn header_mut(&mut self) -> &mut BlockHeader {
            &mut self.header
        }
        fn kind(&self) -> &'static str {
            "diagonal"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn compute_inverse_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()> {
            result.fill(0.0);
            self.accumulate_inverse_mass_times_vector(result, vect)
        }
        fn accumulate_inverse_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()> {
            check_len(6, result.len())?;
            check_len(6, vect.len())?;
            for i in 0..6 {
                result[i] += vect[i] / self.diag[i];
            }
            Ok(())
        }
        fn accumulate_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()> {
            self.accumulate_scaled_mass_times_slice(result, vect, 1.0)
        }
        fn accumulate_scaled_mass_times_slice(
            &self,
            result: &mut [f64],
            vect: &[f64],
            scale: f64,
        ) -> Result<()> {
            check_len(6, result.len())?;
            check_len(6, vect.len())?;
            for i in 0..6 {
                result[i] += scale * self.diag[i] * vect[i];
            }
            Ok(())
        }
        fn accumulate_scaled_mass_diagonal_slice(&self, result: &mut [f64], scale: f64) -> Result<()> {
            check_len(6, result.len())?;
            for i in 0..6 {
                result[i] += scale * self.diag[i];
            }
            Ok(())
        }
        fn write_mass_block_into_sparse_matrix(
            &self,
            sink: &mut dyn SparseSink,
            row_offset: usize,
            col_offset: usize,
            scale: f64,
        ) -> Result<()> {
            let base = self.assigned_offset()?;
            for i in 0..6 {
                sink.set_or_accumulate(base + row_offset + i, base + col_offset + i, scale * self.diag[i]);
            }
            Ok(())
        }
        fn mass_matrix(&self) -> DMatrix<f64> {
            DMatrix::from_diagonal(&DVector::from_row_slice(&self.diag))
        }
        fn archive_out(&self, archive: &mut dyn ArchiveOut) {
            self.header.archive_out(archive);
        }
        fn archive_in(&mut self, archive: &mut dyn ArchiveIn) -> Result<()> {
            let active = self.header.read_archived(archive)?;
            self.header.set_active(active);
            Ok(())
        }
    }

    fn rigid_like() -> DiagonalBlock {
        DiagonalBlock {
            header: BlockHeader::new(6),
            diag: [2.0, 2.0, 2.0, 0.5, 0.25, 0.125],
        }
    }

    #[test]
    fn global_operators_work_for_other_dof_counts() {
        let mut block = rigid_like();
        block.header_mut().set_offset(Some(3));

        let vect = vec![1.0; 12];
        let mut result = vec![0.0; 12];
        block
            .accumulate_scaled_mass_times_global_vector(&mut result, &vect, 2.0)
            .expect("block fits in vector");

        assert_eq!(&result[..3], &[0.0; 3]);
        assert_eq!(&result[3..9], &[4.0, 4.0, 4.0, 1.0, 0.5, 0.25]);
        assert_eq!(&result[9..], &[0.0; 3]);
    }

    #[test]
    fn global_range_requires_offset_and_room() {
        let mut block = rigid_like();
        assert_eq!(block.global_range(100), Err(BlockError::Unassigned));

        block.header_mut().set_offset(Some(8));
        assert_eq!(block.global_range(14), Ok(8..14));
        assert_eq!(
            block.global_range(13),
            Err(BlockError::DimensionMismatch {
                expected: 14,
                found: 13
            })
        );

        block.header_mut().set_offset(Some(usize::MAX - 2));
        assert_eq!(
            block.global_range(usize::MAX),
            Err(BlockError::DimensionMismatch {
                expected: usize::MAX,
                found: usize::MAX
            })
        );
    }

    #[test]
    fn trait_objects_paste_into_sinks() {
        let mut block = rigid_like();
        block.header_mut().set_offset(Some(0));
        let boxed: Box<dyn VariableBlock> = Box::new(block);

        let mut sink = SparseTriplets::new(6, 6);
        boxed
            .write_mass_block_into_sparse_matrix(&mut sink, 0, 0, 1.0)
            .expect("paste should succeed");
        assert_eq!(sink.to_dense(), boxed.mass_matrix());
    }

    #[test]
    fn header_archive_rejects_other_dof_counts() {
        let mut record = crate::archive::BlockRecord::new("diagonal");
        BlockHeader::new(3).archive_out(&mut record);

        let header = BlockHeader::new(6);
        assert_eq!(
            header.read_archived(&mut record),
            Err(BlockError::DimensionMismatch {
                expected: 6,
                found: 3
            })
        );
    }

    #[test]
    fn header_activity_toggles() {
        let mut header = BlockHeader::new(3);
        assert!(header.is_active());
        header.set_active(false);
        assert!(!header.is_active());
        assert_eq!(header.velocity().len(), 3);
        assert_eq!(header.force().len(), 3);
    }
}
