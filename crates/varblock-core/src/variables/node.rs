//! Point mass block: three translational DOFs with an isotropic mass.
//!
//! The mass operator is `M = m·I₃` and its inverse `M⁻¹ = (1/m)·I₃`, so
//! every product is three independent scalar multiplies.

use super::{BlockHeader, UserKey, VariableBlock};
use crate::archive::{ArchiveIn, ArchiveOut, read_checked_version};
use crate::error::{BlockError, Result, check_len};
use crate::sink::{SparseSink, check_block_fits};
use nalgebra::DMatrix;
use std::any::Any;

pub const NODE_DOF: usize = 3;
pub const NODE_KIND: &str = "point_mass";
pub const NODE_CLASS: &str = "point_mass";
pub const NODE_VERSION: u32 = 1;

/// Variables of a point mass (three linear velocity components).
///
/// Cloning copies mass, user key and offset. A cloned offset only means
/// something if the clone mirrors an assembled state; otherwise it is stale
/// until the next `update_offsets()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointMassBlock {
    header: BlockHeader,
    user_data: Option<UserKey>,
    mass: f64,
}

impl Default for PointMassBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl PointMassBlock {
    /// Unit mass, no user data, no offset.
    pub fn new() -> Self {
        Self {
            header: BlockHeader::new(NODE_DOF),
            user_data: None,
            mass: 1.0,
        }
    }

    pub fn with_mass(mass: f64) -> Result<Self> {
        let mut block = Self::new();
        block.set_mass(mass)?;
        Ok(block)
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Set the nodal mass. Rejects zero, negative and non-finite values and
    /// keeps the previous mass in that case.
    pub fn set_mass(&mut self, mass: f64) -> Result<()> {
        self.mass = validate_mass(mass)?;
        Ok(())
    }

    pub fn user_data(&self) -> Option<UserKey> {
        self.user_data
    }

    pub fn set_user_data(&mut self, key: Option<UserKey>) {
        self.user_data = key;
    }
}

fn validate_mass(mass: f64) -> Result<f64> {
    if !mass.is_finite() || mass <= 0.0 {
        return Err(BlockError::InvalidParameter {
            name: "mass",
            value: mass,
        });
    }
    Ok(mass)
}

fn check_pair(result: &[f64], vect: &[f64]) -> Result<()> {
    check_len(NODE_DOF, vect.len())?;
    check_len(NODE_DOF, result.len())
}

impl VariableBlock for PointMassBlock {
    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }

    fn kind(&self) -> &'static str {
        NODE_KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn compute_inverse_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()> {
        check_pair(result, vect)?;
        let inv_mass = 1.0 / self.mass;
        result[0] = inv_mass * vect[0];
        result[1] = inv_mass * vect[1];
        result[2] = inv_mass * vect[2];
        Ok(())
    }

    fn accumulate_inverse_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()> {
        check_pair(result, vect)?;
        let inv_mass = 1.0 / self.mass;
        result[0] += inv_mass * vect[0];
        result[1] += inv_mass * vect[1];
        result[2] += inv_mass * vect[2];
        Ok(())
    }

    fn accumulate_mass_times_vector(&self, result: &mut [f64], vect: &[f64]) -> Result<()> {
        check_pair(result, vect)?;
        result[0] += self.mass * vect[0];
        result[1] += self.mass * vect[1];
        result[2] += self.mass * vect[2];
        Ok(())
    }

    fn accumulate_scaled_mass_times_slice(
        &self,
        result: &mut [f64],
        vect: &[f64],
        scale: f64,
    ) -> Result<()> {
        check_pair(result, vect)?;
        let scaled_mass = scale * self.mass;
        result[0] += scaled_mass * vect[0];
        result[1] += scaled_mass * vect[1];
        result[2] += scaled_mass * vect[2];
        Ok(())
    }

    fn accumulate_scaled_mass_diagonal_slice(&self, result: &mut [f64], scale: f64) -> Result<()> {
        check_len(NODE_DOF, result.len())?;
        let scaled_mass = scale * self.mass;
        result[0] += scaled_mass;
        result[1] += scaled_mass;
        result[2] += scaled_mass;
        Ok(())
    }

    fn write_mass_block_into_sparse_matrix(
        &self,
        sink: &mut dyn SparseSink,
        row_offset: usize,
        col_offset: usize,
        scale: f64,
    ) -> Result<()> {
        let offset = self.assigned_offset()?;
        let (row, col) = check_block_fits(sink, offset, row_offset, col_offset, NODE_DOF)?;

        // diagonal only, no coupling between the three directions
        let scaled_mass = scale * self.mass;
        sink.set_or_accumulate(row, col, scaled_mass);
        sink.set_or_accumulate(row + 1, col + 1, scaled_mass);
        sink.set_or_accumulate(row + 2, col + 2, scaled_mass);
        Ok(())
    }

    fn mass_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal_element(NODE_DOF, NODE_DOF, self.mass)
    }

    fn archive_out(&self, archive: &mut dyn ArchiveOut) {
        archive.write_version(NODE_CLASS, NODE_VERSION);
        self.header.archive_out(archive);
        archive.write_f64("mass", self.mass);
    }

    fn archive_in(&mut self, archive: &mut dyn ArchiveIn) -> Result<()> {
        read_checked_version(archive, NODE_CLASS, NODE_VERSION)?;
        let active = self.header.read_archived(archive)?;
        let mass = archive.read_f64("mass")?;
        // same validation as a live set_mass; nothing is applied on failure
        let mass = validate_mass(mass).inspect_err(|_| {
            log::warn!("Rejecting archived point mass record with mass {mass}");
        })?;

        self.header.set_active(active);
        self.mass = mass;
        log::debug!("Restored point mass block (mass {mass}, active {active})");
        Ok(())
    }
}
