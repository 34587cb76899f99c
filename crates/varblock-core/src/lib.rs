//! Variable-block algebra for block-structured multibody solvers.
//!
//! A *variable block* is the group of DOFs owned by one physical entity,
//! together with its local mass operator. Solvers never materialize the
//! dense system matrix; instead they call into each block with global
//! vectors, and every block reads and writes only its own offset range.
//!
//! - [`variables`]: the [`VariableBlock`] trait and the 3-DOF
//!   [`PointMassBlock`]
//! - [`descriptor`]: [`VariableDescriptor`], which assigns offsets and runs
//!   the global passes (optionally on the rayon pool)
//! - [`sink`]: [`SparseSink`] destinations for mass-matrix pasting
//! - [`archive`]: versioned field archives for block persistence
//!
//! ```
//! use varblock_core::{PointMassBlock, VariableDescriptor};
//!
//! let mut descriptor = VariableDescriptor::new();
//! descriptor.insert(PointMassBlock::with_mass(2.0).unwrap());
//! descriptor.insert(PointMassBlock::with_mass(4.0).unwrap());
//! let n = descriptor.update_offsets();
//!
//! let vect = vec![1.0; n];
//! let mut momentum = vec![0.0; n];
//! descriptor.system_product(&mut momentum, &vect, 1.0).unwrap();
//! assert_eq!(momentum, vec![2.0, 2.0, 2.0, 4.0, 4.0, 4.0]);
//! ```

pub mod archive;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod sink;
pub mod variables;

pub use archive::{ArchiveIn, ArchiveOut, BlockRecord, FieldValue};
pub use config::DescriptorConfig;
pub use descriptor::{BlockId, VariableDescriptor};
pub use error::{BlockError, Result};
pub use sink::{SparseSink, SparseTriplets};
pub use variables::{
    BlockHeader, PointMassBlock, UserKey, VariableBlock, block_from_record, block_to_record,
    create_block, registered_kinds,
};
