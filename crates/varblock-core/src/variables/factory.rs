/// Block factory for creating blocks from persisted type tags
///
/// Archived records carry the block kind; loading maps it back to a fresh,
/// default-constructed block which then restores its own fields.

use super::{PointMassBlock, VariableBlock, node::NODE_KIND};
use crate::archive::BlockRecord;
use crate::error::{BlockError, Result};

/// Kinds that [`create_block`] knows how to build.
pub fn registered_kinds() -> &'static [&'static str] {
    &[NODE_KIND]
}

/// Create a default block for `kind`, or `None` if the kind is unknown.
pub fn create_block(kind: &str) -> Option<Box<dyn VariableBlock>> {
    match kind {
        NODE_KIND => Some(Box::new(PointMassBlock::new())),
        _ => None,
    }
}

/// Build and restore a block from a record.
pub fn block_from_record(record: &BlockRecord) -> Result<Box<dyn VariableBlock>> {
    let mut block =
        create_block(&record.kind).ok_or_else(|| BlockError::UnknownKind(record.kind.clone()))?;
    let mut source = record.clone();
    block.archive_in(&mut source)?;
    Ok(block)
}

/// Persist a block into a fresh record.
pub fn block_to_record(block: &dyn VariableBlock) -> BlockRecord {
    let mut record = BlockRecord::new(block.kind());
    block.archive_out(&mut record);
    record
}
