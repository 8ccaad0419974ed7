//! Machine basic blocks.

use crate::ir;
use crate::mir::inst::MirInst;
use crate::mir::operand::{MirBlock, Operand};
use cranelift_entity::packed_option::PackedOption;

/// A machine basic block.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    /// Label, derived from the IR block's name.
    pub name: String,
    /// The IR block this was lowered from.
    pub ir_block: PackedOption<ir::Block>,
    /// Instructions in program order. The arena entry holds the payload;
    /// this vector is the sequence.
    pub insts: Vec<MirInst>,
    /// Successor machine blocks.
    pub succs: Vec<MirBlock>,
    /// Predecessor machine blocks.
    pub preds: Vec<MirBlock>,
    /// Parallel-copy pairs `(dst, src)` queued by φ emission; materialized
    /// just before the terminator during target lowering.
    pub phi_copies: Vec<(Operand, Operand)>,
    /// Number of epilogue instructions at the block's end, when it returns.
    pub epilogue_size: usize,
}

impl BlockData {
    /// Create an empty machine block.
    pub fn new(name: impl Into<String>, ir_block: ir::Block) -> Self {
        Self {
            name: name.into(),
            ir_block: Some(ir_block).into(),
            ..Self::default()
        }
    }
}
