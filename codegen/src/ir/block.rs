//! Basic blocks.

use crate::fx::FxHashMap;
use crate::ir::entities::{Block, Func, Inst, Value};
use cranelift_entity::packed_option::PackedOption;

/// A basic block: an instruction sequence ending in a terminator, plus its
/// CFG edges.
///
/// Successor and predecessor lists are multisets counted by edge
/// multiplicity: a conditional branch with both edges to the same target
/// contributes that target twice.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    /// The block's label.
    pub name: String,
    /// The function this block belongs to.
    pub func: PackedOption<Func>,
    /// Instructions in program order.
    pub insts: Vec<Inst>,
    /// Successor blocks, one entry per CFG edge.
    pub succs: Vec<Block>,
    /// Predecessor blocks, one entry per CFG edge.
    pub preds: Vec<Block>,
    /// The value wrapping this block for use as a branch-target operand.
    pub value: PackedOption<Value>,
    /// Side map for the mem2reg collaborator: promoted value → φ.
    pub value_phis: FxHashMap<Value, Value>,
    /// Side map for the mem2reg collaborator: φ → originating alloca.
    pub phi_allocas: FxHashMap<Value, Value>,
}

impl BlockData {
    /// Create an empty block named `name`.
    pub fn new(name: impl Into<String>, func: Func) -> Self {
        Self {
            name: name.into(),
            func: Some(func).into(),
            ..Self::default()
        }
    }

    /// The terminator instruction, if the block has one.
    pub fn last_inst(&self) -> Option<Inst> {
        self.insts.last().copied()
    }

    /// Remove one edge to `succ` from the successor multiset.
    pub fn remove_succ_edge(&mut self, succ: Block) {
        if let Some(pos) = self.succs.iter().position(|&b| b == succ) {
            self.succs.swap_remove(pos);
        }
    }

    /// Remove one edge from `pred` from the predecessor multiset.
    pub fn remove_pred_edge(&mut self, pred: Block) {
        if let Some(pos) = self.preds.iter().position(|&b| b == pred) {
            self.preds.swap_remove(pos);
        }
    }
}
