//! IR functions.

use crate::dominator_tree::DominatorTree;
use crate::ir::entities::{Block, Inst, Value};
use crate::ir::types::Type;
use crate::isa::CallConv;
use crate::loop_analysis::LoopForest;
use cranelift_entity::packed_option::PackedOption;

/// Symbol linkage.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Linkage {
    /// Visible outside the unit.
    External,
    /// Local to the unit; jump tables and string literals use this.
    Internal,
}

/// A function: blocks, formal arguments and cached analyses.
pub struct FunctionData {
    /// The function's symbol name.
    pub name: String,
    /// The function's signature type.
    pub ty: Type,
    /// Symbol linkage.
    pub linkage: Linkage,
    /// Calling convention; `None` selects the target's default.
    pub call_conv: Option<CallConv>,
    /// Blocks in layout order. The first block is the unique entry.
    pub blocks: Vec<Block>,
    /// Formal argument values, one per signature parameter.
    pub args: Vec<Value>,
    /// The value wrapping this function for use as a callee operand.
    pub value: PackedOption<Value>,
    /// All `Allocate` instructions in the function.
    pub allocas: Vec<Inst>,
    /// Counter used to auto-name anonymous results.
    pub next_name: u32,
    /// Cached dominator tree; invalid when `cfg_dirty` is set.
    pub domtree: Option<DominatorTree>,
    /// Cached loop forest; invalid when `cfg_dirty` is set.
    pub loops: Option<LoopForest>,
    /// Set whenever a CFG edge is added or removed.
    pub cfg_dirty: bool,
}

impl FunctionData {
    /// Create an empty function.
    pub fn new(name: impl Into<String>, ty: Type, linkage: Linkage) -> Self {
        Self {
            name: name.into(),
            ty,
            linkage,
            call_conv: None,
            blocks: Vec::new(),
            args: Vec::new(),
            value: None.into(),
            allocas: Vec::new(),
            next_name: 0,
            domtree: None,
            loops: None,
            cfg_dirty: true,
        }
    }

    /// The unique entry block. Panics if the function has no blocks yet.
    pub fn entry_block(&self) -> Block {
        self.blocks[0]
    }

    /// Is this a declaration without a body?
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Produce the next auto-generated value name.
    pub fn make_name(&mut self) -> String {
        let n = self.next_name;
        self.next_name += 1;
        format!("v{n}")
    }

    /// Drop cached analyses after a CFG edit.
    pub fn invalidate_cfg(&mut self) {
        self.cfg_dirty = true;
        self.domtree = None;
        self.loops = None;
    }
}
