//! Machine functions.

use crate::entity::PrimaryMap;
use crate::fx::FxHashMap;
use crate::ir;
use crate::ir::types::Type;
use crate::isa::CallConv;
use crate::mir::block::BlockData;
use crate::mir::frame::StackFrame;
use crate::mir::inst::{InstData, MirInst};
use crate::mir::operand::{MirBlock, MultiValue, Operand, PoolConst, Reg, VREG_START};
use smallvec::SmallVec;

/// Per-virtual-register bookkeeping.
#[derive(Clone, Copy, Debug)]
pub struct VRegInfo {
    /// The register class the virtual register must be colored from.
    pub class: u32,
}

/// A live interval of a register over the linearized instruction sequence.
#[derive(Clone, Copy, Debug)]
pub struct LiveRange {
    /// First instruction of the interval.
    pub start: MirInst,
    /// Last instruction of the interval.
    pub end: MirInst,
    /// The interval starts at a pure definition: at `start` itself the old
    /// register contents are dead.
    pub assigned_first: bool,
}

/// Bookkeeping attached to a lowered call instruction.
#[derive(Clone, Debug, Default)]
pub struct CallSite {
    /// Instructions of argument setup preceding the call.
    pub start_offset: usize,
    /// Instructions of result retrieval following the call.
    pub end_offset: usize,
    /// Physical registers receiving the call's results.
    pub ret_regs: SmallVec<[Reg; 2]>,
}

/// Side data of a `CALL_LOWER` pseudo awaiting calling-convention
/// assignment: the callee signature in type form.
#[derive(Clone, Debug)]
pub struct CallLoweringInfo {
    /// Return type at index 0, then one entry per argument.
    pub types: Vec<Type>,
    /// Whether the callee is vararg.
    pub vararg: bool,
    /// The convention to apply.
    pub call_conv: CallConv,
    /// Where the result lands after the call, when it is used.
    pub result: Option<Operand>,
}

/// A read-only constant placed in the function's constant pool.
#[derive(Clone, Debug, PartialEq)]
pub enum PoolConstData {
    /// A 32-bit float, stored by bit pattern.
    F32(u32),
    /// A 64-bit float, stored by bit pattern.
    F64(u64),
}

/// The register-save area captured by a vararg prologue, consumed when
/// lowering `va_start`.
#[derive(Clone, Copy, Debug)]
pub struct VaSaveArea {
    /// The slot holding the spilled argument registers.
    pub slot: crate::mir::operand::StackSlot,
    /// Bytes of the GP area consumed by named arguments.
    pub gp_used: u32,
    /// Bytes of the FP area consumed by named arguments.
    pub fp_used: u32,
}

/// A function in machine IR form.
pub struct Function {
    /// Symbol name.
    pub name: String,
    /// The IR function this was lowered from.
    pub ir_func: ir::Func,
    /// Machine block arena.
    pub blocks: PrimaryMap<MirBlock, BlockData>,
    /// Blocks in layout order; the first is the entry.
    pub block_order: Vec<MirBlock>,
    /// Machine instruction arena; blocks sequence it by id.
    pub insts: PrimaryMap<MirInst, InstData>,
    /// Map from IR blocks to their machine blocks.
    pub ir_block_map: FxHashMap<ir::Block, MirBlock>,
    /// The stack frame.
    pub frame: StackFrame,
    /// The constant pool.
    pub pool: PrimaryMap<PoolConst, PoolConstData>,
    /// Multi-value result lists referenced by `Operand::Multi`.
    pub multis: PrimaryMap<MultiValue, Vec<Operand>>,
    /// Lowered operand of each formal argument, if referenced.
    pub args: Vec<Option<Operand>>,
    /// Physical registers live on entry (argument registers).
    pub live_ins: Vec<Reg>,
    /// Live ranges per register, filled by the liveness pass.
    pub live_ranges: FxHashMap<Reg, Vec<LiveRange>>,
    /// Number of prologue instructions at the entry block's front.
    pub prologue_size: usize,
    /// Lowered call bookkeeping, keyed by the call instruction.
    pub call_sites: FxHashMap<MirInst, CallSite>,
    /// Pending `CALL_LOWER` side data.
    pub call_lowerings: FxHashMap<MirInst, CallLoweringInfo>,
    /// Register-save area of a vararg function.
    pub va_save: Option<VaSaveArea>,
    /// Prologue/epilogue instructions whose immediate operand is the frame
    /// size; patched once allocation has added its last spill slot.
    pub frame_fixups: Vec<MirInst>,

    vreg_info: Vec<VRegInfo>,
}

impl Function {
    /// Create an empty machine function for `ir_func`.
    pub fn new(name: impl Into<String>, ir_func: ir::Func) -> Self {
        Self {
            name: name.into(),
            ir_func,
            blocks: PrimaryMap::new(),
            block_order: Vec::new(),
            insts: PrimaryMap::new(),
            ir_block_map: FxHashMap::default(),
            frame: StackFrame::new(),
            pool: PrimaryMap::new(),
            multis: PrimaryMap::new(),
            args: Vec::new(),
            live_ins: Vec::new(),
            live_ranges: FxHashMap::default(),
            prologue_size: 0,
            call_sites: FxHashMap::default(),
            call_lowerings: FxHashMap::default(),
            va_save: None,
            frame_fixups: Vec::new(),
            vreg_info: Vec::new(),
        }
    }

    /// The entry machine block.
    pub fn entry_block(&self) -> MirBlock {
        self.block_order[0]
    }

    /// Append a machine block.
    pub fn add_block(&mut self, data: BlockData) -> MirBlock {
        let ir_block = data.ir_block.expand();
        let block = self.blocks.push(data);
        self.block_order.push(block);
        if let Some(ir_block) = ir_block {
            self.ir_block_map.insert(ir_block, block);
        }
        block
    }

    /// Allocate a fresh virtual register of `class`.
    pub fn new_vreg(&mut self, class: u32) -> Reg {
        let reg = Reg(VREG_START + self.vreg_info.len() as u32);
        self.vreg_info.push(VRegInfo { class });
        reg
    }

    /// The class of a virtual register.
    pub fn vreg_class(&self, reg: Reg) -> u32 {
        self.vreg_info[reg.virtual_index()].class
    }

    /// Number of virtual registers allocated so far.
    pub fn num_vregs(&self) -> usize {
        self.vreg_info.len()
    }

    /// Append an instruction to `block`.
    pub fn push_inst(&mut self, block: MirBlock, data: InstData) -> MirInst {
        let inst = self.insts.push(data);
        self.blocks[block].insts.push(inst);
        inst
    }

    /// Insert an instruction into `block` at position `index`.
    pub fn insert_inst(&mut self, block: MirBlock, index: usize, data: InstData) -> MirInst {
        let inst = self.insts.push(data);
        self.blocks[block].insts.insert(index, inst);
        inst
    }

    /// Remove the instruction at `index` from `block`.
    ///
    /// Live ranges with an endpoint at the removed instruction are clamped
    /// to their surviving endpoint.
    pub fn remove_inst(&mut self, block: MirBlock, index: usize) -> MirInst {
        let inst = self.blocks[block].insts.remove(index);
        for ranges in self.live_ranges.values_mut() {
            for range in ranges.iter_mut() {
                if range.start == inst {
                    range.start = range.end;
                }
                if range.end == inst {
                    range.end = range.start;
                }
            }
        }
        inst
    }

    /// The position of `inst` within `block`.
    pub fn inst_pos(&self, block: MirBlock, inst: MirInst) -> usize {
        self.blocks[block]
            .insts
            .iter()
            .position(|&i| i == inst)
            .expect("instruction not in block")
    }

    /// Linear indices of every placed instruction, in block layout order.
    pub fn linear_indices(&self) -> FxHashMap<MirInst, usize> {
        let mut map = FxHashMap::default();
        let mut next = 0;
        for &block in &self.block_order {
            for &inst in &self.blocks[block].insts {
                map.insert(inst, next);
                next += 1;
            }
        }
        map
    }

    /// Intern a multi-value operand list.
    pub fn make_multi(&mut self, values: Vec<Operand>) -> MultiValue {
        self.multis.push(values)
    }

    /// Add a pool constant, reusing an existing identical entry.
    pub fn pool_const(&mut self, data: PoolConstData) -> PoolConst {
        for (idx, existing) in self.pool.iter() {
            if *existing == data {
                return idx;
            }
        }
        self.pool.push(data)
    }

    /// Record a physical register live on entry.
    pub fn add_live_in(&mut self, reg: Reg) {
        if !self.live_ins.contains(&reg) {
            self.live_ins.push(reg);
        }
    }

    /// Replace every operand equal to `from` (ignoring register flags) with
    /// `to`; when `copy_flags` is set the original flags are preserved on
    /// the replacement.
    pub fn replace_operand(&mut self, from: Operand, to: Operand, copy_flags: bool) {
        for block in self.block_order.clone() {
            for idx in 0..self.blocks[block].insts.len() {
                let inst = self.blocks[block].insts[idx];
                for op in self.insts[inst].operands.iter_mut() {
                    if !op.equals_ignoring_flags(from) {
                        continue;
                    }
                    *op = if copy_flags {
                        match *op {
                            Operand::Reg(_, flags) => to.with_flags(flags),
                            _ => to,
                        }
                    } else {
                        to
                    };
                }
            }
        }
        for arg in self.args.iter_mut() {
            if let Some(op) = arg {
                if op.equals_ignoring_flags(from) {
                    *arg = Some(to);
                }
            }
        }
    }
}
