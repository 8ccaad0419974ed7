//! Live-range computation over machine IR.
//!
//! A classic backward dataflow computes per-block live-out sets; a backward
//! walk of each block then records, for every register, the intervals of
//! instructions during which its value may still be consumed. Physical
//! registers participate under their canonical (largest-alias) name so that
//! `eax` and `rax` interfere properly.

use crate::fx::{FxHashMap, FxHashSet};
use crate::isa::instinfo::InstructionInfo;
use crate::isa::reginfo::RegisterInfo;
use crate::mir::{self, LiveRange, MirBlock, Operand, Reg};

fn canon(reg_info: &dyn RegisterInfo, reg: Reg) -> Reg {
    if reg.is_virtual() {
        reg
    } else {
        reg_info.canonical(reg)
    }
}

struct UseDef {
    uses: Vec<Reg>,
    defs: Vec<(Reg, bool)>, // (reg, pure definition)
}

fn use_def(
    reg_info: &dyn RegisterInfo,
    inst_info: &dyn InstructionInfo,
    func: &mir::Function,
    inst_id: mir::MirInst,
) -> UseDef {
    let inst = &func.insts[inst_id];
    let desc = inst_info.desc(inst.opcode);
    let mut uses = Vec::new();
    let mut defs = Vec::new();
    for (idx, &op) in inst.operands.iter().enumerate() {
        let reg = match op {
            Operand::Reg(reg, _) => canon(reg_info, reg),
            _ => continue,
        };
        let restriction = desc.restriction(idx);
        if restriction.is_read() || !restriction.is_written() {
            uses.push(reg);
        }
        if restriction.is_written() {
            defs.push((reg, restriction.is_assigned()));
        }
    }
    for &clobber in desc.clobbers {
        defs.push((canon(reg_info, clobber), true));
    }
    // A call defines the registers that carry its results.
    if desc.is_call {
        if let Some(site) = func.call_sites.get(&inst_id) {
            for &ret in &site.ret_regs {
                defs.push((canon(reg_info, ret), true));
            }
        }
    }
    UseDef { uses, defs }
}

/// Recompute `func.live_ranges` from scratch.
pub fn compute(
    func: &mut mir::Function,
    reg_info: &dyn RegisterInfo,
    inst_info: &dyn InstructionInfo,
) {
    // Per-block gen/kill.
    let mut gen: FxHashMap<MirBlock, FxHashSet<Reg>> = FxHashMap::default();
    let mut kill: FxHashMap<MirBlock, FxHashSet<Reg>> = FxHashMap::default();
    for &block in &func.block_order {
        let mut g = FxHashSet::default();
        let mut k: FxHashSet<Reg> = FxHashSet::default();
        for &inst in &func.blocks[block].insts {
            let ud = use_def(reg_info, inst_info, func, inst);
            for reg in ud.uses {
                if !k.contains(&reg) {
                    g.insert(reg);
                }
            }
            for (reg, _) in ud.defs {
                k.insert(reg);
            }
        }
        gen.insert(block, g);
        kill.insert(block, k);
    }

    // Backward dataflow to a fixed point.
    let mut live_in: FxHashMap<MirBlock, FxHashSet<Reg>> = FxHashMap::default();
    let mut live_out: FxHashMap<MirBlock, FxHashSet<Reg>> = FxHashMap::default();
    for &block in &func.block_order {
        live_in.insert(block, FxHashSet::default());
        live_out.insert(block, FxHashSet::default());
    }
    let mut changed = true;
    while changed {
        changed = false;
        for &block in func.block_order.iter().rev() {
            let mut out = FxHashSet::default();
            for &succ in &func.blocks[block].succs {
                if let Some(succ_in) = live_in.get(&succ) {
                    out.extend(succ_in.iter().copied());
                }
            }
            let mut inn: FxHashSet<Reg> = gen[&block].clone();
            for &reg in &out {
                if !kill[&block].contains(&reg) {
                    inn.insert(reg);
                }
            }
            if out != live_out[&block] || inn != live_in[&block] {
                changed = true;
            }
            live_out.insert(block, out);
            live_in.insert(block, inn);
        }
    }

    // Interval construction per block.
    let mut ranges: FxHashMap<Reg, Vec<LiveRange>> = FxHashMap::default();
    for &block in &func.block_order {
        let insts = func.blocks[block].insts.clone();
        if insts.is_empty() {
            continue;
        }
        let last = *insts.last().unwrap();
        let first = insts[0];
        // Open intervals: register → instruction where it was last consumed.
        let mut open: FxHashMap<Reg, mir::MirInst> = FxHashMap::default();
        for &reg in &live_out[&block] {
            open.insert(reg, last);
        }
        for &inst in insts.iter().rev() {
            let ud = use_def(reg_info, inst_info, func, inst);
            for (reg, pure_def) in ud.defs {
                match open.remove(&reg) {
                    Some(end) => ranges.entry(reg).or_default().push(LiveRange {
                        start: inst,
                        end,
                        assigned_first: pure_def,
                    }),
                    None => ranges.entry(reg).or_default().push(LiveRange {
                        // Dead definition; keep the point interval so the
                        // register still conflicts at the instruction.
                        start: inst,
                        end: inst,
                        assigned_first: pure_def,
                    }),
                }
            }
            for reg in ud.uses {
                open.entry(reg).or_insert(inst);
            }
        }
        for (reg, end) in open {
            ranges.entry(reg).or_default().push(LiveRange {
                start: first,
                end,
                assigned_first: false,
            });
        }
    }
    func.live_ranges = ranges;
}

/// Is `reg` (or an alias) live at linear position `pos`?
///
/// When `assigned_is_live` is false, a range that begins with a pure
/// definition at `pos` does not count: the old register contents are dead
/// there.
pub fn is_reg_live(
    func: &mir::Function,
    reg_info: &dyn RegisterInfo,
    indices: &FxHashMap<mir::MirInst, usize>,
    pos: usize,
    reg: Reg,
    assigned_is_live: bool,
) -> bool {
    let key = canon(reg_info, reg);
    let ranges = match func.live_ranges.get(&key) {
        Some(ranges) => ranges,
        None => return false,
    };
    for range in ranges {
        let (start, end) = match (indices.get(&range.start), indices.get(&range.end)) {
            (Some(&s), Some(&e)) => (s, e),
            _ => continue,
        };
        if start <= pos && pos <= end {
            if !assigned_is_live && range.assigned_first && pos == start {
                continue;
            }
            return true;
        }
    }
    false
}

/// Is `reg` (or an alias) ever live in the function?
pub fn is_reg_ever_live(func: &mir::Function, reg_info: &dyn RegisterInfo, reg: Reg) -> bool {
    if func.live_ins.iter().any(|&r| reg_info.is_same_register(r, reg)) {
        return true;
    }
    func.live_ranges
        .keys()
        .any(|&r| reg_info.is_same_register(r, reg))
}
