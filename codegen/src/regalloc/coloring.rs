//! Graph-coloring register assignment with cost-weighted spilling.
//!
//! Virtual registers are ordered by the start of their first interval and
//! colored greedily against the interference of already-colored neighbors
//! and precolored physical ranges. When a class runs out of colors the
//! cheapest conflicting range (by use count scaled by loop depth, divided
//! by interval length) is spilled and allocation restarts.

use crate::fx::{FxHashMap, FxHashSet};
use crate::isa::instinfo::InstructionInfo;
use crate::isa::reginfo::RegisterInfo;
use crate::mir::{self, Operand, Reg};
use crate::regalloc::{liveness, spill};
use crate::result::{CodegenError, CodegenResult};

#[derive(Clone, Copy)]
struct Interval {
    start: usize,
    end: usize,
}

fn overlaps(a: &[Interval], b: &[Interval]) -> bool {
    a.iter()
        .any(|ia| b.iter().any(|ib| ia.start <= ib.end && ib.start <= ia.end))
}

/// Allocate every virtual register of `func` to a physical register.
pub fn allocate(
    func: &mut mir::Function,
    reg_info: &dyn RegisterInfo,
    inst_info: &dyn InstructionInfo,
    loop_depth: &FxHashMap<mir::MirBlock, u32>,
) -> CodegenResult<()> {
    // Virtual registers introduced by spilling have minimal ranges and must
    // never be chosen as victims again.
    let mut unspillable: FxHashSet<Reg> = FxHashSet::default();
    let mut rounds = 0usize;

    loop {
        rounds += 1;
        if rounds > func.num_vregs().max(8) * 2 {
            return Err(CodegenError::OutOfRegisters(0));
        }
        liveness::compute(func, reg_info, inst_info);
        let indices = func.linear_indices();

        // Intervals per register, in linear positions.
        let mut intervals: FxHashMap<Reg, Vec<Interval>> = FxHashMap::default();
        for (&reg, ranges) in &func.live_ranges {
            let entry = intervals.entry(reg).or_default();
            for range in ranges {
                if let (Some(&start), Some(&end)) =
                    (indices.get(&range.start), indices.get(&range.end))
                {
                    entry.push(Interval { start, end });
                }
            }
        }

        // Weights and use counts for spill choice.
        let mut use_count: FxHashMap<Reg, u32> = FxHashMap::default();
        for &block in &func.block_order {
            let depth = loop_depth.get(&block).copied().unwrap_or(0);
            for &inst in &func.blocks[block].insts {
                for &op in &func.insts[inst].operands {
                    if let Operand::Reg(reg, _) = op {
                        if reg.is_virtual() {
                            *use_count.entry(reg).or_insert(0) += 1 + depth * 10;
                        }
                    }
                }
            }
        }

        let mut vregs: Vec<Reg> = intervals
            .keys()
            .copied()
            .filter(|reg| reg.is_virtual())
            .collect();
        vregs.sort_by_key(|reg| {
            (
                intervals[reg].iter().map(|i| i.start).min().unwrap_or(0),
                reg.0,
            )
        });

        let mut assignment: FxHashMap<Reg, Reg> = FxHashMap::default();
        let mut spilled = None;

        'assign: for &vreg in &vregs {
            let class = func.vreg_class(vreg);
            let mine = &intervals[&vreg];
            let mut taken: FxHashSet<Reg> = FxHashSet::default();

            // Precolored physical ranges force interference.
            for (&other, other_ivs) in &intervals {
                if other.is_virtual() {
                    continue;
                }
                if overlaps(mine, other_ivs) {
                    taken.insert(other);
                }
            }
            let mut neighbors: Vec<Reg> = Vec::new();
            for (&other, &phys) in &assignment {
                if overlaps(mine, &intervals[&other]) {
                    taken.insert(reg_info.canonical(phys));
                    neighbors.push(other);
                }
            }

            for &candidate in reg_info.available(class) {
                let canonical = reg_info.canonical(candidate);
                if taken.contains(&canonical) {
                    continue;
                }
                assignment.insert(vreg, candidate);
                continue 'assign;
            }

            // Out of colors: pick the cheapest spillable conflicting range.
            let weight = |reg: Reg| -> Option<u64> {
                if unspillable.contains(&reg) {
                    return None;
                }
                let length: usize = intervals[&reg]
                    .iter()
                    .map(|i| i.end - i.start + 1)
                    .sum();
                let uses = use_count.get(&reg).copied().unwrap_or(1) as u64;
                Some(uses * 1000 / length.max(1) as u64)
            };
            let mut candidates: Vec<Reg> = neighbors
                .into_iter()
                .filter(|&n| func.vreg_class(n) == class)
                .collect();
            candidates.push(vreg);
            let victim = candidates
                .into_iter()
                .filter_map(|reg| weight(reg).map(|w| (w, reg)))
                .min_by_key(|&(w, reg)| (w, reg.0))
                .map(|(_, reg)| reg)
                .ok_or(CodegenError::OutOfRegisters(class))?;
            spilled = Some(victim);
            break;
        }

        if let Some(victim) = spilled {
            log::debug!("no color for class, spilling {victim:?}");
            let before = func.num_vregs();
            spill::spill(inst_info, reg_info, func, victim)?;
            for i in before..func.num_vregs() {
                unspillable.insert(Reg(crate::mir::VREG_START + i as u32));
            }
            continue;
        }

        rewrite(func, reg_info, inst_info, &assignment)?;
        return Ok(());
    }
}

/// Substitute every virtual operand with its physical assignment and drop
/// the identity moves this produces.
fn rewrite(
    func: &mut mir::Function,
    reg_info: &dyn RegisterInfo,
    inst_info: &dyn InstructionInfo,
    assignment: &FxHashMap<Reg, Reg>,
) -> CodegenResult<()> {
    for block in func.block_order.clone() {
        for idx in 0..func.blocks[block].insts.len() {
            let inst = func.blocks[block].insts[idx];
            for op_idx in 0..func.insts[inst].operands.len() {
                let op = func.insts[inst].operands[op_idx];
                let (reg, flags) = match op {
                    Operand::Reg(reg, flags) if reg.is_virtual() => (reg, flags),
                    _ => continue,
                };
                let phys = *assignment.get(&reg).ok_or_else(|| {
                    CodegenError::OutOfRegisters(func.vreg_class(reg))
                })?;
                let phys = match flags.forced_size() {
                    Some(size) => reg_info.with_size(phys, size).ok_or_else(|| {
                        CodegenError::BadOperand(format!(
                            "register {} has no {size}-byte alias",
                            reg_info.name(phys)
                        ))
                    })?,
                    None => phys,
                };
                func.insts[inst].operands[op_idx] = Operand::reg(phys);
            }
        }
        // Identity moves are dead after substitution.
        let mut idx = 0;
        while idx < func.blocks[block].insts.len() {
            let inst = func.blocks[block].insts[idx];
            let data = &func.insts[inst];
            if inst_info.is_reg_move(data.opcode)
                && data.operands.len() == 2
                && data.operands[0] == data.operands[1]
            {
                func.remove_inst(block, idx);
                continue;
            }
            idx += 1;
        }
    }
    Ok(())
}
