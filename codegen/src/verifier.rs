//! Optional IR well-formedness checker.
//!
//! Verifies the structural invariants the lowering passes assume:
//!
//! 1. Use lists and operand lists agree, counted per edge.
//! 2. Every block ends with exactly one terminator and has none mid-block.
//! 3. Every use is dominated by its definition.
//! 4. Successor/predecessor multisets agree with the terminators' targets.
//!
//! The builder maintains all four; running the verifier is a debugging aid,
//! not a required pass. Violations surface as [`CodegenError::BadIr`].

use crate::dominator_tree::DominatorTree;
use crate::ir::entities::{Block, Func, Inst, Value};
use crate::ir::unit::Unit;
use crate::ir::value::ValueKind;
use crate::result::{CodegenError, CodegenResult};

/// Verify one function.
pub fn verify_function(unit: &Unit, func: Func) -> CodegenResult<()> {
    let data = &unit.funcs[func];
    if data.is_declaration() {
        return Ok(());
    }

    for &block in &data.blocks {
        verify_block_terminators(unit, block)?;
        verify_edges(unit, block)?;
    }
    verify_use_lists(unit, func)?;
    verify_dominance(unit, func)?;
    Ok(())
}

fn bad(msg: String) -> CodegenError {
    CodegenError::BadIr(msg)
}

fn verify_block_terminators(unit: &Unit, block: Block) -> CodegenResult<()> {
    let insts = &unit.blocks[block].insts;
    let name = &unit.blocks[block].name;
    match insts.last() {
        None => return Err(bad(format!("block {name} is empty"))),
        Some(&last) => {
            if !unit.insts[last].opcode.is_terminator() {
                return Err(bad(format!("block {name} does not end in a terminator")));
            }
        }
    }
    for &inst in &insts[..insts.len() - 1] {
        if unit.insts[inst].opcode.is_terminator() {
            return Err(bad(format!("terminator in the middle of block {name}")));
        }
    }
    Ok(())
}

fn verify_edges(unit: &Unit, block: Block) -> CodegenResult<()> {
    let term = unit.blocks[block].insts.last().copied().expect("verified");
    let mut expected: Vec<Block> = unit.branch_targets(term).into_iter().collect();
    let mut actual = unit.blocks[block].succs.clone();
    expected.sort();
    actual.sort();
    if expected != actual {
        return Err(bad(format!(
            "successor multiset of block {} disagrees with its terminator",
            unit.blocks[block].name
        )));
    }
    for &succ in &unit.blocks[block].succs {
        let count_in_succs = unit.blocks[block].succs.iter().filter(|&&b| b == succ).count();
        let count_in_preds = unit.blocks[succ].preds.iter().filter(|&&b| b == block).count();
        if count_in_succs != count_in_preds {
            return Err(bad(format!(
                "edge multiplicity between {} and {} disagrees",
                unit.blocks[block].name, unit.blocks[succ].name
            )));
        }
    }
    Ok(())
}

fn verify_use_lists(unit: &Unit, func: Func) -> CodegenResult<()> {
    for &block in &unit.funcs[func].blocks {
        for &inst in &unit.blocks[block].insts {
            for &op in &unit.insts[inst].operands {
                let in_operands = unit.insts[inst].operands.iter().filter(|&&v| v == op).count();
                let in_uses = unit.values[op].uses.iter().filter(|&&i| i == inst).count();
                if in_operands != in_uses {
                    return Err(bad(format!(
                        "use list of {} out of sync with instruction operands",
                        unit.values[op].name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn verify_dominance(unit: &Unit, func: Func) -> CodegenResult<()> {
    let domtree = DominatorTree::compute(unit, func);
    for &block in &unit.funcs[func].blocks {
        if !domtree.is_reachable(block) {
            continue;
        }
        for (pos, &inst) in unit.blocks[block].insts.iter().enumerate() {
            // φ operands are checked against the incoming edge, not the use
            // site, so they are exempt here.
            if unit.insts[inst].opcode == crate::ir::Opcode::Phi {
                continue;
            }
            for &op in &unit.insts[inst].operands {
                if let Some(def_inst) = def_of(unit, op) {
                    let def_block = match unit.insts[def_inst].block.expand() {
                        Some(b) => b,
                        None => continue,
                    };
                    let ok = if def_block == block {
                        position_of(unit, def_block, def_inst) < pos
                    } else {
                        domtree.dominates(def_block, block)
                    };
                    if !ok {
                        return Err(bad(format!(
                            "use of {} is not dominated by its definition",
                            unit.values[op].name
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn def_of(unit: &Unit, val: Value) -> Option<Inst> {
    match unit.values[val].kind {
        ValueKind::Inst(inst) => Some(inst),
        _ => None,
    }
}

fn position_of(unit: &Unit, block: Block, inst: Inst) -> usize {
    unit.blocks[block]
        .insts
        .iter()
        .position(|&i| i == inst)
        .expect("instruction in its block")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::function::Linkage;

    #[test]
    fn accepts_well_formed_ir() {
        let mut ctx = Context::new();
        let mut unit = Unit::new("v");
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("ok", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        b.position_at_end(entry);
        let arg = b.arg(0);
        let sum = b.create_add(arg, arg);
        b.create_ret(Some(sum));
        assert!(verify_function(&unit, func).is_ok());
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut ctx = Context::new();
        let mut unit = Unit::new("v");
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("bad", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        b.position_at_end(entry);
        let arg = b.arg(0);
        b.create_add(arg, arg);
        assert!(matches!(
            verify_function(&unit, func),
            Err(CodegenError::BadIr(_))
        ));
    }
}
