//! x86-64 assembly text output (Intel syntax).

use crate::context::Context;
use crate::fx::FxHashMap;
use crate::ir;
use crate::ir::function::Linkage;
use crate::ir::unit::Unit;
use crate::ir::value::ValueKind;
use crate::isa::x64::opcodes::{self, Opcode};
use crate::isa::x64::regs;
use crate::isa::AsmPrinter;
use crate::isa::RegisterInfo;
use crate::mir::{self, Operand, PoolConstData};
use crate::result::{CodegenError, CodegenResult};
use core::fmt::Write;

/// The x86-64 printer.
pub struct X64Printer;

fn block_label(unit: &Unit, ir_block: ir::Block) -> String {
    use crate::entity::EntityRef;
    let func = unit.blocks[ir_block].func.expand().expect("block in function");
    format!(".L{}_{}", unit.funcs[func].name, ir_block.index())
}

fn pool_label(func_name: &str, index: usize) -> String {
    format!(".LCPI{func_name}_{index}")
}

fn operand(
    unit: &Unit,
    func: &mir::Function,
    op: Operand,
) -> CodegenResult<String> {
    Ok(match op {
        Operand::Reg(reg, _) => {
            if reg.is_virtual() {
                format!("%v{}", reg.virtual_index())
            } else {
                regs::SYSV.name(reg).to_string()
            }
        }
        Operand::Imm(value, _) => format!("{value}"),
        Operand::Frame(slot) => {
            let disp = -func.frame.slot(slot).offset;
            if disp < 0 {
                format!("[rbp - {}]", -disp)
            } else {
                format!("[rbp + {disp}]")
            }
        }
        Operand::Constant(pool) => {
            use crate::entity::EntityRef;
            pool_label(&func.name, pool.index())
        }
        Operand::Global(value) => match unit.values[value].kind {
            ValueKind::Func(f) => unit.funcs[f].name.clone(),
            ValueKind::GlobalVar(g) => unit.globals[g].name.clone(),
            _ => {
                return Err(CodegenError::BadOperand(
                    "global operand is not a symbol".into(),
                ))
            }
        },
        Operand::Sym(sym) => unit.ext_syms[sym].name.clone(),
        Operand::Block(mb) => {
            let ir_block = func.blocks[mb].ir_block.expand().expect("ir origin");
            block_label(unit, ir_block)
        }
        Operand::Multi(_) => {
            return Err(CodegenError::BadOperand(
                "multi-value operand survived lowering".into(),
            ))
        }
    })
}

fn memory(
    unit: &Unit,
    func: &mir::Function,
    ops: &[Operand],
) -> CodegenResult<String> {
    // Shapes: [base, disp], [base, disp, index, scale], [base, disp, sym].
    let base = operand(unit, func, ops[0])?;
    let disp = match ops[1] {
        Operand::Imm(value, _) => value,
        other => {
            return Err(CodegenError::BadOperand(format!(
                "memory displacement {other:?}"
            )))
        }
    };
    let mut inner = base;
    match ops.get(2) {
        Some(&Operand::Reg(..)) => {
            let index = operand(unit, func, ops[2])?;
            let scale = match ops[3] {
                Operand::Imm(value, _) => value,
                _ => 1,
            };
            write!(inner, " + {index}*{scale}").unwrap();
        }
        Some(&sym @ (Operand::Global(_) | Operand::Sym(_) | Operand::Constant(_))) => {
            let sym = operand(unit, func, sym)?;
            write!(inner, " + {sym}").unwrap();
        }
        _ => {}
    }
    if disp > 0 {
        write!(inner, " + {disp}").unwrap();
    } else if disp < 0 {
        write!(inner, " - {}", -disp).unwrap();
    }
    Ok(format!("[{inner}]"))
}

fn size_keyword(opcode: Opcode) -> &'static str {
    use Opcode::*;
    match opcode {
        Mov8mi => "byte ptr ",
        Mov16mi => "word ptr ",
        Mov32mi => "dword ptr ",
        Mov64mi32 => "qword ptr ",
        _ => "",
    }
}

fn is_load_shape(opcode: Opcode) -> bool {
    use Opcode::*;
    matches!(
        opcode,
        Mov8rm | Mov16rm | Mov32rm | Mov64rm | Movssrm | Movsdrm | Lea64rm
    )
}

fn is_store_shape(opcode: Opcode) -> bool {
    use Opcode::*;
    matches!(
        opcode,
        Mov8mr | Mov16mr | Mov32mr | Mov64mr | Movssmr | Movsdmr | Mov8mi | Mov16mi
            | Mov32mi | Mov64mi32
    )
}

fn print_inst(
    out: &mut String,
    unit: &Unit,
    func: &mir::Function,
    inst: &mir::InstData,
) -> CodegenResult<()> {
    let opcode = Opcode::from_u32(inst.opcode).ok_or_else(|| {
        CodegenError::BadOperand(format!("unexpanded opcode {:#x}", inst.opcode))
    })?;
    let mnemonic = opcodes::mnemonic(opcode);
    if inst.operands.is_empty() {
        writeln!(out, "\t{mnemonic}").unwrap();
        return Ok(());
    }
    // Variable shifts read their count from cl implicitly.
    {
        use Opcode::*;
        if matches!(
            opcode,
            Shl8rc | Shl16rc | Shl32rc | Shl64rc | Shr8rc | Shr16rc | Shr32rc | Shr64rc
                | Sar8rc | Sar16rc | Sar32rc | Sar64rc
        ) {
            let dst = operand(unit, func, inst.operands[0])?;
            writeln!(out, "\t{mnemonic} {dst}, cl").unwrap();
            return Ok(());
        }
    }
    if is_load_shape(opcode) {
        let dst = operand(unit, func, inst.operands[0])?;
        let mem = memory(unit, func, &inst.operands[1..])?;
        writeln!(out, "\t{mnemonic} {dst}, {mem}").unwrap();
        return Ok(());
    }
    if is_store_shape(opcode) {
        let src_idx = inst.operands.len() - 1;
        let mem = memory(unit, func, &inst.operands[..src_idx])?;
        let src = operand(unit, func, inst.operands[src_idx])?;
        let size = size_keyword(opcode);
        writeln!(out, "\t{mnemonic} {size}{mem}, {src}").unwrap();
        return Ok(());
    }
    let ops: Vec<String> = inst
        .operands
        .iter()
        .map(|&op| operand(unit, func, op))
        .collect::<CodegenResult<_>>()?;
    writeln!(out, "\t{mnemonic} {}", ops.join(", ")).unwrap();
    Ok(())
}

fn print_global_init(
    out: &mut String,
    ctx: &Context,
    unit: &Unit,
    value: ir::Value,
) -> CodegenResult<()> {
    match unit.values[value].kind {
        ValueKind::ConstInt(v) => {
            let ty = unit.values[value].ty;
            let bits = ctx.types.bits(ty);
            let directive = match bits {
                1 | 8 => ".byte",
                16 => ".short",
                32 => ".long",
                _ => ".quad",
            };
            writeln!(out, "\t{directive} {v}").unwrap();
        }
        ValueKind::ConstFloat(bits) => {
            let ty = unit.values[value].ty;
            if ctx.types.bits(ty) == 32 {
                writeln!(out, "\t.long {}", (bits as u32)).unwrap();
            } else {
                writeln!(out, "\t.quad {bits}").unwrap();
            }
        }
        ValueKind::ConstString(ref s) => {
            writeln!(out, "\t.asciz {s:?}").unwrap();
        }
        ValueKind::ConstStruct(ref fields) => {
            for &field in fields {
                print_global_init(out, ctx, unit, field)?;
            }
        }
        ValueKind::ConstArray(ref elems) => {
            for &elem in elems {
                print_global_init(out, ctx, unit, elem)?;
            }
        }
        ValueKind::Block(block) => {
            writeln!(out, "\t.quad {}", block_label(unit, block)).unwrap();
        }
        ValueKind::Func(f) => {
            writeln!(out, "\t.quad {}", unit.funcs[f].name).unwrap();
        }
        ValueKind::Null | ValueKind::Undef => {
            let ty = unit.values[value].ty;
            let size = crate::datalayout::DataLayout::lp64().size_of(&ctx.types, ty);
            writeln!(out, "\t.zero {size}").unwrap();
        }
        ref other => {
            return Err(CodegenError::BadOperand(format!(
                "global initializer {other:?}"
            )))
        }
    }
    Ok(())
}

impl AsmPrinter for X64Printer {
    fn print(
        &self,
        ctx: &Context,
        unit: &Unit,
        machine: &FxHashMap<ir::Func, mir::Function>,
        out: &mut String,
    ) -> CodegenResult<()> {
        writeln!(out, ".intel_syntax noprefix").unwrap();
        writeln!(out, ".text").unwrap();
        for (func, data) in unit.funcs.iter() {
            let mfunc = match machine.get(&func) {
                Some(mfunc) => mfunc,
                None => continue,
            };
            writeln!(out).unwrap();
            if data.linkage == Linkage::External {
                writeln!(out, ".globl {}", data.name).unwrap();
            }
            writeln!(out, "{}:", data.name).unwrap();
            for &mb in &mfunc.block_order {
                let ir_block = mfunc.blocks[mb].ir_block.expand().expect("ir origin");
                writeln!(out, "{}:", block_label(unit, ir_block)).unwrap();
                for &inst in &mfunc.blocks[mb].insts {
                    print_inst(out, unit, mfunc, &mfunc.insts[inst])?;
                }
            }
            if mfunc.pool.len() > 0 {
                writeln!(out, ".section .rodata").unwrap();
                for (idx, entry) in mfunc.pool.iter() {
                    use crate::entity::EntityRef;
                    writeln!(out, "{}:", pool_label(&mfunc.name, idx.index())).unwrap();
                    match *entry {
                        PoolConstData::F32(bits) => {
                            writeln!(out, "\t.long {bits}").unwrap()
                        }
                        PoolConstData::F64(bits) => {
                            writeln!(out, "\t.quad {bits}").unwrap()
                        }
                    }
                }
                writeln!(out, ".text").unwrap();
            }
        }

        let mut emitted_header = false;
        for (_, global) in unit.globals.iter() {
            let init = match global.init {
                Some(init) => init,
                None => continue,
            };
            if !emitted_header {
                writeln!(out, "\n.section .rodata").unwrap();
                emitted_header = true;
            }
            if global.linkage == Linkage::External {
                writeln!(out, ".globl {}", global.name).unwrap();
            }
            writeln!(out, "{}:", global.name).unwrap();
            print_global_init(out, ctx, unit, init)?;
        }
        Ok(())
    }
}
