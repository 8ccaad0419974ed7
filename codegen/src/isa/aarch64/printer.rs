//! AArch64 assembly text output.
//!
//! GNU syntax with `:lo12:` relocations on ELF targets; Mach-O targets get
//! `@PAGE`/`@PAGEOFF` and leading-underscore symbols.

use crate::context::Context;
use crate::fx::FxHashMap;
use crate::ir;
use crate::ir::function::Linkage;
use crate::ir::unit::Unit;
use crate::ir::value::ValueKind;
use crate::isa::aarch64::opcodes::{self, Opcode};
use crate::isa::aarch64::regs;
use crate::isa::AsmPrinter;
use crate::isa::RegisterInfo;
use crate::mir::{self, Operand, PoolConstData};
use crate::result::{CodegenError, CodegenResult};
use core::fmt::Write;

/// The AArch64 printer.
pub struct A64Printer {
    /// Emit Mach-O style relocations and symbol names.
    pub macho: bool,
}

impl A64Printer {
    fn mangle(&self, name: &str) -> String {
        if self.macho {
            format!("_{name}")
        } else {
            name.to_string()
        }
    }

    fn page(&self, sym: &str) -> String {
        if self.macho {
            format!("{sym}@PAGE")
        } else {
            sym.to_string()
        }
    }

    fn pageoff(&self, sym: &str) -> String {
        if self.macho {
            format!("{sym}@PAGEOFF")
        } else {
            format!(":lo12:{sym}")
        }
    }
}

fn block_label(unit: &Unit, ir_block: ir::Block) -> String {
    use crate::entity::EntityRef;
    let func = unit.blocks[ir_block].func.expand().expect("block in function");
    format!(".L{}_{}", unit.funcs[func].name, ir_block.index())
}

fn pool_label(func_name: &str, index: usize) -> String {
    format!(".LCPI{func_name}_{index}")
}

fn symbol(
    printer: &A64Printer,
    unit: &Unit,
    func: &mir::Function,
    op: Operand,
) -> CodegenResult<String> {
    Ok(match op {
        Operand::Global(value) => match unit.values[value].kind {
            ValueKind::Func(f) => printer.mangle(&unit.funcs[f].name),
            ValueKind::GlobalVar(g) => printer.mangle(&unit.globals[g].name),
            _ => {
                return Err(CodegenError::BadOperand(
                    "global operand is not a symbol".into(),
                ))
            }
        },
        Operand::Sym(sym) => printer.mangle(&unit.ext_syms[sym].name),
        Operand::Constant(pool) => {
            use crate::entity::EntityRef;
            pool_label(&func.name, pool.index())
        }
        other => {
            return Err(CodegenError::BadOperand(format!(
                "expected a symbol operand, found {other:?}"
            )))
        }
    })
}

fn operand(unit: &Unit, func: &mir::Function, op: Operand) -> CodegenResult<String> {
    Ok(match op {
        Operand::Reg(reg, _) => {
            if reg.is_virtual() {
                format!("%v{}", reg.virtual_index())
            } else {
                regs::AAPCS64.name(reg).to_string()
            }
        }
        Operand::Imm(value, _) => format!("#{value}"),
        Operand::Frame(slot) => {
            format!("[x29, #{}]", -func.frame.slot(slot).offset)
        }
        Operand::Block(mb) => {
            let ir_block = func.blocks[mb].ir_block.expand().expect("ir origin");
            block_label(unit, ir_block)
        }
        other => {
            return Err(CodegenError::BadOperand(format!(
                "unprintable operand {other:?}"
            )))
        }
    })
}

fn print_inst(
    printer: &A64Printer,
    out: &mut String,
    unit: &Unit,
    func: &mir::Function,
    inst: &mir::InstData,
) -> CodegenResult<()> {
    use Opcode::*;
    let opcode = Opcode::from_u32(inst.opcode).ok_or_else(|| {
        CodegenError::BadOperand(format!("unexpanded opcode {:#x}", inst.opcode))
    })?;
    let mnemonic = opcodes::mnemonic(opcode);
    let ops = &inst.operands;

    match opcode {
        Ret if ops.is_empty() => {
            writeln!(out, "\tret").unwrap();
        }
        Ldr64 | Ldr32 | Ldrh | Ldrb | LdrF64 | LdrF32 => {
            let dst = operand(unit, func, ops[0])?;
            let base = operand(unit, func, ops[1])?;
            let off = operand(unit, func, ops[2])?;
            writeln!(out, "\t{mnemonic} {dst}, [{base}, {off}]").unwrap();
        }
        Str64 | Str32 | Strh | Strb | StrF64 | StrF32 => {
            let base = operand(unit, func, ops[0])?;
            let off = operand(unit, func, ops[1])?;
            let src = operand(unit, func, ops[2])?;
            writeln!(out, "\t{mnemonic} {src}, [{base}, {off}]").unwrap();
        }
        Ldr64Scaled => {
            let dst = operand(unit, func, ops[0])?;
            let base = operand(unit, func, ops[1])?;
            let index = operand(unit, func, ops[2])?;
            writeln!(out, "\tldr {dst}, [{base}, {index}, lsl #3]").unwrap();
        }
        LdrF64Lo12 | LdrF32Lo12 => {
            let dst = operand(unit, func, ops[0])?;
            let base = operand(unit, func, ops[1])?;
            let sym = symbol(printer, unit, func, ops[2])?;
            writeln!(out, "\tldr {dst}, [{base}, {}]", printer.pageoff(&sym)).unwrap();
        }
        Adrp => {
            let dst = operand(unit, func, ops[0])?;
            let sym = symbol(printer, unit, func, ops[1])?;
            writeln!(out, "\tadrp {dst}, {}", printer.page(&sym)).unwrap();
        }
        AddLo12 => {
            let dst = operand(unit, func, ops[0])?;
            let src = operand(unit, func, ops[1])?;
            let sym = symbol(printer, unit, func, ops[2])?;
            writeln!(out, "\tadd {dst}, {src}, {}", printer.pageoff(&sym)).unwrap();
        }
        StpPre64 => {
            let r1 = operand(unit, func, ops[0])?;
            let r2 = operand(unit, func, ops[1])?;
            let base = operand(unit, func, ops[2])?;
            let off = operand(unit, func, ops[3])?;
            writeln!(out, "\tstp {r1}, {r2}, [{base}, {off}]!").unwrap();
        }
        LdpPost64 => {
            let r1 = operand(unit, func, ops[0])?;
            let r2 = operand(unit, func, ops[1])?;
            let base = operand(unit, func, ops[2])?;
            let off = operand(unit, func, ops[3])?;
            writeln!(out, "\tldp {r1}, {r2}, [{base}], {off}").unwrap();
        }
        StrPreF64 => {
            let src = operand(unit, func, ops[0])?;
            let base = operand(unit, func, ops[1])?;
            let off = operand(unit, func, ops[2])?;
            writeln!(out, "\tstr {src}, [{base}, {off}]!").unwrap();
        }
        LdrPostF64 => {
            let dst = operand(unit, func, ops[0])?;
            let base = operand(unit, func, ops[1])?;
            let off = operand(unit, func, ops[2])?;
            writeln!(out, "\tldr {dst}, [{base}], {off}").unwrap();
        }
        LdrLit64 | LdrLit32 => {
            let dst = operand(unit, func, ops[0])?;
            let value = match ops[1] {
                Operand::Imm(value, _) => value,
                other => {
                    return Err(CodegenError::BadOperand(format!(
                        "literal operand {other:?}"
                    )))
                }
            };
            writeln!(out, "\tldr {dst}, ={value}").unwrap();
        }
        CsetEq | CsetNe | CsetGt | CsetGe | CsetLt | CsetLe | CsetHi | CsetHs | CsetLo
        | CsetLs => {
            let dst = operand(unit, func, ops[0])?;
            writeln!(out, "\tcset {dst}, {}", opcodes::cset_cond(opcode)).unwrap();
        }
        Bl => {
            let target = symbol(printer, unit, func, ops[0])?;
            writeln!(out, "\tbl {target}").unwrap();
        }
        _ => {
            let rendered: Vec<String> = ops
                .iter()
                .map(|&op| operand(unit, func, op))
                .collect::<CodegenResult<_>>()?;
            writeln!(out, "\t{mnemonic} {}", rendered.join(", ")).unwrap();
        }
    }
    Ok(())
}

fn print_global_init(
    printer: &A64Printer,
    out: &mut String,
    ctx: &Context,
    unit: &Unit,
    value: ir::Value,
) -> CodegenResult<()> {
    match unit.values[value].kind {
        ValueKind::ConstInt(v) => {
            let bits = ctx.types.bits(unit.values[value].ty);
            let directive = match bits {
                1 | 8 => ".byte",
                16 => ".short",
                32 => ".long",
                _ => ".quad",
            };
            writeln!(out, "\t{directive} {v}").unwrap();
        }
        ValueKind::ConstFloat(bits) => {
            if ctx.types.bits(unit.values[value].ty) == 32 {
                writeln!(out, "\t.long {}", bits as u32).unwrap();
            } else {
                writeln!(out, "\t.quad {bits}").unwrap();
            }
        }
        ValueKind::ConstString(ref s) => {
            writeln!(out, "\t.asciz {s:?}").unwrap();
        }
        ValueKind::ConstStruct(ref fields) => {
            for &field in fields {
                print_global_init(printer, out, ctx, unit, field)?;
            }
        }
        ValueKind::ConstArray(ref elems) => {
            for &elem in elems {
                print_global_init(printer, out, ctx, unit, elem)?;
            }
        }
        ValueKind::Block(block) => {
            writeln!(out, "\t.quad {}", block_label(unit, block)).unwrap();
        }
        ValueKind::Func(f) => {
            writeln!(out, "\t.quad {}", printer.mangle(&unit.funcs[f].name)).unwrap();
        }
        ValueKind::Null | ValueKind::Undef => {
            let size =
                crate::datalayout::DataLayout::lp64().size_of(&ctx.types, unit.values[value].ty);
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

impl AsmPrinter for A64Printer {
    fn print(
        &self,
        ctx: &Context,
        unit: &Unit,
        machine: &FxHashMap<ir::Func, mir::Function>,
        out: &mut String,
    ) -> CodegenResult<()> {
        writeln!(out, ".text").unwrap();
        for (func, data) in unit.funcs.iter() {
            let mfunc = match machine.get(&func) {
                Some(mfunc) => mfunc,
                None => continue,
            };
            writeln!(out).unwrap();
            let name = self.mangle(&data.name);
            if data.linkage == Linkage::External {
                writeln!(out, ".globl {name}").unwrap();
            }
            writeln!(out, "{name}:").unwrap();
            for &mb in &mfunc.block_order {
                let ir_block = mfunc.blocks[mb].ir_block.expand().expect("ir origin");
                writeln!(out, "{}:", block_label(unit, ir_block)).unwrap();
                for &inst in &mfunc.blocks[mb].insts {
                    print_inst(self, out, unit, mfunc, &mfunc.insts[inst])?;
                }
            }
            if mfunc.pool.len() > 0 {
                writeln!(out, ".section .rodata").unwrap();
                for (idx, entry) in mfunc.pool.iter() {
                    use crate::entity::EntityRef;
                    writeln!(out, "{}:", pool_label(&mfunc.name, idx.index())).unwrap();
                    match *entry {
                        PoolConstData::F32(bits) => writeln!(out, "\t.long {bits}").unwrap(),
                        PoolConstData::F64(bits) => writeln!(out, "\t.quad {bits}").unwrap(),
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
            let name = self.mangle(&global.name);
            if global.linkage == Linkage::External {
                writeln!(out, ".globl {name}").unwrap();
            }
            writeln!(out, "{name}:").unwrap();
            print_global_init(self, out, ctx, unit, init)?;
        }
        Ok(())
    }
}
