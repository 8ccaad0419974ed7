//! AArch64 selection patterns.

use crate::isa::aarch64::info::{fits_arith_imm, fits_mov_imm, load_for_class, store_for_class};
use crate::isa::aarch64::opcodes::Opcode::{self, *};
use crate::isa::aarch64::regs::{self, class};
use crate::isel::common::{
    always, emit_call_direct, emit_call_indirect, emit_constant_int, emit_frame_index,
    emit_function_argument, emit_multi_value, emit_phi, emit_register, emit_return, emit_root,
    emit_switch, emit_va_end, emit_va_start, match_call_direct,
};
use crate::isel::dag::{Node, NodeKind, NodePayload};
use crate::isel::pattern::{MatchArgs, Pattern, PatternTable};
use crate::isel::select::Isel;
use crate::mir::{ImmSize, MirBlock, Operand, PoolConstData, Reg, RegFlags};
use crate::result::{CodegenError, CodegenResult};

const fn u(opcode: Opcode) -> u32 {
    opcode.u()
}

fn reg_op(reg: Reg) -> Operand {
    Operand::reg(reg)
}

fn imm_op(value: i64) -> Operand {
    Operand::Imm(value, ImmSize::S4)
}

fn fp() -> Operand {
    reg_op(regs::X29)
}

fn class_for_size(size: u64, float: bool) -> u32 {
    match (float, size) {
        (true, 4) => class::FPR32,
        (true, _) => class::FPR64,
        (false, 8) => class::GPR64,
        (false, _) => class::GPR32,
    }
}

fn mov_rr(size: u64, float: bool) -> Opcode {
    match (float, size) {
        (true, 4) => FMovRR32,
        (true, _) => FMovRR64,
        (false, 8) => MovRR64,
        (false, _) => MovRR32,
    }
}

/// Force `op` into a register, materializing immediates and frame
/// addresses through fresh virtual registers.
fn materialize_reg(
    isel: &mut Isel,
    block: MirBlock,
    op: Operand,
    size: u64,
    float: bool,
) -> CodegenResult<Operand> {
    if op.is_reg() {
        return Ok(op);
    }
    let dst = reg_op(isel.func.new_vreg(class_for_size(size, float)));
    match op {
        Operand::Imm(value, _) => {
            let opcode = match (size == 8, fits_mov_imm(value)) {
                (true, true) => Mov64i,
                (true, false) => LdrLit64,
                (false, true) => Mov32i,
                (false, false) => LdrLit32,
            };
            isel.push(block, u(opcode), &[dst, op]);
        }
        Operand::Frame(slot) => {
            let offset = isel.func.frame.slot(slot).offset;
            let (opcode, value) = if offset >= 0 {
                (Sub64ri, offset)
            } else {
                (Add64ri, -offset)
            };
            isel.push(block, u(opcode), &[dst, fp(), imm_op(value)]);
        }
        _ => {
            return Err(CodegenError::BadOperand(format!(
                "cannot materialize {op:?} into a register"
            )))
        }
    }
    Ok(dst)
}

// ---------------------------------------------------------------------------
// Constants and globals.

fn emit_load_constant(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let constant = isel.dag.nodes[node].operands[0];
    let bits = match isel.dag.nodes[constant].payload {
        NodePayload::Float(bits) => bits,
        _ => unreachable!("load-constant over a non-float"),
    };
    let size = isel.node_size(node);
    let data = if size == 4 {
        PoolConstData::F32(bits as u32)
    } else {
        PoolConstData::F64(bits)
    };
    let pool = isel.func.pool_const(data);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let addr = reg_op(isel.func.new_vreg(class::GPR64));
    isel.push(block, u(Adrp), &[addr, Operand::Constant(pool)]);
    let load = if size == 4 { LdrF32Lo12 } else { LdrF64Lo12 };
    isel.push(block, u(load), &[dst, addr, Operand::Constant(pool)]);
    Ok(Some(dst))
}

fn emit_load_global(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let global = isel.dag.nodes[node].operands[0];
    let value = match isel.dag.nodes[global].payload {
        NodePayload::Global(value) => value,
        _ => unreachable!("load-global over a non-global"),
    };
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    isel.push(block, u(Adrp), &[dst, Operand::Global(value)]);
    isel.push(block, u(AddLo12), &[dst, dst, Operand::Global(value)]);
    Ok(Some(dst))
}

// ---------------------------------------------------------------------------
// Loads and stores.

fn match_mem_frame(args: &MatchArgs, node: Node) -> bool {
    let ptr = args.dag.nodes[node].operands[0];
    args.dag.kind(args.dag.extract_value(ptr, true)) == NodeKind::FrameIndex
}

fn match_mem_reg(args: &MatchArgs, node: Node) -> bool {
    let ptr = args.dag.nodes[node].operands[0];
    args.dag.is_register_like(args.dag.extract_value(ptr, true))
}

fn frame_slot_of(isel: &Isel, node: Node) -> crate::mir::StackSlot {
    match isel.dag.nodes[isel.dag.extract_value(node, true)].payload {
        NodePayload::Slot(slot) => slot,
        _ => unreachable!("not a frame index"),
    }
}

fn load_opcode(size: u64, float: bool) -> u32 {
    match (float, size) {
        (false, 1) => Ldrb.u(),
        (false, 2) => Ldrh.u(),
        _ => load_for_class(class_for_size(size, float)),
    }
}

fn store_opcode(size: u64, float: bool) -> u32 {
    match (float, size) {
        (false, 1) => Strb.u(),
        (false, 2) => Strh.u(),
        _ => store_for_class(class_for_size(size, float)),
    }
}

fn store_through(
    isel: &mut Isel,
    block: MirBlock,
    base: Operand,
    disp: i64,
    src: Operand,
    size: u64,
    float: bool,
) -> CodegenResult<()> {
    let src = materialize_reg(isel, block, src, size.max(4).min(8), float)?;
    let opcode = store_opcode(size, float);
    isel.push(block, opcode, &[base, imm_op(disp), src]);
    Ok(())
}

fn emit_store_common(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
    base: Operand,
    disp: i64,
) -> CodegenResult<Option<Operand>> {
    let value_node = isel.dag.nodes[node].operands[1];
    let src = isel.emit_value(value_node, block)?;
    let value = isel.dag.extract_value(value_node, false);
    if let Operand::Multi(multi) = src {
        let struct_ty = isel.node_ty(value);
        let fields: Vec<_> = isel.ctx.types.struct_fields(struct_ty).to_vec();
        let lanes = isel.func.multis[multi].clone();
        for (i, (&field, lane)) in fields.iter().zip(lanes).enumerate() {
            let off = isel.layout.field_offset(&isel.ctx.types, struct_ty, i) as i64;
            let fsize = isel.layout.size_of(&isel.ctx.types, field);
            let ffloat = isel.ctx.types.is_float(field);
            store_through(isel, block, base, disp + off, lane, fsize, ffloat)?;
        }
        return Ok(None);
    }
    let size = isel.node_size(value);
    let float = isel.node_is_float(value);
    store_through(isel, block, base, disp, src, size, float)?;
    Ok(None)
}

fn emit_store_frame(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let slot = frame_slot_of(isel, isel.dag.nodes[node].operands[0]);
    let disp = -isel.func.frame.slot(slot).offset;
    emit_store_common(isel, node, block, fp(), disp)
}

fn emit_store_ptr(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let addr = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let addr = materialize_reg(isel, block, addr, 8, false)?;
    emit_store_common(isel, node, block, addr, 0)
}

fn emit_load_common(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
    base: Operand,
    disp: i64,
) -> CodegenResult<Option<Operand>> {
    let result = isel.dag.nodes[node].result.expand().expect("load result");
    let dst = isel.emit_value(result, block)?;
    if let Operand::Multi(multi) = dst {
        let struct_ty = isel.node_ty(node);
        let fields: Vec<_> = isel.ctx.types.struct_fields(struct_ty).to_vec();
        let lanes = isel.func.multis[multi].clone();
        for (i, (&field, lane)) in fields.iter().zip(lanes).enumerate() {
            if isel.ctx.types.is_struct(field) {
                return Err(CodegenError::Unsupported(
                    "load of a nested struct".to_string(),
                ));
            }
            let off = isel.layout.field_offset(&isel.ctx.types, struct_ty, i) as i64;
            let fsize = isel.layout.size_of(&isel.ctx.types, field);
            let ffloat = isel.ctx.types.is_float(field);
            let opcode = load_opcode(fsize, ffloat);
            isel.push(block, opcode, &[lane, base, imm_op(disp + off)]);
        }
        return Ok(Some(dst));
    }
    let size = isel.node_size(node);
    let float = isel.node_is_float(node);
    let opcode = load_opcode(size, float);
    isel.push(block, opcode, &[dst, base, imm_op(disp)]);
    Ok(Some(dst))
}

fn emit_load_frame(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let slot = frame_slot_of(isel, isel.dag.nodes[node].operands[0]);
    let disp = -isel.func.frame.slot(slot).offset;
    emit_load_common(isel, node, block, fp(), disp)
}

fn emit_load_ptr(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let addr = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let addr = materialize_reg(isel, block, addr, 8, false)?;
    emit_load_common(isel, node, block, addr, 0)
}

// ---------------------------------------------------------------------------
// Control flow.

const CSET_SIGNED: [Opcode; 6] = [CsetEq, CsetNe, CsetGt, CsetGe, CsetLt, CsetLe];
const CSET_UNSIGNED: [Opcode; 6] = [CsetEq, CsetNe, CsetHi, CsetHs, CsetLo, CsetLs];
const BCC_SIGNED: [Opcode; 6] = [Beq, Bne, Bgt, Bge, Blt, Ble];
const BCC_UNSIGNED: [Opcode; 6] = [Beq, Bne, Bhi, Bhs, Blo, Bls];

fn cond_of(kind: NodeKind, signed_set: [Opcode; 6], unsigned_set: [Opcode; 6]) -> Opcode {
    use NodeKind::*;
    match kind {
        ICmpEq | FCmpEq => signed_set[0],
        ICmpNe | FCmpNe => signed_set[1],
        ICmpGt | FCmpGt => signed_set[2],
        ICmpGe | FCmpGe => signed_set[3],
        ICmpLt | FCmpLt => signed_set[4],
        ICmpLe | FCmpLe => signed_set[5],
        UCmpGt => unsigned_set[2],
        UCmpGe => unsigned_set[3],
        UCmpLt => unsigned_set[4],
        UCmpLe => unsigned_set[5],
        _ => unreachable!("not a comparison"),
    }
}

fn emit_compare(isel: &mut Isel, cmp_node: Node, block: MirBlock) -> CodegenResult<()> {
    let lhs_node = isel.dag.nodes[cmp_node].operands[0];
    let rhs_node = isel.dag.nodes[cmp_node].operands[1];
    let lhs = isel.emit_value(lhs_node, block)?;
    let rhs = isel.emit_value(rhs_node, block)?;
    let value = isel.dag.extract_value(lhs_node, false);
    let size = isel.node_size(value);
    let float = isel.node_is_float(value);
    if float {
        let opcode = if size == 4 { FcmpS } else { FcmpD };
        isel.push(block, u(opcode), &[lhs, rhs]);
        return Ok(());
    }
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    match rhs {
        Operand::Imm(value, _) if fits_arith_imm(value) => {
            let opcode = if size == 8 { Cmp64ri } else { Cmp32ri };
            isel.push(block, u(opcode), &[lhs, rhs]);
        }
        _ => {
            let rhs = materialize_reg(isel, block, rhs, size, false)?;
            let opcode = if size == 8 { Cmp64rr } else { Cmp32rr };
            isel.push(block, u(opcode), &[lhs, rhs]);
        }
    }
    Ok(())
}

fn match_jump_uncond(args: &MatchArgs, node: Node) -> bool {
    args.dag.nodes[node].operands.len() == 1
}

fn emit_jump_uncond(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let target = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    isel.push(block, u(B), &[target]);
    Ok(None)
}

fn match_jump_cond_cmp(args: &MatchArgs, node: Node) -> bool {
    let ops = &args.dag.nodes[node].operands;
    ops.len() == 3 && args.dag.kind(ops[2]).is_cmp()
}

fn emit_jump_cond_cmp(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let then_target = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let else_target = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let cmp_node = isel.dag.nodes[node].operands[2];
    emit_compare(isel, cmp_node, block)?;
    let bcc = cond_of(isel.dag.kind(cmp_node), BCC_SIGNED, BCC_UNSIGNED);
    isel.push(block, u(bcc), &[then_target]);
    isel.push(block, u(B), &[else_target]);
    Ok(None)
}

fn match_jump_cond(args: &MatchArgs, node: Node) -> bool {
    args.dag.nodes[node].operands.len() == 3
}

fn emit_jump_cond(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let then_target = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let else_target = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let cond = isel.emit_value(isel.dag.nodes[node].operands[2], block)?;
    match cond {
        Operand::Imm(value, _) => {
            let target = if value != 0 { then_target } else { else_target };
            isel.push(block, u(B), &[target]);
        }
        Operand::Reg(..) => {
            isel.push(block, u(Cmp32ri), &[cond, imm_op(0)]);
            isel.push(block, u(Bne), &[then_target]);
            isel.push(block, u(B), &[else_target]);
        }
        other => {
            return Err(CodegenError::BadOperand(format!(
                "branch condition {other:?}"
            )))
        }
    }
    Ok(None)
}

fn emit_setcc(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    emit_compare(isel, node, block)?;
    let cset = cond_of(isel.dag.kind(node), CSET_SIGNED, CSET_UNSIGNED);
    isel.push(block, u(cset), &[dst]);
    Ok(Some(dst))
}

// ---------------------------------------------------------------------------
// Arithmetic.

fn match_int(args: &MatchArgs, node: Node) -> bool {
    let ty = args.dag.nodes[node].ty.expand().expect("typed node");
    !args.types.is_float(ty)
}

fn match_float(args: &MatchArgs, node: Node) -> bool {
    !match_int(args, node)
}

fn match_int_arith_imm(args: &MatchArgs, node: Node) -> bool {
    if !match_int(args, node) {
        return false;
    }
    let rhs = args.dag.nodes[node].operands[1];
    match args.dag.nodes[rhs].payload {
        NodePayload::Imm(value) => {
            args.dag.kind(rhs) == NodeKind::ConstantInt && fits_arith_imm(value)
        }
        _ => false,
    }
}

fn int_rr(kind: NodeKind, size: u64) -> Opcode {
    let wide = size == 8;
    match kind {
        NodeKind::Add => {
            if wide {
                Add64rr
            } else {
                Add32rr
            }
        }
        NodeKind::Sub => {
            if wide {
                Sub64rr
            } else {
                Sub32rr
            }
        }
        NodeKind::And => {
            if wide {
                And64rr
            } else {
                And32rr
            }
        }
        NodeKind::Or => {
            if wide {
                Orr64rr
            } else {
                Orr32rr
            }
        }
        NodeKind::Xor => {
            if wide {
                Eor64rr
            } else {
                Eor32rr
            }
        }
        NodeKind::ShiftLeft => {
            if wide {
                Lsl64rr
            } else {
                Lsl32rr
            }
        }
        NodeKind::LShiftRight => {
            if wide {
                Lsr64rr
            } else {
                Lsr32rr
            }
        }
        NodeKind::AShiftRight => {
            if wide {
                Asr64rr
            } else {
                Asr32rr
            }
        }
        NodeKind::IMul | NodeKind::UMul => {
            if wide {
                Mul64
            } else {
                Mul32
            }
        }
        _ => unreachable!("not an integer binop"),
    }
}

/// Three-address integer arithmetic.
fn emit_int_binop(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    let rhs = materialize_reg(isel, block, rhs, size, false)?;
    let opcode = int_rr(isel.dag.kind(node), size);
    isel.push(block, u(opcode), &[dst, lhs, rhs]);
    Ok(Some(dst))
}

/// `add`/`sub` with a 12-bit immediate right side.
fn emit_add_sub_imm(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    let opcode = match (isel.dag.kind(node), size == 8) {
        (NodeKind::Add, true) => Add64ri,
        (NodeKind::Add, false) => Add32ri,
        (NodeKind::Sub, true) => Sub64ri,
        (NodeKind::Sub, false) => Sub32ri,
        _ => unreachable!(),
    };
    isel.push(block, u(opcode), &[dst, lhs, rhs]);
    Ok(Some(dst))
}

/// Shifts by a constant amount.
fn emit_shift_imm(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let amount = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    let opcode = match (isel.dag.kind(node), size == 8) {
        (NodeKind::ShiftLeft, true) => Lsl64ri,
        (NodeKind::ShiftLeft, false) => Lsl32ri,
        (NodeKind::LShiftRight, true) => Lsr64ri,
        (NodeKind::LShiftRight, false) => Lsr32ri,
        (NodeKind::AShiftRight, true) => Asr64ri,
        (NodeKind::AShiftRight, false) => Asr32ri,
        _ => unreachable!(),
    };
    let amount = match amount {
        Operand::Imm(value, _) => imm_op(value & if size == 8 { 63 } else { 31 }),
        other => other,
    };
    isel.push(block, u(opcode), &[dst, lhs, amount]);
    Ok(Some(dst))
}

fn match_shift_imm(args: &MatchArgs, node: Node) -> bool {
    let rhs = args.dag.nodes[node].operands[1];
    args.dag.kind(rhs) == NodeKind::ConstantInt
}

/// Division; the remainder folds the quotient back with `msub`.
fn emit_div_rem(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let kind = isel.dag.kind(node);
    let signed = matches!(kind, NodeKind::IDiv | NodeKind::IRem);
    let remainder = matches!(kind, NodeKind::IRem | NodeKind::URem);
    let size = isel.node_size(node);
    let wide = size == 8;
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    let rhs = materialize_reg(isel, block, rhs, size, false)?;
    let div = match (signed, wide) {
        (true, true) => Sdiv64,
        (true, false) => Sdiv32,
        (false, true) => Udiv64,
        (false, false) => Udiv32,
    };
    if !remainder {
        isel.push(block, u(div), &[dst, lhs, rhs]);
        return Ok(Some(dst));
    }
    let quotient = reg_op(isel.func.new_vreg(class_for_size(size, false)));
    isel.push(block, u(div), &[quotient, lhs, rhs]);
    let msub = if wide { Msub64 } else { Msub32 };
    isel.push(block, u(msub), &[dst, quotient, rhs, lhs]);
    Ok(Some(dst))
}

fn float_rr(kind: NodeKind, size: u64) -> CodegenResult<Opcode> {
    let single = size == 4;
    Ok(match kind {
        NodeKind::Add => {
            if single {
                FaddS
            } else {
                FaddD
            }
        }
        NodeKind::Sub => {
            if single {
                FsubS
            } else {
                FsubD
            }
        }
        NodeKind::FMul => {
            if single {
                FmulS
            } else {
                FmulD
            }
        }
        NodeKind::FDiv => {
            if single {
                FdivS
            } else {
                FdivD
            }
        }
        _ => {
            return Err(CodegenError::Unsupported(format!(
                "float operation {kind:?}"
            )))
        }
    })
}

fn emit_float_binop(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let opcode = float_rr(isel.dag.kind(node), size)?;
    isel.push(block, u(opcode), &[dst, lhs, rhs]);
    Ok(Some(dst))
}

// ---------------------------------------------------------------------------
// Casts.

fn emit_zext(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src_node = isel.dag.extract_value(isel.dag.nodes[node].operands[0], false);
    let src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let from = isel.node_size(src_node);
    let to = isel.node_size(node);
    let src = materialize_reg(isel, block, src, from, false)?;
    // Writing the 32-bit register clears the upper half, so every zero
    // extension funnels through the w form of the destination.
    let dst_op = if to == 8 {
        dst.with_flags(RegFlags::FORCE32)
    } else {
        dst
    };
    let opcode = match from {
        1 => Uxtb32,
        2 => Uxth32,
        _ => MovRR32,
    };
    let src = src.with_flags(RegFlags::FORCE32);
    isel.push(block, u(opcode), &[dst_op, src]);
    Ok(Some(dst))
}

fn emit_sext(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src_node = isel.dag.extract_value(isel.dag.nodes[node].operands[0], false);
    let src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let from = isel.node_size(src_node);
    let to = isel.node_size(node);
    let src = materialize_reg(isel, block, src, from, false)?;
    let opcode = match (from, to == 8) {
        (1, true) => Sxtb64,
        (1, false) => Sxtb32,
        (2, true) => Sxth64,
        (2, false) => Sxth32,
        (4, true) => Sxtw64,
        _ => MovRR32,
    };
    let src = src.with_flags(RegFlags::FORCE32);
    isel.push(block, u(opcode), &[dst, src]);
    Ok(Some(dst))
}

fn emit_trunc(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let to = isel.node_size(node);
    let src = materialize_reg(isel, block, src, 4, false)?;
    let opcode = match to {
        1 => Uxtb32,
        2 => Uxth32,
        _ => MovRR32,
    };
    isel.push(block, u(opcode), &[dst, src.with_flags(RegFlags::FORCE32)]);
    Ok(Some(dst))
}

fn emit_float_cast(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let kind = isel.dag.kind(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src_node = isel.dag.extract_value(isel.dag.nodes[node].operands[0], false);
    let mut src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let src_size = isel.node_size(src_node);
    let dst_size = isel.node_size(node);
    let opcode = match kind {
        NodeKind::Fpext => FcvtDS,
        NodeKind::Fptrunc => FcvtSD,
        NodeKind::Sitofp | NodeKind::Uitofp => {
            src = materialize_reg(isel, block, src, src_size.max(4), false)?;
            let signed = kind == NodeKind::Sitofp;
            if src_size < 4 {
                let wide = reg_op(isel.func.new_vreg(class::GPR32));
                let widen = match (signed, src_size) {
                    (true, 1) => Sxtb32,
                    (true, _) => Sxth32,
                    (false, 1) => Uxtb32,
                    (false, _) => Uxth32,
                };
                isel.push(block, u(widen), &[wide, src.with_flags(RegFlags::FORCE32)]);
                src = wide;
            }
            let wide_int = src_size == 8;
            match (signed, dst_size == 4, wide_int) {
                (true, true, true) => ScvtfSX,
                (true, true, false) => ScvtfSW,
                (true, false, true) => ScvtfDX,
                (true, false, false) => ScvtfDW,
                (false, true, true) => UcvtfSX,
                (false, true, false) => UcvtfSW,
                (false, false, true) => UcvtfDX,
                (false, false, false) => UcvtfDW,
            }
        }
        NodeKind::Fptosi | NodeKind::Fptoui => {
            let signed = kind == NodeKind::Fptosi;
            let wide_int = dst_size == 8;
            match (signed, src_size == 4, wide_int) {
                (true, true, true) => FcvtzsXS,
                (true, true, false) => FcvtzsWS,
                (true, false, true) => FcvtzsXD,
                (true, false, false) => FcvtzsWD,
                (false, true, true) => FcvtzuXS,
                (false, true, false) => FcvtzuWS,
                (false, false, true) => FcvtzuXD,
                (false, false, false) => FcvtzuWD,
            }
        }
        _ => unreachable!("not a float cast"),
    };
    let dst_op = if matches!(kind, NodeKind::Fptosi | NodeKind::Fptoui) && dst_size < 4 {
        dst.with_flags(RegFlags::FORCE32)
    } else {
        dst
    };
    isel.push(block, u(opcode), &[dst_op, src]);
    Ok(Some(dst))
}

fn match_generic_same_bank(args: &MatchArgs, node: Node) -> bool {
    let src = args.dag.extract_value(args.dag.nodes[node].operands[0], false);
    let src_ty = args.dag.nodes[src].ty.expand().expect("typed");
    let dst_ty = args.dag.nodes[node].ty.expand().expect("typed");
    args.types.is_float(src_ty) == args.types.is_float(dst_ty)
}

fn emit_generic_cast(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let size = isel.node_size(node);
    let float = isel.node_is_float(node);
    let src = materialize_reg(isel, block, src, size, float)?;
    isel.push(block, u(mov_rr(size, float)), &[dst, src]);
    Ok(Some(dst))
}

fn emit_bitcast_cross(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let size = isel.node_size(node);
    let to_float = isel.node_is_float(node);
    let opcode = match (size, to_float) {
        (4, true) => FmovSW,
        (4, false) => FmovWS,
        (_, true) => FmovDX,
        (_, false) => FmovXD,
    };
    isel.push(block, u(opcode), &[dst, src]);
    Ok(Some(dst))
}

// ---------------------------------------------------------------------------
// Address arithmetic.

fn emit_gep(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let ptr_node = isel.dag.nodes[node].operands[0];
    let base = isel.emit_value(ptr_node, block)?;
    let base = materialize_reg(isel, block, base, 8, false)?;
    isel.push(block, u(MovRR64), &[dst, base]);

    let ptr_value = isel.dag.extract_value(ptr_node, false);
    let mut current = {
        let ty = isel.node_ty(ptr_value);
        if isel.ctx.types.is_pointer(ty) {
            isel.ctx.types.pointee(ty)
        } else {
            ty
        }
    };
    let mut const_offset = 0i64;
    let indices: Vec<Node> = isel.dag.nodes[node].operands[1..].to_vec();
    for (pos, index_node) in indices.into_iter().enumerate() {
        let index_value = isel.dag.extract_value(index_node, false);
        let const_index = match isel.dag.nodes[index_value].payload {
            NodePayload::Imm(value)
                if isel.dag.kind(index_value) == NodeKind::ConstantInt =>
            {
                Some(value)
            }
            _ => None,
        };
        if pos == 0 {
            let elem_size = isel.layout.size_of(&isel.ctx.types, current) as i64;
            match const_index {
                Some(idx) => const_offset += idx * elem_size,
                None => scaled_add(isel, block, dst, index_node, elem_size)?,
            }
            continue;
        }
        if isel.ctx.types.is_struct(current) {
            let idx = const_index.ok_or_else(|| {
                CodegenError::BadOperand("struct index must be constant".to_string())
            })? as usize;
            const_offset += isel.layout.field_offset(&isel.ctx.types, current, idx) as i64;
            current = isel.ctx.types.struct_fields(current)[idx];
        } else if isel.ctx.types.is_array(current) {
            let element = match *isel.ctx.types.data(current) {
                crate::ir::TypeData::Array { element, .. } => element,
                _ => unreachable!(),
            };
            let elem_size = isel.layout.size_of(&isel.ctx.types, element) as i64;
            match const_index {
                Some(idx) => const_offset += idx * elem_size,
                None => scaled_add(isel, block, dst, index_node, elem_size)?,
            }
            current = element;
        } else {
            return Err(CodegenError::BadOperand(
                "address index through a non-aggregate".to_string(),
            ));
        }
    }
    if const_offset != 0 {
        if fits_arith_imm(const_offset) {
            isel.push(block, u(Add64ri), &[dst, dst, imm_op(const_offset)]);
        } else {
            let tmp = materialize_reg(
                isel,
                block,
                imm_op(const_offset),
                8,
                false,
            )?;
            isel.push(block, u(Add64rr), &[dst, dst, tmp]);
        }
    }
    Ok(Some(dst))
}

fn scaled_add(
    isel: &mut Isel,
    block: MirBlock,
    dst: Operand,
    index_node: Node,
    scale: i64,
) -> CodegenResult<()> {
    let index_value = isel.dag.extract_value(index_node, false);
    let index_size = isel.node_size(index_value);
    let index = isel.emit_value(index_node, block)?;
    let index = materialize_reg(isel, block, index, index_size, false)?;
    let wide = reg_op(isel.func.new_vreg(class::GPR64));
    let widen = match index_size {
        1 => Sxtb64,
        2 => Sxth64,
        4 => Sxtw64,
        _ => MovRR64,
    };
    let index = if index_size == 8 {
        index
    } else {
        index.with_flags(RegFlags::FORCE32)
    };
    isel.push(block, u(widen), &[wide, index]);
    if scale != 1 {
        let factor = materialize_reg(isel, block, imm_op(scale), 8, false)?;
        let scaled = reg_op(isel.func.new_vreg(class::GPR64));
        isel.push(block, u(Mul64), &[scaled, wide, factor]);
        isel.push(block, u(Add64rr), &[dst, dst, scaled]);
    } else {
        isel.push(block, u(Add64rr), &[dst, dst, wide]);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Table.

/// Build the AArch64 pattern table.
pub fn build() -> PatternTable {
    use NodeKind::*;
    let mut t = PatternTable::new();

    t.add(Root, Pattern::new("root", always, emit_root).cost(0));
    t.add(Register, Pattern::new("register", always, emit_register).cost(0));
    t.add(
        ConstantInt,
        Pattern::new("const.int", always, emit_constant_int).cost(0),
    );
    t.add(
        FrameIndex,
        Pattern::new("frame.index", always, emit_frame_index).cost(0),
    );
    t.add(
        FunctionArgument,
        Pattern::new("func.arg", always, emit_function_argument).cost(0),
    );
    t.add(
        MultiValue,
        Pattern::new("multi.value", always, emit_multi_value).cost(0),
    );
    t.add(
        LoadConstant,
        Pattern::new("load.const.pool", always, emit_load_constant),
    );
    t.add(
        LoadGlobal,
        Pattern::new("load.global.adrp", always, emit_load_global),
    );

    t.add(
        Store,
        Pattern::new("store.frame", match_mem_frame, emit_store_frame)
            .covers(&[0])
            .cost(6),
    );
    t.add(Store, Pattern::new("store.ptr", match_mem_reg, emit_store_ptr));
    t.add(
        Load,
        Pattern::new("load.frame", match_mem_frame, emit_load_frame)
            .covers(&[0])
            .cost(6),
    );
    t.add(Load, Pattern::new("load.ptr", match_mem_reg, emit_load_ptr));

    t.add(
        Jump,
        Pattern::new("b", match_jump_uncond, emit_jump_uncond).cost(2),
    );
    t.add(
        Jump,
        Pattern::new("b.cmp.fused", match_jump_cond_cmp, emit_jump_cond_cmp)
            .covers(&[2])
            .cost(6),
    );
    t.add(Jump, Pattern::new("b.cond", match_jump_cond, emit_jump_cond));
    t.add(Ret, Pattern::new("ret", always, emit_return).cost(2));
    t.add(Switch, Pattern::new("switch", always, emit_switch));
    t.add(Phi, Pattern::new("phi", always, emit_phi).cost(2));

    t.add(
        Call,
        Pattern::new("call.direct", match_call_direct, emit_call_direct)
            .covers(&[0])
            .cost(8),
    );
    t.add(Call, Pattern::new("call.indirect", always, emit_call_indirect));
    t.add(VaStart, Pattern::new("va_start", always, emit_va_start));
    t.add(VaEnd, Pattern::new("va_end", always, emit_va_end));

    for kind in [And, Or, Xor, ShiftLeft, LShiftRight, AShiftRight, IMul, UMul] {
        t.add(kind, Pattern::new("int.binop", match_int, emit_int_binop));
    }
    for kind in [ShiftLeft, LShiftRight, AShiftRight] {
        t.add(
            kind,
            Pattern::new("shift.imm", match_shift_imm, emit_shift_imm)
                .covers(&[1])
                .cost(8),
        );
    }
    for kind in [Add, Sub] {
        t.add(kind, Pattern::new("int.binop", match_int, emit_int_binop));
        t.add(
            kind,
            Pattern::new("arith.imm", match_int_arith_imm, emit_add_sub_imm)
                .covers(&[1])
                .cost(8),
        );
        t.add(kind, Pattern::new("float.binop", match_float, emit_float_binop));
    }
    for kind in [FMul, FDiv] {
        t.add(kind, Pattern::new("float.binop", always, emit_float_binop));
    }
    for kind in [IDiv, UDiv, IRem, URem] {
        t.add(kind, Pattern::new("div.rem", always, emit_div_rem).cost(20));
    }
    for kind in [
        ICmpEq, ICmpNe, ICmpGt, ICmpGe, ICmpLt, ICmpLe, UCmpGt, UCmpGe, UCmpLt, UCmpLe,
        FCmpEq, FCmpNe, FCmpGt, FCmpGe, FCmpLt, FCmpLe,
    ] {
        t.add(kind, Pattern::new("cmp.cset", always, emit_setcc));
    }

    t.add(Zext, Pattern::new("zext", always, emit_zext));
    t.add(Sext, Pattern::new("sext", always, emit_sext));
    t.add(Trunc, Pattern::new("trunc", always, emit_trunc));
    for kind in [Fpext, Fptrunc, Fptosi, Fptoui, Sitofp, Uitofp] {
        t.add(kind, Pattern::new("float.cast", always, emit_float_cast));
    }
    t.add(
        GenericCast,
        Pattern::new("cast.same.bank", match_generic_same_bank, emit_generic_cast).cost(4),
    );
    t.add(
        GenericCast,
        Pattern::new("cast.cross.bank", always, emit_bitcast_cross),
    );
    t.add(Gep, Pattern::new("gep", always, emit_gep));

    t
}
