//! x86-64 selection patterns.

use crate::isa::instinfo::select_opcode;
use crate::isa::x64::opcodes::Opcode::{self, *};
use crate::isa::x64::regs::{self, class};
use crate::isel::dag::{Node, NodeKind, NodePayload};
use crate::isel::common::{
    always, emit_call_direct, emit_call_indirect, emit_constant_int, emit_frame_index,
    emit_function_argument, emit_multi_value, emit_phi, emit_register, emit_return, emit_root,
    emit_switch, emit_va_end, emit_va_start, match_call_direct,
};
use crate::isel::pattern::{MatchArgs, Pattern, PatternTable};
use crate::isel::select::Isel;
use crate::mir::{ImmSize, MirBlock, Operand, PoolConstData, Reg, RegFlags};
use crate::passes::OptLevel;
use crate::result::{CodegenError, CodegenResult};


const fn u(opcode: Opcode) -> u32 {
    opcode.u()
}

fn slot_disp(isel: &Isel, slot: crate::mir::StackSlot) -> i64 {
    -isel.func.frame.slot(slot).offset
}


fn mov_rr(size: u64, float: bool) -> CodegenResult<u32> {
    select_opcode(
        size,
        float,
        [u(Mov8rr), u(Mov16rr), u(Mov32rr), u(Mov64rr)],
        [u(Movssrr), u(Movsdrr)],
    )
}

fn mov_rm(size: u64, float: bool) -> CodegenResult<u32> {
    select_opcode(
        size,
        float,
        [u(Mov8rm), u(Mov16rm), u(Mov32rm), u(Mov64rm)],
        [u(Movssrm), u(Movsdrm)],
    )
}

fn mov_mr(size: u64, float: bool) -> CodegenResult<u32> {
    select_opcode(
        size,
        float,
        [u(Mov8mr), u(Mov16mr), u(Mov32mr), u(Mov64mr)],
        [u(Movssmr), u(Movsdmr)],
    )
}

fn mov_mi(size: u64) -> CodegenResult<u32> {
    select_opcode(
        size,
        false,
        [u(Mov8mi), u(Mov16mi), u(Mov32mi), u(Mov64mi32)],
        [0, 0],
    )
}

const RBP_OP: Operand = Operand::Reg(regs::RBP, RegFlags::EMPTY);

fn reg_op(reg: Reg) -> Operand {
    Operand::reg(reg)
}

/// Move `src` (register, immediate or frame address) into register `dst`.
fn move_into(
    isel: &mut Isel,
    block: MirBlock,
    dst: Operand,
    src: Operand,
    size: u64,
    float: bool,
) -> CodegenResult<()> {
    match src {
        Operand::Imm(value, _) if size == 8 && i32::try_from(value).is_err() => {
            isel.push(block, u(Movabs64ri), &[dst, src]);
        }
        Operand::Imm(..) => {
            let opcode = select_opcode(
                size,
                false,
                [u(Mov8ri), u(Mov16ri), u(Mov32ri), u(Mov64ri)],
                [0, 0],
            )?;
            isel.push(block, opcode, &[dst, src]);
        }
        Operand::Frame(slot) => {
            let disp = slot_disp(isel, slot);
            isel.push(block, u(Lea64rm), &[dst, RBP_OP, disp_op(disp)]);
        }
        _ => {
            isel.push(block, mov_rr(size, float)?, &[dst, src]);
        }
    }
    Ok(())
}

fn disp_op(disp: i64) -> Operand {
    Operand::Imm(disp, ImmSize::S4)
}

// ---------------------------------------------------------------------------
// Leaf values.







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
    let ty = isel.node_ty(node);
    let size = isel.layout.size_of(&isel.ctx.types, ty);
    let data = if size == 4 {
        PoolConstData::F32(bits as u32)
    } else {
        PoolConstData::F64(bits)
    };
    let pool = isel.func.pool_const(data);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let opcode = if size == 4 { Movssrm } else { Movsdrm };
    isel.push(
        block,
        u(opcode),
        &[dst, reg_op(regs::RIP), disp_op(0), Operand::Constant(pool)],
    );
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
    isel.push(
        block,
        u(Lea64rm),
        &[dst, reg_op(regs::RIP), disp_op(0), Operand::Global(value)],
    );
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

/// Store `src` through `[base + disp]`, reducing awkward source shapes
/// through the scratch register.
fn store_through(
    isel: &mut Isel,
    block: MirBlock,
    base: Operand,
    disp: i64,
    src: Operand,
    size: u64,
    float: bool,
) -> CodegenResult<()> {
    match src {
        Operand::Reg(..) => {
            let opcode = mov_mr(size, float)?;
            isel.push(block, opcode, &[base, disp_op(disp), src]);
        }
        Operand::Imm(value, _) => {
            if size == 8 && i32::try_from(value).is_err() {
                let scratch = reg_op(regs::SCRATCH);
                isel.push(block, u(Movabs64ri), &[scratch, src]);
                isel.push(block, u(Mov64mr), &[base, disp_op(disp), scratch]);
            } else {
                let opcode = mov_mi(size)?;
                isel.push(block, opcode, &[base, disp_op(disp), src]);
            }
        }
        Operand::Frame(slot) => {
            // Storing an address: materialize it first.
            let scratch = reg_op(regs::SCRATCH);
            let src_disp = -isel.func.frame.slot(slot).offset;
            isel.push(block, u(Lea64rm), &[scratch, RBP_OP, disp_op(src_disp)]);
            isel.push(block, u(Mov64mr), &[base, disp_op(disp), scratch]);
        }
        _ => {
            return Err(CodegenError::BadOperand(format!(
                "cannot store operand {src:?}"
            )))
        }
    }
    Ok(())
}

fn emit_store_frame(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let value_node = isel.dag.nodes[node].operands[1];
    let src = isel.emit_value(value_node, block)?;
    let slot = frame_slot_of(isel, isel.dag.nodes[node].operands[0]);
    let disp = slot_disp(isel, slot);
    let value = isel.dag.extract_value(value_node, false);
    if let Operand::Multi(multi) = src {
        let struct_ty = isel.node_ty(value);
        let fields: Vec<_> = isel.ctx.types.struct_fields(struct_ty).to_vec();
        let lanes = isel.func.multis[multi].clone();
        for (i, (&field, lane)) in fields.iter().zip(lanes).enumerate() {
            let off = isel.layout.field_offset(&isel.ctx.types, struct_ty, i) as i64;
            let fsize = isel.layout.size_of(&isel.ctx.types, field);
            let ffloat = isel.ctx.types.is_float(field);
            store_through(isel, block, RBP_OP, disp + off, lane, fsize, ffloat)?;
        }
        return Ok(None);
    }
    let size = isel.node_size(value);
    let float = isel.node_is_float(value);
    store_through(isel, block, RBP_OP, disp, src, size, float)?;
    Ok(None)
}

fn emit_store_ptr(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let value_node = isel.dag.nodes[node].operands[1];
    let src = isel.emit_value(value_node, block)?;
    let addr = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let value = isel.dag.extract_value(value_node, false);
    let size = isel.node_size(value);
    let float = isel.node_is_float(value);
    store_through(isel, block, addr, 0, src, size, float)?;
    Ok(None)
}

fn load_into(
    isel: &mut Isel,
    block: MirBlock,
    dst: Operand,
    base: Operand,
    disp: i64,
    size: u64,
    float: bool,
) -> CodegenResult<()> {
    let opcode = mov_rm(size, float)?;
    isel.push(block, opcode, &[dst, base, disp_op(disp)]);
    Ok(())
}

fn emit_load(
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
            load_into(isel, block, lane, base, disp + off, fsize, ffloat)?;
        }
        return Ok(Some(dst));
    }
    let size = isel.node_size(node);
    let float = isel.node_is_float(node);
    load_into(isel, block, dst, base, disp, size, float)?;
    Ok(Some(dst))
}

fn emit_load_frame(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let slot = frame_slot_of(isel, isel.dag.nodes[node].operands[0]);
    let disp = slot_disp(isel, slot);
    emit_load(isel, node, block, RBP_OP, disp)
}

fn emit_load_ptr(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let addr = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    emit_load(isel, node, block, addr, 0)
}

// ---------------------------------------------------------------------------
// Control flow.

fn match_jump_uncond(args: &MatchArgs, node: Node) -> bool {
    args.dag.nodes[node].operands.len() == 1
}

fn emit_jump_uncond(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let target = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    isel.push(block, u(Jmp), &[target]);
    Ok(None)
}

fn match_jump_cond_cmp(args: &MatchArgs, node: Node) -> bool {
    let ops = &args.dag.nodes[node].operands;
    ops.len() == 3 && args.dag.kind(ops[2]).is_cmp()
}

fn cmp_of(kind: NodeKind, signed_set: [Opcode; 6], unsigned_set: [Opcode; 6]) -> Opcode {
    use NodeKind::*;
    match kind {
        ICmpEq | FCmpEq => signed_set[0],
        ICmpNe | FCmpNe => signed_set[1],
        ICmpGt => signed_set[2],
        ICmpGe => signed_set[3],
        ICmpLt => signed_set[4],
        ICmpLe => signed_set[5],
        UCmpGt | FCmpGt => unsigned_set[2],
        UCmpGe | FCmpGe => unsigned_set[3],
        UCmpLt | FCmpLt => unsigned_set[4],
        UCmpLe | FCmpLe => unsigned_set[5],
        _ => unreachable!("not a comparison"),
    }
}

const SET_SIGNED: [Opcode; 6] = [Sete, Setne, Setg, Setge, Setl, Setle];
const SET_UNSIGNED: [Opcode; 6] = [Sete, Setne, Seta, Setae, Setb, Setbe];
const JCC_SIGNED: [Opcode; 6] = [Je, Jne, Jg, Jge, Jl, Jle];
const JCC_UNSIGNED: [Opcode; 6] = [Je, Jne, Ja, Jae, Jb, Jbe];

/// Emit the flag-setting compare of `cmp_node`.
fn emit_compare(isel: &mut Isel, cmp_node: Node, block: MirBlock) -> CodegenResult<()> {
    let lhs_node = isel.dag.nodes[cmp_node].operands[0];
    let rhs_node = isel.dag.nodes[cmp_node].operands[1];
    let lhs = isel.emit_value(lhs_node, block)?;
    let rhs = isel.emit_value(rhs_node, block)?;
    let value = isel.dag.extract_value(lhs_node, false);
    let size = isel.node_size(value);
    let float = isel.node_is_float(value);
    if float {
        let opcode = if size == 4 { Ucomiss } else { Ucomisd };
        isel.push(block, u(opcode), &[lhs, rhs]);
        return Ok(());
    }
    // The left side must be a register; fold a constant right side into the
    // immediate form.
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    match rhs {
        Operand::Imm(value, _) if i32::try_from(value).is_ok() => {
            let opcode = select_opcode(
                size,
                false,
                [u(Cmp8ri), u(Cmp16ri), u(Cmp32ri), u(Cmp64ri)],
                [0, 0],
            )?;
            isel.push(block, opcode, &[lhs, rhs]);
        }
        _ => {
            let rhs = materialize_reg(isel, block, rhs, size, false)?;
            let opcode = select_opcode(
                size,
                false,
                [u(Cmp8rr), u(Cmp16rr), u(Cmp32rr), u(Cmp64rr)],
                [0, 0],
            )?;
            isel.push(block, opcode, &[lhs, rhs]);
        }
    }
    Ok(())
}

/// Force `op` into a register of the right class, moving if needed.
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
    let class = if float {
        class::FPR
    } else {
        match size {
            1 => class::GPR8,
            2 => class::GPR16,
            4 => class::GPR32,
            _ => class::GPR64,
        }
    };
    let dst = reg_op(isel.func.new_vreg(class));
    let opcode = match op {
        Operand::Imm(value, _) if size == 8 && i32::try_from(value).is_err() => u(Movabs64ri),
        Operand::Imm(..) => select_opcode(
            size,
            false,
            [u(Mov8ri), u(Mov16ri), u(Mov32ri), u(Mov64ri)],
            [0, 0],
        )?,
        Operand::Frame(slot) => {
            let disp = slot_disp(isel, slot);
            isel.push(block, u(Lea64rm), &[dst, RBP_OP, disp_op(disp)]);
            return Ok(dst);
        }
        _ => {
            return Err(CodegenError::BadOperand(format!(
                "cannot materialize {op:?} into a register"
            )))
        }
    };
    isel.push(block, opcode, &[dst, op]);
    Ok(dst)
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
    let jcc = cmp_of(isel.dag.kind(cmp_node), JCC_SIGNED, JCC_UNSIGNED);
    isel.push(block, u(jcc), &[then_target]);
    isel.push(block, u(Jmp), &[else_target]);
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
            isel.push(block, u(Jmp), &[target]);
        }
        Operand::Reg(..) => {
            isel.push(block, u(Cmp8ri), &[cond, Operand::Imm(0, ImmSize::S1)]);
            isel.push(block, u(Jne), &[then_target]);
            isel.push(block, u(Jmp), &[else_target]);
        }
        other => {
            return Err(CodegenError::BadOperand(format!(
                "branch condition {other:?}"
            )))
        }
    }
    Ok(None)
}




// ---------------------------------------------------------------------------
// Calls.








// ---------------------------------------------------------------------------
// Integer and float arithmetic.

fn match_int(args: &MatchArgs, node: Node) -> bool {
    let ty = args.dag.nodes[node].ty.expand().expect("typed node");
    !args.types.is_float(ty)
}

fn match_float(args: &MatchArgs, node: Node) -> bool {
    let ty = args.dag.nodes[node].ty.expand().expect("typed node");
    args.types.is_float(ty)
}

fn match_int_imm_rhs(args: &MatchArgs, node: Node) -> bool {
    if !match_int(args, node) {
        return false;
    }
    let rhs = args.dag.nodes[node].operands[1];
    match args.dag.nodes[rhs].payload {
        NodePayload::Imm(value) => {
            args.dag.kind(rhs) == NodeKind::ConstantInt && i32::try_from(value).is_ok()
        }
        _ => false,
    }
}

fn int_rr_set(kind: NodeKind) -> [u32; 4] {
    match kind {
        NodeKind::Add => [u(Add8rr), u(Add16rr), u(Add32rr), u(Add64rr)],
        NodeKind::Sub => [u(Sub8rr), u(Sub16rr), u(Sub32rr), u(Sub64rr)],
        NodeKind::And => [u(And8rr), u(And16rr), u(And32rr), u(And64rr)],
        NodeKind::Or => [u(Or8rr), u(Or16rr), u(Or32rr), u(Or64rr)],
        NodeKind::Xor => [u(Xor8rr), u(Xor16rr), u(Xor32rr), u(Xor64rr)],
        _ => unreachable!("not a simple integer binop"),
    }
}

fn int_ri_set(kind: NodeKind) -> [u32; 4] {
    match kind {
        NodeKind::Add => [u(Add8ri), u(Add16ri), u(Add32ri), u(Add64ri)],
        NodeKind::Sub => [u(Sub8ri), u(Sub16ri), u(Sub32ri), u(Sub64ri)],
        NodeKind::And => [u(And8ri), u(And16ri), u(And32ri), u(And64ri)],
        NodeKind::Or => [u(Or8ri), u(Or16ri), u(Or32ri), u(Or64ri)],
        NodeKind::Xor => [u(Xor8ri), u(Xor16ri), u(Xor32ri), u(Xor64ri)],
        _ => unreachable!("not a simple integer binop"),
    }
}

/// Two-address integer ALU: copy the left operand into the destination and
/// operate in place.
fn emit_int_binop_rr(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    move_into(isel, block, dst, lhs, size, false)?;
    let rhs = materialize_reg(isel, block, rhs, size, false)?;
    let opcode = select_opcode(size, false, int_rr_set(isel.dag.kind(node)), [0, 0])?;
    isel.push(block, opcode, &[dst, rhs]);
    Ok(Some(dst))
}

fn emit_int_binop_ri(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    move_into(isel, block, dst, lhs, size, false)?;
    let opcode = select_opcode(size, false, int_ri_set(isel.dag.kind(node)), [0, 0])?;
    isel.push(block, opcode, &[dst, rhs]);
    Ok(Some(dst))
}

/// `lea`-based 64-bit addition, gated behind O1.
fn match_add_lea(args: &MatchArgs, node: Node) -> bool {
    if !match_int(args, node) {
        return false;
    }
    let ty = args.dag.nodes[node].ty.expand().expect("typed node");
    if args.layout.size_of(args.types, ty) != 8 {
        return false;
    }
    let ops = &args.dag.nodes[node].operands;
    args.dag.is_register_like(args.dag.extract_value(ops[0], false))
        && args.dag.is_register_like(args.dag.extract_value(ops[1], false))
}

fn emit_add_lea(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    isel.push(
        block,
        u(Lea64rm),
        &[dst, lhs, disp_op(0), rhs, Operand::Imm(1, ImmSize::S1)],
    );
    Ok(Some(dst))
}

fn emit_mul(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    if size == 1 {
        // No two-operand 8-bit imul: widen through 32-bit temporaries.
        let wl = reg_op(isel.func.new_vreg(class::GPR32));
        let wr = reg_op(isel.func.new_vreg(class::GPR32));
        let lhs = materialize_reg(isel, block, lhs, 1, false)?;
        let rhs = materialize_reg(isel, block, rhs, 1, false)?;
        isel.push(block, u(Movsx8r32), &[wl, lhs]);
        isel.push(block, u(Movsx8r32), &[wr, rhs]);
        isel.push(block, u(Imul32rr), &[wl, wr]);
        isel.push(block, u(Mov8rr), &[dst, wl.with_flags(RegFlags::FORCE8)]);
        return Ok(Some(dst));
    }
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    let rhs = materialize_reg(isel, block, rhs, size, false)?;
    isel.push(block, mov_rr(size, false)?, &[dst, lhs]);
    let opcode = select_opcode(
        size,
        false,
        [0, u(Imul16rr), u(Imul32rr), u(Imul64rr)],
        [0, 0],
    )?;
    isel.push(block, opcode, &[dst, rhs]);
    Ok(Some(dst))
}

/// Signed and unsigned division and remainder through `rax:rdx`.
fn emit_div_rem(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let kind = isel.dag.kind(node);
    let signed = matches!(kind, NodeKind::IDiv | NodeKind::IRem);
    let remainder = matches!(kind, NodeKind::IRem | NodeKind::URem);
    let orig_size = isel.node_size(node);
    let size = orig_size.max(4);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let lhs = materialize_reg(isel, block, lhs, orig_size, false)?;
    let rhs = materialize_reg(isel, block, rhs, orig_size, false)?;

    let widen = |isel: &mut Isel, block, src: Operand| -> CodegenResult<Operand> {
        if orig_size >= 4 {
            return Ok(src);
        }
        let wide = reg_op(isel.func.new_vreg(class::GPR32));
        let opcode = if signed {
            if orig_size == 1 { Movsx8r32 } else { Movsx16r32 }
        } else if orig_size == 1 {
            Movzx8r32
        } else {
            Movzx16r32
        };
        isel.push(block, u(opcode), &[wide, src]);
        Ok(wide)
    };
    let lhs = widen(isel, block, lhs)?;
    let rhs = widen(isel, block, rhs)?;

    let acc = if size == 8 { regs::RAX } else { regs::EAX };
    let rem = if size == 8 { regs::RDX } else { regs::EDX };
    isel.push(block, mov_rr(size, false)?, &[reg_op(acc), lhs]);
    if signed {
        let ext = if size == 8 { Cqo } else { Cdq };
        isel.push(block, u(ext), &[]);
    } else {
        isel.push(block, u(Xor32rr), &[reg_op(regs::EDX), reg_op(regs::EDX)]);
    }
    let div = match (signed, size) {
        (true, 8) => Idiv64r,
        (true, _) => Idiv32r,
        (false, 8) => Div64r,
        (false, _) => Div32r,
    };
    isel.push(block, u(div), &[rhs]);
    let out = if remainder { rem } else { acc };
    let flags = RegFlags::for_size(orig_size);
    let mov = mov_rr(orig_size, false)?;
    isel.push(
        block,
        mov,
        &[dst, Operand::Reg(out, RegFlags::empty()).with_flags(flags)],
    );
    Ok(Some(dst))
}

fn float_rr(kind: NodeKind, size: u64) -> CodegenResult<u32> {
    let (single, double) = match kind {
        NodeKind::Add => (Addss, Addsd),
        NodeKind::Sub => (Subss, Subsd),
        NodeKind::FMul => (Mulss, Mulsd),
        NodeKind::FDiv => (Divss, Divsd),
        _ => {
            return Err(CodegenError::Unsupported(format!(
                "float operation {kind:?}"
            )))
        }
    };
    Ok(if size == 4 { u(single) } else { u(double) })
}

fn emit_float_binop(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let rhs = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    isel.push(block, mov_rr(size, true)?, &[dst, lhs]);
    let opcode = float_rr(isel.dag.kind(node), size)?;
    isel.push(block, opcode, &[dst, rhs]);
    Ok(Some(dst))
}

fn emit_setcc(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    emit_compare(isel, node, block)?;
    let set = cmp_of(isel.dag.kind(node), SET_SIGNED, SET_UNSIGNED);
    isel.push(block, u(set), &[dst]);
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
    let opcode = match (from, to) {
        (1, 2) | (1, 4) => Movzx8r32,
        (1, 8) => Movzx8r64,
        (2, 4) => Movzx16r32,
        (2, 8) => Movzx16r64,
        // The 32-bit move zero-extends into the full register.
        (4, 8) => Mov32rr,
        _ => Mov32rr,
    };
    let dst_op = if opcode == Mov32rr {
        dst.with_flags(RegFlags::FORCE32)
    } else if to == 2 {
        dst.with_flags(RegFlags::FORCE32)
    } else {
        dst
    };
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
    let opcode = match (from, to.max(4)) {
        (1, 4) => Movsx8r32,
        (1, 8) => Movsx8r64,
        (2, 4) => Movsx16r32,
        (2, 8) => Movsx16r64,
        (4, 8) => Movsx32r64,
        _ => Mov32rr,
    };
    isel.push(block, u(opcode), &[dst, src]);
    Ok(Some(dst))
}

fn emit_trunc(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let to = isel.node_size(node);
    match src {
        Operand::Reg(..) => {
            let mov = mov_rr(to, false)?;
            isel.push(block, mov, &[dst, src.with_flags(RegFlags::for_size(to))]);
        }
        _ => move_into(isel, block, dst, src, to, false)?,
    }
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
        NodeKind::Fpext => u(Cvtss2sd),
        NodeKind::Fptrunc => u(Cvtsd2ss),
        NodeKind::Sitofp | NodeKind::Uitofp => {
            let mut int_size = src_size;
            src = materialize_reg(isel, block, src, src_size, false)?;
            if int_size < 4 || (kind == NodeKind::Uitofp && int_size == 4) {
                // Widen so the signed convert sees the right value.
                let wide = reg_op(isel.func.new_vreg(class::GPR64));
                let widen = match (kind, int_size) {
                    (NodeKind::Sitofp, 1) => Movsx8r64,
                    (NodeKind::Sitofp, 2) => Movsx16r64,
                    (NodeKind::Uitofp, 1) => Movzx8r64,
                    (NodeKind::Uitofp, 2) => Movzx16r64,
                    // Implicit zero extension of the 32-bit move.
                    _ => Mov32rr,
                };
                let wide_op = if widen == Mov32rr {
                    wide.with_flags(RegFlags::FORCE32)
                } else {
                    wide
                };
                isel.push(block, u(widen), &[wide_op, src]);
                src = wide;
                int_size = 8;
            }
            match (dst_size, int_size) {
                (4, 8) => u(Cvtsi2ss64),
                (4, _) => u(Cvtsi2ss32),
                (_, 8) => u(Cvtsi2sd64),
                _ => u(Cvtsi2sd32),
            }
        }
        NodeKind::Fptosi | NodeKind::Fptoui => {
            let int_size = dst_size.max(4);
            match (src_size, int_size) {
                (4, 8) => u(Cvttss2si64),
                (4, _) => u(Cvttss2si32),
                (_, 8) => u(Cvttsd2si64),
                _ => u(Cvttsd2si32),
            }
        }
        _ => unreachable!("not a float cast"),
    };
    let dst_op = if matches!(kind, NodeKind::Fptosi | NodeKind::Fptoui) && dst_size < 4 {
        dst.with_flags(RegFlags::FORCE32)
    } else {
        dst
    };
    isel.push(block, opcode, &[dst_op, src]);
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
    move_into(isel, block, dst, src, size, false)?;
    Ok(Some(dst))
}

fn emit_bitcast_cross(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let src = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let size = isel.node_size(node);
    let to_float = isel.node_is_float(node);
    let opcode = match (size, to_float) {
        (4, true) => Movd32fr,
        (4, false) => Movd32rf,
        (_, true) => Movq64fr,
        (_, false) => Movq64rf,
    };
    isel.push(block, u(opcode), &[dst, src]);
    Ok(Some(dst))
}

// ---------------------------------------------------------------------------
// Shifts.

fn match_shift_imm(args: &MatchArgs, node: Node) -> bool {
    let rhs = args.dag.nodes[node].operands[1];
    args.dag.kind(rhs) == NodeKind::ConstantInt
}

fn shift_sets(kind: NodeKind) -> ([u32; 4], [u32; 4]) {
    match kind {
        NodeKind::ShiftLeft => (
            [u(Shl8ri), u(Shl16ri), u(Shl32ri), u(Shl64ri)],
            [u(Shl8rc), u(Shl16rc), u(Shl32rc), u(Shl64rc)],
        ),
        NodeKind::LShiftRight => (
            [u(Shr8ri), u(Shr16ri), u(Shr32ri), u(Shr64ri)],
            [u(Shr8rc), u(Shr16rc), u(Shr32rc), u(Shr64rc)],
        ),
        NodeKind::AShiftRight => (
            [u(Sar8ri), u(Sar16ri), u(Sar32ri), u(Sar64ri)],
            [u(Sar8rc), u(Sar16rc), u(Sar32rc), u(Sar64rc)],
        ),
        _ => unreachable!("not a shift"),
    }
}

fn emit_shift_imm(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let amount = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    isel.push(block, mov_rr(size, false)?, &[dst, lhs]);
    let (imm_set, _) = shift_sets(isel.dag.kind(node));
    let opcode = select_opcode(size, false, imm_set, [0, 0])?;
    let amount = match amount {
        Operand::Imm(value, _) => Operand::Imm(value & 63, ImmSize::S1),
        other => other,
    };
    isel.push(block, opcode, &[dst, amount]);
    Ok(Some(dst))
}

fn emit_shift_reg(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let size = isel.node_size(node);
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let lhs = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    let amount = isel.emit_value(isel.dag.nodes[node].operands[1], block)?;
    let lhs = materialize_reg(isel, block, lhs, size, false)?;
    isel.push(block, mov_rr(size, false)?, &[dst, lhs]);
    // The variable count always travels through cl.
    isel.push(
        block,
        u(Mov8rr),
        &[reg_op(regs::CL), amount.with_flags(RegFlags::FORCE8)],
    );
    let (_, reg_set) = shift_sets(isel.dag.kind(node));
    let opcode = select_opcode(size, false, reg_set, [0, 0])?;
    isel.push(block, opcode, &[dst]);
    Ok(Some(dst))
}

// ---------------------------------------------------------------------------
// Address arithmetic.

fn emit_gep(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let dst = isel.emit_value(isel.dag.nodes[node].result.expand().unwrap(), block)?;
    let ptr_node = isel.dag.nodes[node].operands[0];
    let base = isel.emit_value(ptr_node, block)?;
    let base = materialize_reg(isel, block, base, 8, false)?;
    isel.push(block, u(Mov64rr), &[dst, base]);

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
            const_offset +=
                isel.layout.field_offset(&isel.ctx.types, current, idx) as i64;
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
        isel.push(
            block,
            u(Add64ri),
            &[dst, Operand::Imm(const_offset, ImmSize::S4)],
        );
    }
    Ok(Some(dst))
}

/// `dst += index * scale` with a sign-extended runtime index.
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
        1 => Movsx8r64,
        2 => Movsx16r64,
        4 => Movsx32r64,
        _ => Mov64rr,
    };
    isel.push(block, u(widen), &[wide, index]);
    if scale != 1 {
        let factor = reg_op(isel.func.new_vreg(class::GPR64));
        isel.push(
            block,
            u(Mov64ri),
            &[factor, Operand::Imm(scale, ImmSize::S4)],
        );
        isel.push(block, u(Imul64rr), &[wide, factor]);
    }
    isel.push(block, u(Add64rr), &[dst, wide]);
    Ok(())
}

// ---------------------------------------------------------------------------
// Table.

/// Build the x86-64 pattern table.
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
        Pattern::new("load.global.lea", always, emit_load_global),
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
        Pattern::new("jmp", match_jump_uncond, emit_jump_uncond).cost(2),
    );
    t.add(
        Jump,
        Pattern::new("br.cmp.fused", match_jump_cond_cmp, emit_jump_cond_cmp)
            .covers(&[2])
            .cost(6),
    );
    t.add(Jump, Pattern::new("br.cond", match_jump_cond, emit_jump_cond));
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

    for kind in [Add, Sub, And, Or, Xor] {
        t.add(
            kind,
            Pattern::new("int.binop.rr", match_int, emit_int_binop_rr),
        );
        t.add(
            kind,
            Pattern::new("int.binop.ri", match_int_imm_rhs, emit_int_binop_ri)
                .covers(&[1])
                .cost(8),
        );
    }
    t.add(
        Add,
        Pattern::new("add.lea", match_add_lea, emit_add_lea)
            .cost(7)
            .min_opt(OptLevel::O1),
    );
    for kind in [Add, Sub] {
        t.add(
            kind,
            Pattern::new("float.binop", match_float, emit_float_binop),
        );
    }
    for kind in [FMul, FDiv] {
        t.add(kind, Pattern::new("float.binop", always, emit_float_binop));
    }
    for kind in [IMul, UMul] {
        t.add(kind, Pattern::new("mul", always, emit_mul));
    }
    for kind in [IDiv, UDiv, IRem, URem] {
        t.add(kind, Pattern::new("div.rem", always, emit_div_rem).cost(20));
    }
    for kind in [
        ICmpEq, ICmpNe, ICmpGt, ICmpGe, ICmpLt, ICmpLe, UCmpGt, UCmpGe, UCmpLt, UCmpLe,
        FCmpEq, FCmpNe, FCmpGt, FCmpGe, FCmpLt, FCmpLe,
    ] {
        t.add(kind, Pattern::new("cmp.set", always, emit_setcc));
    }
    for kind in [ShiftLeft, LShiftRight, AShiftRight] {
        t.add(
            kind,
            Pattern::new("shift.imm", match_shift_imm, emit_shift_imm)
                .covers(&[1])
                .cost(8),
        );
        t.add(kind, Pattern::new("shift.reg", always, emit_shift_reg));
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
