//! x86-64 expansion of pseudo-instructions and frame finalization.

use crate::context::Context;
use crate::datalayout::DataLayout;
use crate::ir;
use crate::ir::unit::Unit;
use crate::ir::value::ValueKind;
use crate::isa::callconv::{call_conv_data, ArgAssign, CallConv, CallInfo};
use crate::isa::instinfo::InstructionInfo;
use crate::isa::lowering::TargetLowering;
use crate::isa::reginfo::RegisterInfo;
use crate::isa::x64::info::instruction_info;
use crate::isa::x64::opcodes::Opcode::*;
use crate::isa::x64::regs::{self, class};
use crate::mir::{self, CallSite, ImmSize, InstData, MirBlock, MirInst, Operand, Reg};
use crate::regalloc::spill::spill_to;
use crate::result::{CodegenError, CodegenResult};
use smallvec::SmallVec;

/// Density at or below which a switch lowers to a compare cascade instead
/// of a jump table.
const JUMP_TABLE_DENSITY: f64 = 0.5;

/// The x86-64 lowering hooks.
pub struct X64Lowering {
    cc: CallConv,
    layout: DataLayout,
    return_insts: Vec<(MirBlock, MirInst)>,
    jump_tables: u32,
}

impl X64Lowering {
    /// Create the lowering for one function's worth of work.
    pub fn new(cc: CallConv) -> Self {
        Self {
            cc,
            layout: DataLayout::lp64(),
            return_insts: Vec::new(),
            jump_tables: 0,
        }
    }

    fn rinfo(&self) -> &'static dyn RegisterInfo {
        match self.cc {
            CallConv::Win64 => &regs::WIN64,
            _ => &regs::SYSV,
        }
    }

    fn is_fp_reg(&self, reg: Reg) -> bool {
        self.rinfo().is_physical(reg) && self.rinfo().desc(reg).class == class::FPR
    }

    /// The by-value flags of a call's arguments, known for direct calls.
    fn byval_flags(&self, unit: &Unit, callee: Operand, num_args: usize) -> Vec<bool> {
        let mut flags = vec![false; num_args];
        if let Operand::Global(value) = callee {
            if let ValueKind::Func(func) = unit.values[value].kind {
                for (i, &arg) in unit.funcs[func].args.iter().enumerate().take(num_args) {
                    flags[i] = unit.values[arg].flags.contains(ir::ValueFlags::BYVAL);
                }
            }
        }
        flags
    }
}

fn align16(bytes: u64) -> u64 {
    (bytes + 15) / 16 * 16
}

fn imm(value: i64, size: ImmSize) -> Operand {
    Operand::Imm(value, size)
}

impl TargetLowering for X64Lowering {
    fn reg_info(&self) -> &'static dyn RegisterInfo {
        self.rinfo()
    }

    fn inst_info(&self) -> &'static dyn InstructionInfo {
        instruction_info()
    }

    fn lower_call(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()> {
        let inst_id = func.blocks[block].insts[at];
        let data = func.insts[inst_id].clone();
        let info = func
            .call_lowerings
            .remove(&inst_id)
            .ok_or_else(|| CodegenError::BadOperand("call without lowering info".into()))?;
        func.remove_inst(block, at);

        let reg_info = self.rinfo();
        let inst_info = self.inst_info();
        let cc = call_conv_data(info.call_conv);
        let call_info = CallInfo::analyze(
            cc,
            reg_info,
            &ctx.types,
            &self.layout,
            &info.types,
            info.vararg,
        )?;

        let callee = data.operands[0];
        let args: Vec<Operand> = data.operands[1..].to_vec();
        let byval = self.byval_flags(unit, callee, args.len());
        let mut pos = at;

        // Outgoing stack area: by-value aggregates first, then spilled
        // scalars, all above the shadow space.
        let mut byval_total = 0u64;
        for (i, &is_byval) in byval.iter().enumerate() {
            if is_byval {
                let pointee = pointee_of(ctx, info.types[i + 1]);
                byval_total += align8(self.layout.size_of(&ctx.types, pointee));
            }
        }
        let scalar_count = call_info
            .args
            .iter()
            .zip(&byval)
            .filter(|(assign, &is_byval)| {
                matches!(assign, ArgAssign::Stack) && !is_byval
            })
            .count() as u64;
        let stack_total = align16(cc.shadow_bytes + byval_total + scalar_count * 8);

        if stack_total > 0 {
            func.insert_inst(
                block,
                pos,
                InstData::new(
                    Sub64ri.u(),
                    [Operand::reg(regs::RSP), imm(stack_total as i64, ImmSize::S4)],
                ),
            );
            pos += 1;
        }

        // Place the stack-bound arguments.
        let mut byval_off = cc.shadow_bytes;
        let mut scalar_off = cc.shadow_bytes + byval_total;
        for (i, (&arg, assign)) in args.iter().zip(&call_info.args).enumerate() {
            if byval[i] {
                let pointee = pointee_of(ctx, info.types[i + 1]);
                let size = align8(self.layout.size_of(&ctx.types, pointee));
                pos += copy_to_outgoing(func, inst_info, block, pos, arg, byval_off, size)?;
                byval_off += size;
                continue;
            }
            if !matches!(assign, ArgAssign::Stack) {
                continue;
            }
            pos += store_outgoing(func, block, pos, arg, scalar_off)?;
            scalar_off += 8;
        }

        // Register arguments, deferring any whose target register still
        // holds another pending source.
        let mut pending: Vec<(Operand, usize)> = Vec::new();
        for (i, assign) in call_info.args.iter().enumerate() {
            if byval[i] {
                continue;
            }
            if let ArgAssign::Reg { .. } = assign {
                pending.push((args[i], i));
            }
        }
        let mut sources: Vec<Reg> = pending
            .iter()
            .filter_map(|&(op, _)| op.as_reg())
            .collect();
        let mut spins = 0;
        while let Some((op, index)) = pending.first().copied() {
            let (target, size) = match call_info.args[index] {
                ArgAssign::Reg { reg, size } => (reg, size),
                ArgAssign::Stack => unreachable!(),
            };
            let conflict = sources
                .iter()
                .any(|&src| src != op.as_reg().unwrap_or(src) && reg_info.is_same_register(src, target));
            if conflict && spins <= pending.len() {
                pending.rotate_left(1);
                spins += 1;
                continue;
            }
            spins = 0;
            pending.remove(0);
            let float = self.is_fp_reg(target);
            pos += inst_info.mov(func, block, pos, op, Operand::reg(target), size, float)?;
            if let Some(src) = op.as_reg() {
                sources.retain(|&s| !reg_info.is_same_register(s, src));
            }
        }

        // The call itself.
        let call_pos = pos;
        let opcode = match callee {
            Operand::Global(_) | Operand::Sym(_) => Call,
            Operand::Reg(..) => Call64r,
            other => {
                return Err(CodegenError::BadOperand(format!(
                    "call target {other:?}"
                )))
            }
        };
        let call_inst = func.insert_inst(block, pos, InstData::new(opcode.u(), [callee]));
        pos += 1;

        if stack_total > 0 {
            func.insert_inst(
                block,
                pos,
                InstData::new(
                    Add64ri.u(),
                    [Operand::reg(regs::RSP), imm(stack_total as i64, ImmSize::S4)],
                ),
            );
            pos += 1;
        }

        // Retrieve the results.
        let mut ret_regs: SmallVec<[Reg; 2]> = SmallVec::new();
        if let Some(result) = info.result {
            for (i, assign) in call_info.rets.iter().enumerate() {
                let ArgAssign::Reg { reg, size } = *assign else {
                    return Err(CodegenError::BadOperand(
                        "stack return is not supported".into(),
                    ));
                };
                let lane = match result {
                    Operand::Multi(multi) => func.multis[multi][i],
                    other => other,
                };
                let float = self.is_fp_reg(reg);
                pos += inst_info.mov(func, block, pos, Operand::reg(reg), lane, size, float)?;
                ret_regs.push(reg);
            }
        }

        func.call_sites.insert(
            call_inst,
            CallSite {
                start_offset: call_pos - at,
                end_offset: pos - call_pos,
                ret_regs,
            },
        );
        Ok(())
    }

    fn lower_switch(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()> {
        let inst_id = func.blocks[block].insts[at];
        let data = func.insts[inst_id].clone();
        func.remove_inst(block, at);
        let mut pos = at;

        let cond = data.operands[0];
        let default = data.operands[1];
        let cases: Vec<(i64, Operand)> = data.operands[2..]
            .chunks_exact(2)
            .map(|pair| match pair[0] {
                Operand::Imm(value, _) => Ok((value, pair[1])),
                other => Err(CodegenError::BadOperand(format!(
                    "switch case {other:?}"
                ))),
            })
            .collect::<CodegenResult<_>>()?;
        let min = cases.iter().map(|&(v, _)| v).min().unwrap_or(0);
        let max = cases.iter().map(|&(v, _)| v).max().unwrap_or(0);
        let span = (max - min + 1) as f64;
        let density = cases.len() as f64 / span;

        // Widen the scrutinee to 64 bits once; both strategies compare in
        // the full register.
        let index = Operand::reg(func.new_vreg(class::GPR64));
        match cond {
            Operand::Imm(value, _) => {
                func.insert_inst(block, pos, InstData::new(Mov64ri.u(), [index, imm(value, ImmSize::S4)]));
                pos += 1;
            }
            Operand::Reg(reg, _) => {
                let cond_class = self.rinfo().class_of(reg, func);
                let widen = match cond_class {
                    class::GPR64 => Mov64rr,
                    class::GPR32 => Movsx32r64,
                    class::GPR16 => Movsx16r64,
                    _ => Movsx8r64,
                };
                func.insert_inst(block, pos, InstData::new(widen.u(), [index, cond]));
                pos += 1;
            }
            other => {
                return Err(CodegenError::BadOperand(format!(
                    "switch scrutinee {other:?}"
                )))
            }
        }

        if density <= JUMP_TABLE_DENSITY {
            // Sparse cases: a compare cascade.
            for (value, target) in cases {
                func.insert_inst(
                    block,
                    pos,
                    InstData::new(Cmp64ri.u(), [index, imm(value, ImmSize::S4)]),
                );
                func.insert_inst(block, pos + 1, InstData::new(Je.u(), [target]));
                pos += 2;
            }
            func.insert_inst(block, pos, InstData::new(Jmp.u(), [default]));
            return Ok(());
        }

        // Dense cases: an internal table of block addresses, indexed after a
        // range check against [min, max].
        let mut table_blocks: Vec<ir::Value> = Vec::with_capacity(span as usize);
        for value in min..=max {
            let target = cases
                .iter()
                .find(|&&(v, _)| v == value)
                .map(|&(_, b)| b)
                .unwrap_or(default);
            let Operand::Block(mir_block) = target else {
                return Err(CodegenError::BadOperand("switch target".into()));
            };
            let ir_block = func.blocks[mir_block].ir_block.expand().expect("ir origin");
            table_blocks.push(unit.block_value(ctx, ir_block));
        }
        let void_ptr = {
            let void = ctx.types.void();
            ctx.types.pointer(void)
        };
        let table_ty = ctx.types.array(void_ptr, table_blocks.len() as u32);
        let init = unit.array_const(table_ty, table_blocks);
        let name = format!("{}.jt{}", func.name, self.jump_tables);
        self.jump_tables += 1;
        let global = unit.get_or_insert_global(ctx, &name, table_ty, Some(init), ir::Linkage::Internal);
        let table_addr = Operand::Global(unit.global_value(global));

        let table = Operand::reg(func.new_vreg(class::GPR64));
        func.insert_inst(
            block,
            pos,
            InstData::new(
                Lea64rm.u(),
                [table, Operand::reg(regs::RIP), imm(0, ImmSize::S4), table_addr],
            ),
        );
        pos += 1;
        func.insert_inst(block, pos, InstData::new(Cmp64ri.u(), [index, imm(min, ImmSize::S4)]));
        func.insert_inst(block, pos + 1, InstData::new(Jl.u(), [default]));
        func.insert_inst(block, pos + 2, InstData::new(Cmp64ri.u(), [index, imm(max, ImmSize::S4)]));
        func.insert_inst(block, pos + 3, InstData::new(Jg.u(), [default]));
        pos += 4;
        if min != 0 {
            func.insert_inst(block, pos, InstData::new(Sub64ri.u(), [index, imm(min, ImmSize::S4)]));
            pos += 1;
        }
        func.insert_inst(
            block,
            pos,
            InstData::new(
                Mov64rm.u(),
                [table, table, imm(0, ImmSize::S4), index, imm(8, ImmSize::S1)],
            ),
        );
        func.insert_inst(block, pos + 1, InstData::new(Jmp64r.u(), [table]));
        Ok(())
    }

    fn lower_return(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()> {
        let inst_id = func.blocks[block].insts[at];
        let data = func.insts[inst_id].clone();
        func.remove_inst(block, at);
        let mut pos = at;

        let reg_info = self.rinfo();
        let inst_info = self.inst_info();
        let fn_ty = unit.funcs[func.ir_func].ty;
        let sig = signature_types(ctx, fn_ty);
        let call_info = CallInfo::analyze(
            call_conv_data(self.cc),
            reg_info,
            &ctx.types,
            &self.layout,
            &sig,
            ctx.types.is_vararg(fn_ty),
        )?;

        if let Some(&value) = data.operands.first() {
            for (i, assign) in call_info.rets.iter().enumerate() {
                let ArgAssign::Reg { reg, size } = *assign else {
                    return Err(CodegenError::BadOperand(
                        "stack return is not supported".into(),
                    ));
                };
                let lane = match value {
                    Operand::Multi(multi) => func.multis[multi][i],
                    other => other,
                };
                let float = self.is_fp_reg(reg);
                pos += inst_info.mov(func, block, pos, lane, Operand::reg(reg), size, float)?;
            }
        }
        let ret = func.insert_inst(block, pos, InstData::new(Ret.u(), []));
        self.return_insts.push((block, ret));
        Ok(())
    }

    fn lower_va_start(
        &mut self,
        _ctx: &mut Context,
        _unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()> {
        let inst_id = func.blocks[block].insts[at];
        let list = func.insts[inst_id].operands[0];
        func.remove_inst(block, at);
        let save = func.va_save.ok_or_else(|| {
            CodegenError::BadOperand("va_start outside a vararg function".into())
        })?;
        let list = match list {
            Operand::Reg(..) => list,
            other => {
                return Err(CodegenError::BadOperand(format!("va_list operand {other:?}")))
            }
        };
        let mut pos = at;
        // System V va_list: gp_offset, fp_offset, overflow_arg_area,
        // reg_save_area.
        func.insert_inst(
            block,
            pos,
            InstData::new(Mov32mi.u(), [list, imm(0, ImmSize::S4), imm(save.gp_used as i64, ImmSize::S4)]),
        );
        func.insert_inst(
            block,
            pos + 1,
            InstData::new(Mov32mi.u(), [list, imm(4, ImmSize::S4), imm(save.fp_used as i64, ImmSize::S4)]),
        );
        pos += 2;
        let scratch = Operand::reg(regs::SCRATCH);
        func.insert_inst(
            block,
            pos,
            InstData::new(Lea64rm.u(), [scratch, Operand::reg(regs::RBP), imm(16, ImmSize::S4)]),
        );
        func.insert_inst(
            block,
            pos + 1,
            InstData::new(Mov64mr.u(), [list, imm(8, ImmSize::S4), scratch]),
        );
        pos += 2;
        let save_disp = -func.frame.slot(save.slot).offset;
        func.insert_inst(
            block,
            pos,
            InstData::new(Lea64rm.u(), [scratch, Operand::reg(regs::RBP), imm(save_disp, ImmSize::S4)]),
        );
        func.insert_inst(
            block,
            pos + 1,
            InstData::new(Mov64mr.u(), [list, imm(16, ImmSize::S4), scratch]),
        );
        Ok(())
    }

    fn lower_va_end(
        &mut self,
        _ctx: &mut Context,
        _unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()> {
        func.remove_inst(block, at);
        Ok(())
    }

    fn lower_function(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
    ) -> CodegenResult<()> {
        let reg_info = self.rinfo();
        let inst_info = self.inst_info();
        let cc = call_conv_data(self.cc);
        let fn_ty = unit.funcs[func.ir_func].ty;
        let vararg = ctx.types.is_vararg(fn_ty);
        let sig = signature_types(ctx, fn_ty);
        let call_info = CallInfo::analyze(cc, reg_info, &ctx.types, &self.layout, &sig, vararg)?;

        // Formal arguments: register args bind their virtual register to
        // the physical one; stack args spill to their caller-owned slot.
        let ir_args: Vec<ir::Value> = unit.funcs[func.ir_func].args.clone();
        let mut byval_total = 0i64;
        for &arg in &ir_args {
            if unit.values[arg].flags.contains(ir::ValueFlags::BYVAL) {
                let pointee = pointee_of(ctx, unit.values[arg].ty);
                byval_total += align8(self.layout.size_of(&ctx.types, pointee)) as i64;
            }
        }
        let mut scalar_ordinal = 0i64;
        for (i, assign) in call_info.args.iter().enumerate() {
            let is_byval = ir_args
                .get(i)
                .map(|&arg| unit.values[arg].flags.contains(ir::ValueFlags::BYVAL))
                .unwrap_or(false);
            if is_byval {
                continue;
            }
            match *assign {
                ArgAssign::Reg { reg, .. } => {
                    func.add_live_in(reg);
                    if let Some(op) = func.args.get(i).copied().flatten() {
                        func.replace_operand(op, Operand::reg(reg), true);
                        func.args[i] = Some(Operand::reg(reg));
                    }
                }
                ArgAssign::Stack => {
                    if let Some(Operand::Reg(vreg, _)) =
                        func.args.get(i).copied().flatten()
                    {
                        let offset =
                            -16 - cc.shadow_bytes as i64 - byval_total - 8 * scalar_ordinal;
                        let slot = func.frame.push_at(8, offset, 8);
                        spill_to(inst_info, reg_info, func, vreg, slot)?;
                    }
                    scalar_ordinal += 1;
                }
            }
        }

        // Vararg register-save area, filled in the prologue below.
        let mut va_stores: Vec<InstData> = Vec::new();
        if vararg && self.cc == CallConv::SysV {
            let slot = func.frame.push(176, 16);
            let gp_named = call_info
                .args
                .iter()
                .filter(|a| matches!(a, ArgAssign::Reg { reg, .. } if !self.is_fp_reg(*reg)))
                .count() as u32;
            let fp_named = call_info
                .args
                .iter()
                .filter(|a| matches!(a, ArgAssign::Reg { reg, .. } if self.is_fp_reg(*reg)))
                .count() as u32;
            func.va_save = Some(mir::VaSaveArea {
                slot,
                gp_used: gp_named * 8,
                fp_used: 48 + fp_named * 16,
            });
            let base = func.frame.slot(slot).offset;
            for (i, &reg) in cc.gp.iter().enumerate() {
                va_stores.push(InstData::new(
                    Mov64mr.u(),
                    [
                        Operand::reg(regs::RBP),
                        imm(-(base - (i as i64) * 8), ImmSize::S4),
                        Operand::reg(reg),
                    ],
                ));
            }
            for (i, &reg) in cc.fp.iter().enumerate() {
                va_stores.push(InstData::new(
                    Movsdmr.u(),
                    [
                        Operand::reg(regs::RBP),
                        imm(-(base - 48 - (i as i64) * 16), ImmSize::S4),
                        Operand::reg(reg),
                    ],
                ));
            }
        }

        // Prologue.
        let entry = func.entry_block();
        let mut pos = 0;
        func.insert_inst(entry, pos, InstData::new(Push64r.u(), [Operand::reg(regs::RBP)]));
        func.insert_inst(
            entry,
            pos + 1,
            InstData::new(Mov64rr.u(), [Operand::reg(regs::RBP), Operand::reg(regs::RSP)]),
        );
        pos += 2;
        let frame_size = align16(func.frame.size()) as i64;
        let sub = func.insert_inst(
            entry,
            pos,
            InstData::new(Sub64ri.u(), [Operand::reg(regs::RSP), imm(frame_size, ImmSize::S4)]),
        );
        func.frame_fixups.push(sub);
        pos += 1;
        for store in va_stores {
            func.insert_inst(entry, pos, store);
            pos += 1;
        }
        func.prologue_size = pos;

        // Epilogues, mirrored at every return.
        for (block, ret) in std::mem::take(&mut self.return_insts) {
            let ret_pos = func.inst_pos(block, ret);
            let add = func.insert_inst(
                block,
                ret_pos,
                InstData::new(Add64ri.u(), [Operand::reg(regs::RSP), imm(frame_size, ImmSize::S4)]),
            );
            func.frame_fixups.push(add);
            func.insert_inst(
                block,
                ret_pos + 1,
                InstData::new(Pop64r.u(), [Operand::reg(regs::RBP)]),
            );
            func.blocks[block].epilogue_size = 2;
        }
        Ok(())
    }
}

fn pointee_of(ctx: &Context, ty: crate::ir::Type) -> crate::ir::Type {
    if ctx.types.is_pointer(ty) {
        ctx.types.pointee(ty)
    } else {
        ty
    }
}

fn align8(bytes: u64) -> u64 {
    (bytes + 7) / 8 * 8
}

/// Collect `[ret, params...]` of a function type.
pub(crate) fn signature_types(ctx: &Context, fn_ty: crate::ir::Type) -> Vec<crate::ir::Type> {
    let mut sig = Vec::with_capacity(ctx.types.params(fn_ty).len() + 1);
    sig.push(ctx.types.return_type(fn_ty));
    sig.extend_from_slice(ctx.types.params(fn_ty));
    sig
}

/// Copy `size` bytes from the aggregate at `src` to `[rsp + offset]`.
fn copy_to_outgoing(
    func: &mut mir::Function,
    inst_info: &dyn InstructionInfo,
    block: MirBlock,
    pos: usize,
    src: Operand,
    offset: u64,
    size: u64,
) -> CodegenResult<usize> {
    let mut added = 0;
    let addr = Operand::reg(regs::SCRATCH);
    match src {
        Operand::Frame(slot) => {
            added += inst_info.slot_addr(func, block, pos, slot, regs::SCRATCH)?;
        }
        Operand::Reg(..) => {
            added += inst_info.mov(func, block, pos, src, addr, 8, false)?;
        }
        other => {
            return Err(CodegenError::BadOperand(format!(
                "by-value source {other:?}"
            )))
        }
    }
    let tmp = Operand::reg(regs::R10);
    let mut k = 0u64;
    while k < size {
        func.insert_inst(
            block,
            pos + added,
            InstData::new(Mov64rm.u(), [tmp, addr, imm(k as i64, ImmSize::S4)]),
        );
        func.insert_inst(
            block,
            pos + added + 1,
            InstData::new(
                Mov64mr.u(),
                [Operand::reg(regs::RSP), imm((offset + k) as i64, ImmSize::S4), tmp],
            ),
        );
        added += 2;
        k += 8;
    }
    Ok(added)
}

/// Store one scalar argument at `[rsp + offset]`.
fn store_outgoing(
    func: &mut mir::Function,
    block: MirBlock,
    pos: usize,
    src: Operand,
    offset: u64,
) -> CodegenResult<usize> {
    let disp = imm(offset as i64, ImmSize::S4);
    match src {
        Operand::Reg(..) => {
            func.insert_inst(
                block,
                pos,
                InstData::new(Mov64mr.u(), [Operand::reg(regs::RSP), disp, src]),
            );
            Ok(1)
        }
        Operand::Imm(value, _) if i32::try_from(value).is_ok() => {
            func.insert_inst(
                block,
                pos,
                InstData::new(Mov64mi32.u(), [Operand::reg(regs::RSP), disp, src]),
            );
            Ok(1)
        }
        Operand::Imm(..) => {
            func.insert_inst(
                block,
                pos,
                InstData::new(Movabs64ri.u(), [Operand::reg(regs::SCRATCH), src]),
            );
            func.insert_inst(
                block,
                pos + 1,
                InstData::new(
                    Mov64mr.u(),
                    [Operand::reg(regs::RSP), disp, Operand::reg(regs::SCRATCH)],
                ),
            );
            Ok(2)
        }
        other => Err(CodegenError::BadOperand(format!(
            "outgoing argument {other:?}"
        ))),
    }
}
