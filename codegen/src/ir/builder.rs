//! IR construction.
//!
//! A [`Builder`] appends instructions to a block of one function, keeping
//! use lists and CFG edges consistent as it goes. It is the only supported
//! way for front ends to produce IR.

use crate::context::Context;
use crate::ir::entities::{Block, Func, Inst, Value};
use crate::ir::instructions::{InstData, Opcode};
use crate::ir::types::{Type, TypeData};
use crate::ir::unit::Unit;
use crate::ir::value::{ValueData, ValueKind};
use crate::ir::block::BlockData;

/// Appends instructions to blocks of a single function.
pub struct Builder<'a> {
    /// The unit being built.
    pub unit: &'a mut Unit,
    /// The context providing type interning.
    pub ctx: &'a mut Context,
    func: Func,
    block: Option<Block>,
}

impl<'a> Builder<'a> {
    /// Create a builder for `func`, materializing its formal argument
    /// values on first use.
    pub fn new(unit: &'a mut Unit, ctx: &'a mut Context, func: Func) -> Self {
        if unit.funcs[func].args.is_empty() {
            let fn_ty = unit.funcs[func].ty;
            let params: Vec<Type> = ctx.types.params(fn_ty).to_vec();
            for (index, ty) in params.into_iter().enumerate() {
                let name = format!("arg{index}");
                let val = unit.values.push(ValueData::new(
                    name,
                    ty,
                    ValueKind::Arg {
                        func,
                        index: index as u32,
                    },
                ));
                unit.funcs[func].args.push(val);
            }
        }
        Self {
            unit,
            ctx,
            func,
            block: None,
        }
    }

    /// The function being built.
    pub fn func(&self) -> Func {
        self.func
    }

    /// The formal argument at position `index`.
    pub fn arg(&self, index: usize) -> Value {
        self.unit.funcs[self.func].args[index]
    }

    /// Append a new block to the function.
    pub fn create_block(&mut self, name: &str) -> Block {
        let block = self.unit.blocks.push(BlockData::new(name, self.func));
        self.unit.funcs[self.func].blocks.push(block);
        block
    }

    /// Direct subsequent instructions to the end of `block`.
    pub fn position_at_end(&mut self, block: Block) {
        self.block = Some(block);
    }

    /// The block currently being appended to.
    pub fn current_block(&self) -> Option<Block> {
        self.block
    }

    fn insert(&mut self, opcode: Opcode, ty: Type, operands: &[Value]) -> Inst {
        let block = self.block.expect("builder is not positioned");
        let inst_ty = ty;
        let inst = self.unit.insts.push(InstData::new(opcode, inst_ty));
        for &op in operands {
            self.unit.attach_operand(inst, op);
        }
        self.unit.append_inst(block, inst);
        inst
    }

    fn insert_with_result(
        &mut self,
        opcode: Opcode,
        inst_ty: Type,
        result_ty: Type,
        operands: &[Value],
    ) -> Value {
        let block = self.block.expect("builder is not positioned");
        let inst = self.unit.insts.push(InstData::new(opcode, inst_ty));
        for &op in operands {
            self.unit.attach_operand(inst, op);
        }
        let result = self
            .unit
            .values
            .push(ValueData::new("", result_ty, ValueKind::Inst(inst)));
        self.unit.insts[inst].result = Some(result).into();
        self.unit.append_inst(block, inst);
        result
    }

    // ------------------------------------------------------------------
    // Memory.

    /// Reserve a stack slot of type `ty`; the result is a pointer to it.
    pub fn create_alloca(&mut self, ty: Type) -> Value {
        let ptr = self.ctx.types.pointer(ty);
        self.insert_with_result(Opcode::Allocate, ty, ptr, &[])
    }

    /// Load the pointee of `ptr`.
    pub fn create_load(&mut self, ptr: Value) -> Value {
        let ptr_ty = self.unit.values[ptr].ty;
        debug_assert!(self.ctx.types.is_pointer(ptr_ty), "load expects a pointer");
        let ty = self.ctx.types.pointee(ptr_ty);
        self.insert_with_result(Opcode::Load, ty, ty, &[ptr])
    }

    /// Store `value` through `ptr`.
    pub fn create_store(&mut self, ptr: Value, value: Value) -> Inst {
        let ptr_ty = self.unit.values[ptr].ty;
        debug_assert!(self.ctx.types.is_pointer(ptr_ty), "store expects a pointer");
        let void = self.ctx.types.void();
        self.insert(Opcode::Store, void, &[ptr, value])
    }

    /// Compute an element address; `indices` walk arrays and struct fields.
    pub fn create_gep(&mut self, ptr: Value, indices: &[Value]) -> Value {
        let ptr_ty = self.unit.values[ptr].ty;
        debug_assert!(self.ctx.types.is_pointer(ptr_ty), "gep expects a pointer");
        let mut current = self.ctx.types.pointee(ptr_ty);
        for &index in &indices[1..] {
            current = match *self.ctx.types.data(current) {
                TypeData::Struct { .. } => {
                    let field = self.unit.values[index]
                        .as_const_int()
                        .expect("struct index must be a constant");
                    self.ctx.types.struct_fields(current)[field as usize]
                }
                TypeData::Array { element, .. } => element,
                _ => panic!("gep index through a non-aggregate"),
            };
        }
        let result_ty = self.ctx.types.pointer(current);
        let mut operands = Vec::with_capacity(indices.len() + 1);
        operands.push(ptr);
        operands.extend_from_slice(indices);
        self.insert_with_result(Opcode::GetElementPtr, result_ty, result_ty, &operands)
    }

    /// Project field `index` out of a struct-typed value.
    pub fn create_extract_value(&mut self, aggregate: Value, index: u32) -> Value {
        let agg_ty = self.unit.values[aggregate].ty;
        debug_assert!(self.ctx.types.is_struct(agg_ty));
        let field_ty = self.ctx.types.struct_fields(agg_ty)[index as usize];
        let i32_ty = self.ctx.types.int(32);
        let idx = self.unit.iconst(i32_ty, i64::from(index));
        self.insert_with_result(Opcode::ExtractValue, field_ty, field_ty, &[aggregate, idx])
    }

    // ------------------------------------------------------------------
    // Arithmetic, bitwise, comparisons, casts.

    /// Append a binary operator typed like its left operand.
    pub fn create_binary(&mut self, opcode: Opcode, lhs: Value, rhs: Value) -> Value {
        debug_assert_eq!(
            self.unit.values[lhs].ty, self.unit.values[rhs].ty,
            "binary operands must agree on type"
        );
        let ty = self.unit.values[lhs].ty;
        self.insert_with_result(opcode, ty, ty, &[lhs, rhs])
    }

    /// Append a comparison; the result is `i1`.
    pub fn create_cmp(&mut self, opcode: Opcode, lhs: Value, rhs: Value) -> Value {
        debug_assert!(opcode.is_cmp());
        let i1 = self.ctx.types.int(1);
        self.insert_with_result(opcode, i1, i1, &[lhs, rhs])
    }

    /// Append a cast of `value` to `ty`.
    pub fn create_cast(&mut self, opcode: Opcode, value: Value, ty: Type) -> Value {
        debug_assert!(opcode.is_cast());
        self.insert_with_result(opcode, ty, ty, &[value])
    }

    /// Integer or float addition.
    pub fn create_add(&mut self, lhs: Value, rhs: Value) -> Value {
        self.create_binary(Opcode::Add, lhs, rhs)
    }

    /// Integer or float subtraction.
    pub fn create_sub(&mut self, lhs: Value, rhs: Value) -> Value {
        self.create_binary(Opcode::Sub, lhs, rhs)
    }

    // ------------------------------------------------------------------
    // Control flow.

    /// Unconditional branch to `target`.
    pub fn create_br(&mut self, target: Block) -> Inst {
        let target_val = self.unit.block_value(self.ctx, target);
        let void = self.ctx.types.void();
        self.insert(Opcode::Jump, void, &[target_val])
    }

    /// Conditional branch: to `then_block` when `cond` is non-zero,
    /// `else_block` otherwise.
    pub fn create_cond_br(
        &mut self,
        then_block: Block,
        else_block: Block,
        cond: Value,
    ) -> Inst {
        let then_val = self.unit.block_value(self.ctx, then_block);
        let else_val = self.unit.block_value(self.ctx, else_block);
        let void = self.ctx.types.void();
        self.insert(Opcode::Jump, void, &[then_val, else_val, cond])
    }

    /// Multi-way branch over `cond` with constant cases.
    pub fn create_switch(
        &mut self,
        cond: Value,
        default: Block,
        cases: &[(Value, Block)],
    ) -> Inst {
        let mut operands = Vec::with_capacity(2 + cases.len() * 2);
        operands.push(cond);
        let default_val = self.unit.block_value(self.ctx, default);
        operands.push(default_val);
        for &(case_val, case_block) in cases {
            debug_assert!(
                self.unit.values[case_val].as_const_int().is_some(),
                "switch case must be an integer constant"
            );
            operands.push(case_val);
            let bv = self.unit.block_value(self.ctx, case_block);
            operands.push(bv);
        }
        let void = self.ctx.types.void();
        self.insert(Opcode::Switch, void, &operands)
    }

    /// Return, optionally with a value.
    pub fn create_ret(&mut self, value: Option<Value>) -> Inst {
        let void = self.ctx.types.void();
        match value {
            Some(v) => self.insert(Opcode::Ret, void, &[v]),
            None => self.insert(Opcode::Ret, void, &[]),
        }
    }

    /// SSA φ-node with `(value, block)` incomings.
    pub fn create_phi(&mut self, ty: Type, incomings: &[(Value, Block)]) -> Value {
        let mut operands = Vec::with_capacity(incomings.len() * 2);
        for &(val, block) in incomings {
            operands.push(val);
            let bv = self.unit.block_value(self.ctx, block);
            operands.push(bv);
        }
        self.insert_with_result(Opcode::Phi, ty, ty, &operands)
    }

    /// Call `callee` with `args`.
    pub fn create_call(&mut self, callee: Value, args: &[Value]) -> Value {
        let callee_ty = self.unit.values[callee].ty;
        let fn_ty = if self.ctx.types.is_pointer(callee_ty) {
            self.ctx.types.pointee(callee_ty)
        } else {
            callee_ty
        };
        debug_assert!(self.ctx.types.is_function(fn_ty), "callee is not a function");
        let ret = self.ctx.types.return_type(fn_ty);
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(args);
        if self.ctx.types.is_void(ret) {
            let inst = self.insert(Opcode::Call, ret, &operands);
            // Void calls still need a value for uniform handling; reuse the
            // instruction result slot with the void type.
            let result = self
                .unit
                .values
                .push(ValueData::new("", ret, ValueKind::Inst(inst)));
            self.unit.insts[inst].result = Some(result).into();
            result
        } else {
            self.insert_with_result(Opcode::Call, ret, ret, &operands)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::Linkage;

    fn simple_unit() -> (Context, Unit) {
        (Context::new(), Unit::new("test"))
    }

    #[test]
    fn use_lists_stay_consistent() {
        let (mut ctx, mut unit) = simple_unit();
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("f", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        b.position_at_end(entry);
        let one = b.unit.iconst(i32t, 1);
        let arg = b.arg(0);
        let sum = b.create_add(arg, one);
        let dbl = b.create_add(sum, sum);
        b.create_ret(Some(dbl));

        let sum_inst = unit.values[sum].as_inst().unwrap();
        let dbl_inst = unit.values[dbl].as_inst().unwrap();
        // `sum` is used twice by `dbl`: the use list counts both edges.
        assert_eq!(unit.values[sum].uses, vec![dbl_inst, dbl_inst]);
        assert_eq!(unit.values[one].uses, vec![sum_inst]);
        for (inst, data) in unit.insts.iter() {
            for &op in &data.operands {
                assert!(unit.values[op].uses.iter().any(|&u| u == inst));
            }
        }
    }

    #[test]
    fn branches_maintain_cfg_multisets() {
        let (mut ctx, mut unit) = simple_unit();
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("g", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        let out = b.create_block("out");
        b.position_at_end(entry);
        let cond = b.arg(0);
        // Both edges to the same target count twice.
        b.create_cond_br(out, out, cond);
        b.position_at_end(out);
        b.create_ret(Some(cond));

        assert_eq!(unit.blocks[entry].succs, vec![out, out]);
        assert_eq!(unit.blocks[out].preds, vec![entry, entry]);
    }

    #[test]
    fn replace_all_uses_algebra() {
        let (mut ctx, mut unit) = simple_unit();
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t, i32t], false);
        let func = unit.get_or_insert_function("h", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        b.position_at_end(entry);
        let x = b.arg(0);
        let y = b.arg(1);
        let sum = b.create_add(x, x);
        b.create_ret(Some(sum));

        // Replacing x with itself is a no-op.
        let uses_before = unit.values[x].uses.clone();
        unit.replace_all_uses(x, x);
        assert_eq!(unit.values[x].uses, uses_before);

        // x → y moves both edges.
        unit.replace_all_uses(x, y);
        assert!(unit.values[x].uses.is_empty());
        let sum_inst = unit.values[sum].as_inst().unwrap();
        assert_eq!(unit.insts[sum_inst].operands.as_slice(), &[y, y]);
    }

    #[test]
    fn split_block_reroutes_uses() {
        let (mut ctx, mut unit) = simple_unit();
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("s", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        b.position_at_end(entry);
        let arg = b.arg(0);
        let a = b.create_add(arg, arg);
        let doubled = b.create_add(a, a);
        let ret = b.create_ret(Some(doubled));
        let split_at = unit.values[a].as_inst().unwrap();

        let tail = unit.split_block(entry, split_at);

        // The split point stays in the head, which loses its terminator.
        assert_eq!(unit.blocks[entry].insts, vec![split_at]);
        // The tail owns clones of the strictly-following instructions.
        assert_eq!(unit.blocks[tail].insts.len(), 2);
        assert!(!unit.blocks[tail].insts.contains(&ret));
        // The cloned result took over the old result's uses.
        let new_ret = *unit.blocks[tail].insts.last().unwrap();
        let returned = unit.insts[new_ret].operands[0];
        assert_ne!(returned, doubled);
        assert!(unit.values[doubled].uses.is_empty());
    }

    #[test]
    fn remove_inst_detaches_edges() {
        let (mut ctx, mut unit) = simple_unit();
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![], false);
        let func = unit.get_or_insert_function("k", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        let next = b.create_block("next");
        b.position_at_end(entry);
        let br = b.create_br(next);
        unit.remove_inst(br);
        assert!(unit.blocks[entry].succs.is_empty());
        assert!(unit.blocks[next].preds.is_empty());
        assert!(unit.blocks[entry].insts.is_empty());
    }
}
