//! DAG construction from IR.
//!
//! Construction is two-pass per block. The *early chain* pass walks the
//! instructions in order and creates a chain node for every side-effecting
//! opcode, linking it after the running chain tail and assigning monotone
//! chain indices. The *patch* pass then fills in operand edges, building
//! pure value nodes lazily: constants materialize as constant nodes,
//! `Allocate` reserves a stack slot and produces a frame index, globals and
//! functions wrap in `LoadGlobal`, and `ExtractValue` resolves to one lane
//! of its aggregate's `MultiValue` at build time.

use crate::context::Context;
use crate::datalayout::DataLayout;
use crate::fx::FxHashMap;
use crate::ir;
use crate::ir::instructions::Opcode;
use crate::ir::types::{Type, TypeData};
use crate::ir::unit::Unit;
use crate::ir::value::ValueKind;
use crate::ir::Intrinsic;
use crate::isa::CallConv;
use crate::isel::dag::{Dag, Node, NodeData, NodeKind, NodePayload};
use crate::mir;
use crate::mir::StackSlot;
use crate::result::{CodegenError, CodegenResult};
use smallvec::SmallVec;

/// Builds the DAGs of one function.
pub struct DagBuilder<'a> {
    ctx: &'a mut Context,
    unit: &'a Unit,
    func: ir::Func,
    mfunc: &'a mut mir::Function,
    layout: &'a DataLayout,
    default_cc: CallConv,
    dag: Dag,
    values_to_nodes: FxHashMap<ir::Value, Node>,
    registers: FxHashMap<ir::Value, Node>,
    const_ints: FxHashMap<(i64, Type), Node>,
    const_floats: FxHashMap<(u64, Type), Node>,
    frame_indices: FxHashMap<StackSlot, Node>,
}

impl<'a> DagBuilder<'a> {
    /// Create a builder for `func`.
    pub fn new(
        ctx: &'a mut Context,
        unit: &'a Unit,
        func: ir::Func,
        mfunc: &'a mut mir::Function,
        layout: &'a DataLayout,
        default_cc: CallConv,
    ) -> Self {
        Self {
            ctx,
            unit,
            func,
            mfunc,
            layout,
            default_cc,
            dag: Dag::new(),
            values_to_nodes: FxHashMap::default(),
            registers: FxHashMap::default(),
            const_ints: FxHashMap::default(),
            const_floats: FxHashMap::default(),
            frame_indices: FxHashMap::default(),
        }
    }

    /// Build the DAG of every block and return it.
    pub fn build(mut self) -> CodegenResult<Dag> {
        let blocks = self.unit.funcs[self.func].blocks.clone();
        for &block in &blocks {
            let root = self.dag.make_root(block);
            if let Some(block_val) = self.unit.blocks[block].value.expand() {
                self.values_to_nodes.insert(block_val, root);
            }
        }
        for &block in &blocks {
            self.build_block(block)?;
        }
        Ok(self.dag)
    }

    fn build_block(&mut self, block: ir::Block) -> CodegenResult<()> {
        let root = self.dag.make_root(block);
        let mut chains: Vec<(ir::Inst, Node)> = Vec::new();
        let mut tail = root;
        let mut index = 0u32;
        let insts = self.unit.blocks[block].insts.clone();
        for inst in insts {
            if !is_chain(self.unit, inst) {
                continue;
            }
            index += 1;
            let chain = self.early_build_chain(inst)?;
            self.dag.nodes[chain].chain_index = index;
            self.dag.nodes[tail].next = Some(chain).into();
            chains.push((inst, chain));
            tail = chain;
        }
        for (inst, chain) in chains {
            self.patch_chain(inst, chain)?;
        }
        Ok(())
    }

    fn early_build_chain(&mut self, inst: ir::Inst) -> CodegenResult<Node> {
        let opcode = self.unit.insts[inst].opcode;
        let chain = match opcode {
            Opcode::Ret => self.dag.push(NodeData::new(NodeKind::Ret)),
            Opcode::Jump => self.dag.push(NodeData::new(NodeKind::Jump)),
            Opcode::Switch => self.dag.push(NodeData::new(NodeKind::Switch)),
            Opcode::Load => {
                let result = self.chain_result(inst)?;
                let mut data = NodeData::new(NodeKind::Load);
                data.result = Some(result).into();
                data.ty = Some(self.unit.insts[inst].ty).into();
                let node = self.dag.push(data);
                let result_val = self.inst_result(inst);
                self.values_to_nodes.insert(result_val, result);
                node
            }
            Opcode::Store => self.dag.push(NodeData::new(NodeKind::Store)),
            Opcode::Call => {
                if let Some(intrinsic) = self.callee_intrinsic(inst) {
                    let kind = match intrinsic {
                        Intrinsic::VaStart => NodeKind::VaStart,
                        Intrinsic::VaEnd => NodeKind::VaEnd,
                    };
                    self.dag.push(NodeData::new(kind))
                } else {
                    let result_val = self.inst_result(inst);
                    let used = !self.unit.values[result_val].uses.is_empty();
                    let ret_ty = self.unit.insts[inst].ty;
                    let result = if self.ctx.types.is_void(ret_ty) {
                        None
                    } else {
                        Some(self.chain_result(inst)?)
                    };
                    let mut data = NodeData::new(NodeKind::Call);
                    data.result = result.into();
                    data.ty = Some(ret_ty).into();
                    data.payload = NodePayload::Call {
                        conv: self.call_conv(inst),
                        vararg: self.callee_is_vararg(inst),
                        result_used: used,
                    };
                    let node = self.dag.push(data);
                    if let Some(result) = result {
                        self.values_to_nodes.insert(result_val, result);
                    }
                    node
                }
            }
            Opcode::Phi => {
                let result_val = self.inst_result(inst);
                let ty = self.unit.insts[inst].ty;
                let result = self.make_register(result_val, ty);
                let mut data = NodeData::new(NodeKind::Phi);
                data.result = Some(result).into();
                data.ty = Some(ty).into();
                let node = self.dag.push(data);
                self.values_to_nodes.insert(result_val, result);
                node
            }
            _ => {
                return Err(CodegenError::Unsupported(format!(
                    "opcode {} is not a chain operation",
                    opcode.name()
                )))
            }
        };
        Ok(chain)
    }

    /// The result node of a chain-class instruction: a register, or a
    /// `MultiValue` of registers for struct-typed loads and calls.
    fn chain_result(&mut self, inst: ir::Inst) -> CodegenResult<Node> {
        let ty = self.unit.insts[inst].ty;
        let result_val = self.inst_result(inst);
        if !self.ctx.types.is_struct(ty) {
            return Ok(self.make_register(result_val, ty));
        }
        let name = self.unit.values[result_val].name.clone();
        let mut lanes: SmallVec<[Node; 4]> = SmallVec::new();
        // Breadth-first over nested structs: top-level fields first, so an
        // `ExtractValue` index addresses the right lane.
        let mut worklist = vec![ty];
        while let Some(struct_ty) = worklist.pop() {
            let fields: Vec<Type> = self.ctx.types.struct_fields(struct_ty).to_vec();
            for (i, field) in fields.into_iter().enumerate() {
                let mut reg = NodeData::new(NodeKind::Register);
                reg.ty = Some(field).into();
                reg.payload = NodePayload::Name(format!("{name}_{i}"));
                let lane = self.dag.push(reg);
                lanes.push(lane);
                if self.ctx.types.is_struct(field) {
                    worklist.push(field);
                }
            }
        }
        let mut data = NodeData::new(NodeKind::MultiValue);
        data.ty = Some(ty).into();
        data.payload = NodePayload::Values(lanes);
        Ok(self.dag.push(data))
    }

    fn patch_chain(&mut self, inst: ir::Inst, chain: Node) -> CodegenResult<()> {
        match self.dag.kind(chain) {
            NodeKind::Ret => {
                if !self.unit.insts[inst].operands.is_empty() {
                    let value = self.build_non_chain(self.unit.insts[inst].operands[0])?;
                    self.dag.nodes[chain].operands.push(value);
                }
            }
            NodeKind::Jump => {
                let ops: SmallVec<[ir::Value; 4]> = self.unit.insts[inst].operands.clone();
                let first = self.build_non_chain(ops[0])?;
                self.dag.nodes[chain].operands.push(first);
                if ops.len() > 1 {
                    let second = self.build_non_chain(ops[1])?;
                    let cond = self.build_non_chain(ops[2])?;
                    self.dag.nodes[chain].operands.push(second);
                    self.dag.nodes[chain].operands.push(cond);
                }
            }
            NodeKind::Load => {
                let ptr = self.build_non_chain(self.unit.insts[inst].operands[0])?;
                self.dag.nodes[chain].operands.push(ptr);
            }
            NodeKind::Store => {
                let ptr = self.build_non_chain(self.unit.insts[inst].operands[0])?;
                let value = self.build_non_chain(self.unit.insts[inst].operands[1])?;
                self.dag.nodes[chain].operands.push(ptr);
                self.dag.nodes[chain].operands.push(value);
            }
            NodeKind::Call => {
                let callee = self.unit.insts[inst].callee();
                let callee_node = self.build_non_chain(callee)?;
                self.dag.nodes[chain].operands.push(callee_node);
                let args: Vec<ir::Value> = self.unit.insts[inst].call_args().to_vec();
                for arg in args {
                    let node = self.build_non_chain(arg)?;
                    self.dag.nodes[chain].operands.push(node);
                }
            }
            NodeKind::VaStart | NodeKind::VaEnd => {
                let list = self.unit.insts[inst].call_args()[0];
                let node = self.build_non_chain(list)?;
                self.dag.nodes[chain].operands.push(node);
            }
            NodeKind::Switch => {
                let cond = self.build_non_chain(self.unit.insts[inst].operands[0])?;
                let default = self.build_non_chain(self.unit.insts[inst].operands[1])?;
                self.dag.nodes[chain].operands.push(cond);
                self.dag.nodes[chain].operands.push(default);
                let cases: Vec<(ir::Value, ir::Value)> =
                    self.unit.insts[inst].switch_cases().collect();
                for (case_val, case_block) in cases {
                    let case_node = self.build_non_chain(case_val)?;
                    let block_node = self.build_non_chain(case_block)?;
                    self.dag.nodes[chain].operands.push(case_node);
                    self.dag.nodes[chain].operands.push(block_node);
                }
            }
            NodeKind::Phi => {
                let pairs: Vec<(ir::Value, ir::Value)> =
                    self.unit.insts[inst].phi_incomings().collect();
                for (value, block_val) in pairs {
                    let value_node = self.build_non_chain(value)?;
                    let block_node = self.build_non_chain(block_val)?;
                    self.dag.nodes[chain].operands.push(value_node);
                    self.dag.nodes[chain].operands.push(block_node);
                }
            }
            kind => {
                return Err(CodegenError::Unsupported(format!(
                    "cannot patch chain node {kind:?}"
                )))
            }
        }
        Ok(())
    }

    fn build_non_chain(&mut self, value: ir::Value) -> CodegenResult<Node> {
        if let Some(&node) = self.values_to_nodes.get(&value) {
            return Ok(node);
        }
        let ty = self.unit.values[value].ty;
        let node = match self.unit.values[value].kind {
            ValueKind::ConstInt(v) => self.make_const_int(v, ty),
            ValueKind::Null | ValueKind::Undef if !self.ctx.types.is_float(ty) => {
                // Zero-initialize scalars; aggregates have no register form.
                if self.ctx.types.is_struct(ty) || self.ctx.types.is_array(ty) {
                    return Err(CodegenError::Unsupported(
                        "aggregate undef/null operand".to_string(),
                    ));
                }
                self.make_const_int(0, ty)
            }
            ValueKind::Undef | ValueKind::Null => {
                let zero = self.make_const_float(0.0f64.to_bits(), ty);
                self.wrap_load_constant(value, zero, ty)
            }
            ValueKind::ConstFloat(bits) => {
                let constant = self.make_const_float(bits, ty);
                self.wrap_load_constant(value, constant, ty)
            }
            ValueKind::Arg { index, .. } => {
                if self.unit.values[value]
                    .flags
                    .contains(crate::ir::ValueFlags::BYVAL)
                {
                    self.byval_arg_slot(index, ty)
                } else {
                    let mut data = NodeData::new(NodeKind::FunctionArgument);
                    data.ty = Some(ty).into();
                    data.payload = NodePayload::Arg(index);
                    self.dag.push(data)
                }
            }
            ValueKind::GlobalVar(_) | ValueKind::Func(_) => {
                let mut global = NodeData::new(NodeKind::GlobalValue);
                global.ty = Some(ty).into();
                global.payload = NodePayload::Global(value);
                let global_node = self.dag.push(global);
                let result_val = value;
                let register = self.make_register(result_val, ty);
                let mut load = NodeData::new(NodeKind::LoadGlobal);
                load.ty = Some(ty).into();
                load.result = Some(register).into();
                load.operands.push(global_node);
                self.dag.push(load)
            }
            ValueKind::Inst(inst) => {
                let node = self.build_instruction(value, inst)?;
                self.values_to_nodes.insert(value, node);
                return Ok(node);
            }
            ValueKind::Block(block) => self.dag.make_root(block),
            ValueKind::ConstGep { base, ref indices } => {
                let indices = indices.clone();
                let offset = self.const_gep_offset(base, &indices)?;
                let base_node = self.build_non_chain(base)?;
                let i64_ty = self.ctx.types.int(64);
                let offset_node = self.make_const_int(offset as i64, i64_ty);
                let register = self.make_register(value, ty);
                let mut add = NodeData::new(NodeKind::Add);
                add.ty = Some(ty).into();
                add.result = Some(register).into();
                add.operands.push(base_node);
                add.operands.push(offset_node);
                self.dag.push(add)
            }
            ref kind => {
                return Err(CodegenError::Unsupported(format!(
                    "unsupported operand value kind {kind:?}"
                )))
            }
        };
        self.values_to_nodes.insert(value, node);
        Ok(node)
    }

    fn build_instruction(&mut self, value: ir::Value, inst: ir::Inst) -> CodegenResult<Node> {
        let data = &self.unit.insts[inst];
        let opcode = data.opcode;
        let ty = self.unit.values[value].ty;
        let block = data.block.expand().expect("detached instruction");
        let chain_index = chain_index_before(self.unit, block, inst);

        let node = match opcode {
            Opcode::Allocate => {
                let alloc_ty = self.unit.insts[inst].ty;
                let size = self.layout.size_of(&self.ctx.types, alloc_ty);
                let align = self.layout.align_of(&self.ctx.types, alloc_ty);
                let slot = self.mfunc.frame.push(size as u32, align as u32);
                self.frame_index(slot, ty)
            }
            // Chain-produced results: their registers were created by the
            // early pass of their own block; reaching here means a
            // cross-block use before that block was patched.
            Opcode::Call | Opcode::Phi | Opcode::Load => {
                let ty = self.unit.insts[inst].ty;
                self.make_register(value, ty)
            }
            Opcode::GetElementPtr => {
                let operands: SmallVec<[ir::Value; 4]> = data.operands.clone();
                let ptr = self.build_non_chain(operands[0])?;
                let register = self.make_register(value, ty);
                let mut gep = NodeData::new(NodeKind::Gep);
                gep.ty = Some(ty).into();
                gep.result = Some(register).into();
                gep.chain_index = chain_index;
                gep.operands.push(ptr);
                for &index in &operands[1..] {
                    let index_node = self.build_non_chain(index)?;
                    gep.operands.push(index_node);
                }
                self.dag.push(gep)
            }
            Opcode::ExtractValue => {
                let aggregate = data.operands[0];
                let index = self.unit.values[data.operands[1]]
                    .as_const_int()
                    .expect("constant extract index");
                let multi = self.build_non_chain(aggregate)?;
                if self.dag.kind(multi) != NodeKind::MultiValue {
                    return Err(CodegenError::BadOperand(
                        "extractvalue over a non-aggregate producer".to_string(),
                    ));
                }
                self.dag.multi_values(multi)[index as usize]
            }
            _ if opcode.is_cast() => {
                let kind = cast_node_kind(opcode);
                let operand = self.build_non_chain(data.operands[0])?;
                let register = self.make_register(value, ty);
                let mut cast = NodeData::new(kind);
                cast.ty = Some(ty).into();
                cast.result = Some(register).into();
                cast.chain_index = chain_index;
                cast.operands.push(operand);
                self.dag.push(cast)
            }
            _ => {
                let kind = binary_node_kind(opcode).ok_or_else(|| {
                    CodegenError::Unsupported(format!(
                        "cannot build DAG for opcode {}",
                        opcode.name()
                    ))
                })?;
                let operands: SmallVec<[ir::Value; 4]> = data.operands.clone();
                let lhs = self.build_non_chain(operands[0])?;
                let rhs = self.build_non_chain(operands[1])?;
                let register = self.make_register(value, ty);
                let mut bin = NodeData::new(kind);
                bin.ty = Some(ty).into();
                bin.result = Some(register).into();
                bin.chain_index = chain_index;
                bin.operands.push(lhs);
                bin.operands.push(rhs);
                self.dag.push(bin)
            }
        };
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Node interning helpers.

    fn make_register(&mut self, reference: ir::Value, ty: Type) -> Node {
        if let Some(&node) = self.registers.get(&reference) {
            return node;
        }
        let mut data = NodeData::new(NodeKind::Register);
        data.ty = Some(ty).into();
        data.payload = NodePayload::Name(self.unit.values[reference].name.clone());
        let node = self.dag.push(data);
        self.registers.insert(reference, node);
        node
    }

    fn make_const_int(&mut self, value: i64, ty: Type) -> Node {
        if let Some(&node) = self.const_ints.get(&(value, ty)) {
            return node;
        }
        let mut data = NodeData::new(NodeKind::ConstantInt);
        data.ty = Some(ty).into();
        data.payload = NodePayload::Imm(value);
        let node = self.dag.push(data);
        self.const_ints.insert((value, ty), node);
        node
    }

    fn make_const_float(&mut self, bits: u64, ty: Type) -> Node {
        if let Some(&node) = self.const_floats.get(&(bits, ty)) {
            return node;
        }
        let mut data = NodeData::new(NodeKind::ConstantFloat);
        data.ty = Some(ty).into();
        data.payload = NodePayload::Float(bits);
        let node = self.dag.push(data);
        self.const_floats.insert((bits, ty), node);
        node
    }

    fn wrap_load_constant(&mut self, value: ir::Value, constant: Node, ty: Type) -> Node {
        let register = self.make_register(value, ty);
        let mut load = NodeData::new(NodeKind::LoadConstant);
        load.ty = Some(ty).into();
        load.result = Some(register).into();
        load.operands.push(constant);
        self.dag.push(load)
    }

    fn frame_index(&mut self, slot: StackSlot, ty: Type) -> Node {
        if let Some(&node) = self.frame_indices.get(&slot) {
            return node;
        }
        let mut data = NodeData::new(NodeKind::FrameIndex);
        data.ty = Some(ty).into();
        data.payload = NodePayload::Slot(slot);
        let node = self.dag.push(data);
        self.frame_indices.insert(slot, node);
        node
    }

    fn byval_arg_slot(&mut self, index: u32, ty: Type) -> Node {
        let pointee = if self.ctx.types.is_pointer(ty) {
            self.ctx.types.pointee(ty)
        } else {
            ty
        };
        let size = self.layout.size_of(&self.ctx.types, pointee);
        let align = self.layout.align_of(&self.ctx.types, pointee);
        // The caller placed the aggregate just above the saved frame
        // pointer and return address (past any shadow space), after any
        // earlier by-value args.
        let shadow = crate::isa::callconv::call_conv_data(self.default_cc).shadow_bytes;
        let mut offset = -16i64 - shadow as i64;
        for i in 0..index as usize {
            let arg = self.unit.funcs[self.func].args[i];
            if !self.unit.values[arg]
                .flags
                .contains(crate::ir::ValueFlags::BYVAL)
            {
                continue;
            }
            let arg_ty = self.unit.values[arg].ty;
            let arg_pointee = if self.ctx.types.is_pointer(arg_ty) {
                self.ctx.types.pointee(arg_ty)
            } else {
                arg_ty
            };
            offset -= self.layout.size_of(&self.ctx.types, arg_pointee) as i64;
        }
        let slot = self.mfunc.frame.push_at(size as u32, offset, align as u32);
        self.frame_index(slot, ty)
    }

    fn const_gep_offset(
        &mut self,
        base: ir::Value,
        indices: &[ir::Value],
    ) -> CodegenResult<u64> {
        let mut ty = self.unit.values[base].ty;
        let mut offset = 0u64;
        for (pos, &index) in indices.iter().enumerate() {
            let idx = self.unit.values[index].as_const_int().ok_or_else(|| {
                CodegenError::BadOperand("constant gep index is not constant".to_string())
            })? as u64;
            match *self.ctx.types.data(ty) {
                TypeData::Pointer { pointee } if pos == 0 => {
                    offset += idx * self.layout.size_of(&self.ctx.types, pointee);
                    ty = pointee;
                }
                TypeData::Array { element, .. } => {
                    offset += idx * self.layout.size_of(&self.ctx.types, element);
                    ty = element;
                }
                TypeData::Struct { .. } => {
                    offset += self.layout.field_offset(&self.ctx.types, ty, idx as usize);
                    ty = self.ctx.types.struct_fields(ty)[idx as usize];
                }
                _ => {
                    return Err(CodegenError::BadOperand(
                        "constant gep through a non-aggregate".to_string(),
                    ))
                }
            }
        }
        Ok(offset)
    }

    // ------------------------------------------------------------------
    // IR queries.

    fn inst_result(&self, inst: ir::Inst) -> ir::Value {
        self.unit.insts[inst]
            .result
            .expand()
            .expect("instruction result")
    }

    fn callee_intrinsic(&self, inst: ir::Inst) -> Option<Intrinsic> {
        let callee = self.unit.insts[inst].callee();
        match self.unit.values[callee].kind {
            ValueKind::Func(func) => Intrinsic::from_name(&self.unit.funcs[func].name),
            _ => None,
        }
    }

    fn callee_is_vararg(&self, inst: ir::Inst) -> bool {
        let callee = self.unit.insts[inst].callee();
        let ty = self.unit.values[callee].ty;
        let fn_ty = if self.ctx.types.is_pointer(ty) {
            self.ctx.types.pointee(ty)
        } else {
            ty
        };
        self.ctx.types.is_vararg(fn_ty)
    }

    fn call_conv(&self, inst: ir::Inst) -> CallConv {
        let callee = self.unit.insts[inst].callee();
        if let ValueKind::Func(func) = self.unit.values[callee].kind {
            if let Some(cc) = self.unit.funcs[func].call_conv {
                return cc;
            }
        }
        self.default_cc
    }
}

/// Is `inst` one of the side-effecting, chain-class opcodes?
pub fn is_chain(unit: &Unit, inst: ir::Inst) -> bool {
    unit.insts[inst].opcode.has_side_effect()
}

fn chain_index_before(unit: &Unit, block: ir::Block, inst: ir::Inst) -> u32 {
    let mut index = 0;
    for &candidate in &unit.blocks[block].insts {
        if candidate == inst {
            break;
        }
        if is_chain(unit, candidate) {
            index += 1;
        }
    }
    index
}

fn cast_node_kind(opcode: Opcode) -> NodeKind {
    match opcode {
        Opcode::Zext => NodeKind::Zext,
        Opcode::Sext => NodeKind::Sext,
        Opcode::Trunc => NodeKind::Trunc,
        Opcode::Fptrunc => NodeKind::Fptrunc,
        Opcode::Fpext => NodeKind::Fpext,
        Opcode::Fptosi => NodeKind::Fptosi,
        Opcode::Fptoui => NodeKind::Fptoui,
        Opcode::Sitofp => NodeKind::Sitofp,
        Opcode::Uitofp => NodeKind::Uitofp,
        Opcode::Bitcast | Opcode::Ptrtoint | Opcode::Inttoptr => NodeKind::GenericCast,
        _ => unreachable!("not a cast opcode"),
    }
}

fn binary_node_kind(opcode: Opcode) -> Option<NodeKind> {
    Some(match opcode {
        Opcode::Add => NodeKind::Add,
        Opcode::Sub => NodeKind::Sub,
        Opcode::IMul => NodeKind::IMul,
        Opcode::UMul => NodeKind::UMul,
        Opcode::FMul => NodeKind::FMul,
        Opcode::IDiv => NodeKind::IDiv,
        Opcode::UDiv => NodeKind::UDiv,
        Opcode::FDiv => NodeKind::FDiv,
        Opcode::IRem => NodeKind::IRem,
        Opcode::URem => NodeKind::URem,
        Opcode::And => NodeKind::And,
        Opcode::Or => NodeKind::Or,
        Opcode::Xor => NodeKind::Xor,
        Opcode::Shl => NodeKind::ShiftLeft,
        Opcode::LShr => NodeKind::LShiftRight,
        Opcode::AShr => NodeKind::AShiftRight,
        Opcode::ICmpEq => NodeKind::ICmpEq,
        Opcode::ICmpNe => NodeKind::ICmpNe,
        Opcode::ICmpGt => NodeKind::ICmpGt,
        Opcode::ICmpGe => NodeKind::ICmpGe,
        Opcode::ICmpLt => NodeKind::ICmpLt,
        Opcode::ICmpLe => NodeKind::ICmpLe,
        Opcode::UCmpGt => NodeKind::UCmpGt,
        Opcode::UCmpGe => NodeKind::UCmpGe,
        Opcode::UCmpLt => NodeKind::UCmpLt,
        Opcode::UCmpLe => NodeKind::UCmpLe,
        Opcode::FCmpEq => NodeKind::FCmpEq,
        Opcode::FCmpNe => NodeKind::FCmpNe,
        Opcode::FCmpGt => NodeKind::FCmpGt,
        Opcode::FCmpGe => NodeKind::FCmpGe,
        Opcode::FCmpLt => NodeKind::FCmpLt,
        Opcode::FCmpLe => NodeKind::FCmpLe,
        _ => return None,
    })
}
