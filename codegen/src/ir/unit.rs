//! Translation units.
//!
//! A [`Unit`] owns the arenas for every IR entity: values, instructions,
//! blocks, functions, globals and external symbols. All mutation of use-def
//! chains and CFG edges goes through the unit so the two stay consistent:
//! for every instruction `I` and operand `O`, `I ∈ uses(O)` iff
//! `O ∈ operands(I)`, counted per edge.

use crate::context::Context;
use crate::dominator_tree::DominatorTree;
use crate::fx::FxHashMap;
use crate::ir::block::BlockData;
use crate::ir::entities::{Block, ExtSym, Func, Global, Inst, Value};
use crate::ir::function::{FunctionData, Linkage};
use crate::ir::instructions::{InstData, Opcode};
use crate::ir::types::Type;
use crate::ir::value::{ValueData, ValueKind};
use crate::loop_analysis::LoopForest;
use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

/// The kind of an external symbol.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ExtSymKind {
    /// An external function.
    Function,
    /// An external variable.
    Variable,
}

/// An external symbol referenced but not defined by the unit.
#[derive(Clone, Debug)]
pub struct ExtSymData {
    /// The symbol name.
    pub name: String,
    /// Function or variable.
    pub kind: ExtSymKind,
}

/// A global variable definition.
#[derive(Clone, Debug)]
pub struct GlobalData {
    /// The symbol name.
    pub name: String,
    /// The type of the stored value (not the address).
    pub ty: Type,
    /// The initializer; `None` for external declarations.
    pub init: Option<Value>,
    /// Symbol linkage.
    pub linkage: Linkage,
}

/// A translation unit.
pub struct Unit {
    /// The unit's name, used for diagnostics only.
    pub name: String,
    /// Value arena.
    pub values: PrimaryMap<Value, ValueData>,
    /// Instruction arena.
    pub insts: PrimaryMap<Inst, InstData>,
    /// Block arena.
    pub blocks: PrimaryMap<Block, BlockData>,
    /// Function arena.
    pub funcs: PrimaryMap<Func, FunctionData>,
    /// Global variable arena.
    pub globals: PrimaryMap<Global, GlobalData>,
    /// External symbol arena.
    pub ext_syms: PrimaryMap<ExtSym, ExtSymData>,

    symbols: FxHashMap<String, Value>,
    ext_sym_names: FxHashMap<String, ExtSym>,
    int_consts: FxHashMap<(Type, i64), Value>,
    float_consts: FxHashMap<(Type, u64), Value>,
    string_consts: FxHashMap<String, Value>,
    undef_consts: FxHashMap<Type, Value>,
    null_consts: FxHashMap<Type, Value>,
}

impl Unit {
    /// Create an empty unit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            funcs: PrimaryMap::new(),
            globals: PrimaryMap::new(),
            ext_syms: PrimaryMap::new(),
            symbols: FxHashMap::default(),
            ext_sym_names: FxHashMap::default(),
            int_consts: FxHashMap::default(),
            float_consts: FxHashMap::default(),
            string_consts: FxHashMap::default(),
            undef_consts: FxHashMap::default(),
            null_consts: FxHashMap::default(),
        }
    }

    // ------------------------------------------------------------------
    // Functions, globals, symbols.

    /// Get the function named `name`, creating a declaration if missing.
    pub fn get_or_insert_function(
        &mut self,
        name: &str,
        ty: Type,
        linkage: Linkage,
    ) -> Func {
        if let Some(&val) = self.symbols.get(name) {
            if let ValueKind::Func(func) = self.values[val].kind {
                return func;
            }
            panic!("symbol {name} is not a function");
        }
        let func = self.funcs.push(FunctionData::new(name, ty, linkage));
        let val = self
            .values
            .push(ValueData::new(name, ty, ValueKind::Func(func)));
        self.funcs[func].value = Some(val).into();
        self.symbols.insert(name.to_string(), val);
        func
    }

    /// Define a global variable. `init == None` declares an external.
    pub fn get_or_insert_global(
        &mut self,
        ctx: &mut Context,
        name: &str,
        ty: Type,
        init: Option<Value>,
        linkage: Linkage,
    ) -> Global {
        if let Some(&val) = self.symbols.get(name) {
            if let ValueKind::GlobalVar(gv) = self.values[val].kind {
                return gv;
            }
            panic!("symbol {name} is not a global");
        }
        let gv = self.globals.push(GlobalData {
            name: name.to_string(),
            ty,
            init,
            linkage,
        });
        let ptr_ty = ctx.types.pointer(ty);
        let val = self
            .values
            .push(ValueData::new(name, ptr_ty, ValueKind::GlobalVar(gv)));
        self.symbols.insert(name.to_string(), val);
        if init.is_none() {
            self.get_or_insert_external(name, ExtSymKind::Variable);
        }
        gv
    }

    /// Register an external symbol by name.
    pub fn get_or_insert_external(&mut self, name: &str, kind: ExtSymKind) -> ExtSym {
        if let Some(&sym) = self.ext_sym_names.get(name) {
            return sym;
        }
        let sym = self.ext_syms.push(ExtSymData {
            name: name.to_string(),
            kind,
        });
        self.ext_sym_names.insert(name.to_string(), sym);
        sym
    }

    /// The value handle of a function.
    pub fn func_value(&self, func: Func) -> Value {
        self.funcs[func].value.expand().expect("function value")
    }

    /// The value handle of a global.
    pub fn global_value(&self, gv: Global) -> Value {
        let name = self.globals[gv].name.clone();
        self.symbols[&name]
    }

    /// The value wrapping `block` for use as a branch-target operand.
    ///
    /// Branch targets are untyped; block values carry the void type.
    pub fn block_value(&mut self, ctx: &Context, block: Block) -> Value {
        if let Some(val) = self.blocks[block].value.expand() {
            return val;
        }
        let name = self.blocks[block].name.clone();
        let ty = ctx.types.void();
        let val = self
            .values
            .push(ValueData::new(name, ty, ValueKind::Block(block)));
        self.blocks[block].value = Some(val).into();
        val
    }

    /// Resolve a block-target operand back to its block.
    pub fn value_block(&self, val: Value) -> Block {
        self.values[val].as_block().expect("block operand")
    }

    // ------------------------------------------------------------------
    // Constants. All getters intern: structurally equal requests return
    // identical handles.

    /// Get an integer constant of type `ty`.
    pub fn iconst(&mut self, ty: Type, value: i64) -> Value {
        if let Some(&v) = self.int_consts.get(&(ty, value)) {
            return v;
        }
        let v = self
            .values
            .push(ValueData::new("", ty, ValueKind::ConstInt(value)));
        self.int_consts.insert((ty, value), v);
        v
    }

    /// Get a float constant of type `ty`.
    pub fn fconst(&mut self, ty: Type, value: f64) -> Value {
        let bits = value.to_bits();
        if let Some(&v) = self.float_consts.get(&(ty, bits)) {
            return v;
        }
        let v = self
            .values
            .push(ValueData::new("", ty, ValueKind::ConstFloat(bits)));
        self.float_consts.insert((ty, bits), v);
        v
    }

    /// Get a string constant; typed as `[len + 1 x i8]` with implicit NUL.
    pub fn sconst(&mut self, ctx: &mut Context, value: &str) -> Value {
        if let Some(&v) = self.string_consts.get(value) {
            return v;
        }
        let i8_ty = ctx.types.int(8);
        let ty = ctx.types.array(i8_ty, value.len() as u32 + 1);
        let v = self.values.push(ValueData::new(
            "",
            ty,
            ValueKind::ConstString(value.to_string()),
        ));
        self.string_consts.insert(value.to_string(), v);
        v
    }

    /// Get a struct constant with one value per field.
    pub fn struct_const(&mut self, ty: Type, fields: Vec<Value>) -> Value {
        self.values
            .push(ValueData::new("", ty, ValueKind::ConstStruct(fields)))
    }

    /// Get an array constant with one value per element.
    pub fn array_const(&mut self, ty: Type, elements: Vec<Value>) -> Value {
        self.values
            .push(ValueData::new("", ty, ValueKind::ConstArray(elements)))
    }

    /// Get a constant GEP over a constant base.
    pub fn gep_const(&mut self, ty: Type, base: Value, indices: Vec<Value>) -> Value {
        self.values
            .push(ValueData::new("", ty, ValueKind::ConstGep { base, indices }))
    }

    /// Get the undef value of type `ty`.
    pub fn undef(&mut self, ty: Type) -> Value {
        if let Some(&v) = self.undef_consts.get(&ty) {
            return v;
        }
        let v = self.values.push(ValueData::new("", ty, ValueKind::Undef));
        self.undef_consts.insert(ty, v);
        v
    }

    /// Get the null value of type `ty`.
    pub fn null(&mut self, ty: Type) -> Value {
        if let Some(&v) = self.null_consts.get(&ty) {
            return v;
        }
        let v = self.values.push(ValueData::new("", ty, ValueKind::Null));
        self.null_consts.insert(ty, v);
        v
    }

    // ------------------------------------------------------------------
    // Use-def and CFG maintenance.

    /// Append `operand` to `inst`, recording the use.
    pub fn attach_operand(&mut self, inst: Inst, operand: Value) {
        self.insts[inst].operands.push(operand);
        self.values[operand].uses.push(inst);
    }

    /// Remove one occurrence of `operand` from `inst`, dropping the use.
    pub fn detach_operand(&mut self, inst: Inst, operand: Value) {
        let ops = &mut self.insts[inst].operands;
        if let Some(pos) = ops.iter().position(|&v| v == operand) {
            ops.remove(pos);
        }
        let uses = &mut self.values[operand].uses;
        if let Some(pos) = uses.iter().position(|&i| i == inst) {
            uses.swap_remove(pos);
        }
    }

    /// Append `inst` to `block`, running the opcode's insertion bookkeeping
    /// and auto-naming an anonymous result.
    pub fn append_inst(&mut self, block: Block, inst: Inst) {
        debug_assert!(self.insts[inst].block.is_none(), "instruction already placed");
        self.insts[inst].block = Some(block).into();
        self.blocks[block].insts.push(inst);
        self.on_add(block, inst);
    }

    fn on_add(&mut self, block: Block, inst: Inst) {
        let func = self.blocks[block].func.expand().expect("detached block");
        match self.insts[inst].opcode {
            Opcode::Jump | Opcode::Switch => {
                for target in self.branch_targets(inst) {
                    self.blocks[block].succs.push(target);
                    self.blocks[target].preds.push(block);
                }
                self.funcs[func].invalidate_cfg();
            }
            Opcode::Allocate => self.funcs[func].allocas.push(inst),
            _ => {}
        }
        if let Some(result) = self.insts[inst].result.expand() {
            if self.values[result].name.is_empty() {
                self.values[result].name = self.funcs[func].make_name();
            }
        }
    }

    fn before_remove(&mut self, inst: Inst) {
        let block = match self.insts[inst].block.expand() {
            Some(b) => b,
            None => return,
        };
        let func = self.blocks[block].func.expand().expect("detached block");
        match self.insts[inst].opcode {
            Opcode::Jump | Opcode::Switch => {
                for target in self.branch_targets(inst) {
                    self.blocks[block].remove_succ_edge(target);
                    self.blocks[target].remove_pred_edge(block);
                }
                self.funcs[func].invalidate_cfg();
            }
            Opcode::Allocate => {
                let allocas = &mut self.funcs[func].allocas;
                if let Some(pos) = allocas.iter().position(|&i| i == inst) {
                    allocas.swap_remove(pos);
                }
            }
            _ => {}
        }
    }

    /// The branch-target blocks of a terminator, one entry per edge.
    pub fn branch_targets(&self, inst: Inst) -> SmallVec<[Block; 2]> {
        let data = &self.insts[inst];
        let mut targets = SmallVec::new();
        match data.opcode {
            Opcode::Jump => {
                targets.push(self.value_block(data.operands[0]));
                if data.operands.len() > 1 {
                    targets.push(self.value_block(data.operands[1]));
                }
            }
            Opcode::Switch => {
                targets.push(self.value_block(data.operands[1]));
                for (_, block_val) in self.insts[inst].switch_cases() {
                    targets.push(self.values[block_val].as_block().expect("case target"));
                }
            }
            _ => {}
        }
        targets
    }

    /// Detach and discard `inst`: undo its bookkeeping, drop its uses and
    /// remove it from its block.
    pub fn remove_inst(&mut self, inst: Inst) {
        self.before_remove(inst);
        let operands: SmallVec<[Value; 4]> = self.insts[inst].operands.clone();
        for op in operands {
            self.detach_operand(inst, op);
        }
        if let Some(block) = self.insts[inst].block.expand() {
            let insts = &mut self.blocks[block].insts;
            if let Some(pos) = insts.iter().position(|&i| i == inst) {
                insts.remove(pos);
            }
        }
        self.insts[inst].block = None.into();
    }

    /// Replace every use of `old` with `new` across the containing unit.
    ///
    /// Branch-target operands transfer their predecessor/successor edges and
    /// mark the affected function's dominator tree dirty.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.values[old].uses);
        for &inst in &uses {
            for idx in 0..self.insts[inst].operands.len() {
                if self.insts[inst].operands[idx] == old {
                    self.insts[inst].operands[idx] = new;
                    self.values[new].uses.push(inst);
                    self.fixup_branch_edge(inst, old, new);
                }
            }
        }
    }

    fn fixup_branch_edge(&mut self, inst: Inst, old: Value, new: Value) {
        if !self.insts[inst].opcode.is_terminator() {
            return;
        }
        let (old_block, new_block) = match (
            self.values[old].as_block(),
            self.values[new].as_block(),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return,
        };
        let from = match self.insts[inst].block.expand() {
            Some(b) => b,
            None => return,
        };
        self.blocks[from].remove_succ_edge(old_block);
        self.blocks[from].succs.push(new_block);
        self.blocks[old_block].remove_pred_edge(from);
        self.blocks[new_block].preds.push(from);
        if let Some(func) = self.blocks[from].func.expand() {
            self.funcs[func].invalidate_cfg();
        }
    }

    /// Remove the `Phi` incoming pair whose block operand is `block`.
    pub fn phi_remove_incoming(&mut self, phi: Inst, block: Block) {
        debug_assert_eq!(self.insts[phi].opcode, Opcode::Phi);
        let block_val = self.blocks[block].value.expand();
        let ops = self.insts[phi].operands.clone();
        let mut idx = 0;
        while idx + 1 < ops.len() {
            if Some(ops[idx + 1]) == block_val {
                let val = ops[idx];
                let bval = ops[idx + 1];
                self.detach_operand(phi, bval);
                self.detach_operand(phi, val);
                return;
            }
            idx += 2;
        }
    }

    /// Split `block` after `at`: the instructions strictly following `at`
    /// move into a fresh block (deep-cloned, uses re-routed), and `block` is
    /// left ending at `at`, without a terminator, for the caller to close.
    pub fn split_block(&mut self, block: Block, at: Inst) -> Block {
        let func = self.blocks[block].func.expand().expect("detached block");
        let name = format!("{}.split", self.blocks[block].name);
        let new_block = self.blocks.push(BlockData::new(name, func));
        self.funcs[func].blocks.push(new_block);

        let pos = self.blocks[block]
            .insts
            .iter()
            .position(|&i| i == at)
            .expect("split point not in block");
        let tail: Vec<Inst> = self.blocks[block].insts[pos + 1..].to_vec();

        for &old_inst in &tail {
            let opcode = self.insts[old_inst].opcode;
            let ty = self.insts[old_inst].ty;
            let operands: SmallVec<[Value; 4]> = self.insts[old_inst].operands.clone();
            let new_inst = self.insts.push(InstData::new(opcode, ty));
            for op in operands {
                self.attach_operand(new_inst, op);
            }
            if let Some(old_result) = self.insts[old_inst].result.expand() {
                let rty = self.values[old_result].ty;
                let rname = self.values[old_result].name.clone();
                let new_result = self
                    .values
                    .push(ValueData::new(rname, rty, ValueKind::Inst(new_inst)));
                self.insts[new_inst].result = Some(new_result).into();
                self.append_inst(new_block, new_inst);
                self.replace_all_uses(old_result, new_result);
            } else {
                self.append_inst(new_block, new_inst);
            }
        }
        for &old_inst in tail.iter().rev() {
            self.remove_inst(old_inst);
        }
        new_block
    }

    // ------------------------------------------------------------------
    // Cached analyses.

    /// The dominator tree of `func`, recomputed if the CFG changed.
    pub fn domtree(&mut self, func: Func) -> &DominatorTree {
        if self.funcs[func].cfg_dirty || self.funcs[func].domtree.is_none() {
            let tree = DominatorTree::compute(self, func);
            let loops = LoopForest::compute(self, &tree);
            let f = &mut self.funcs[func];
            f.domtree = Some(tree);
            f.loops = Some(loops);
            f.cfg_dirty = false;
        }
        self.funcs[func].domtree.as_ref().unwrap()
    }

    /// The loop forest of `func`, recomputed if the CFG changed.
    pub fn loop_forest(&mut self, func: Func) -> &LoopForest {
        self.domtree(func);
        self.funcs[func].loops.as_ref().unwrap()
    }
}
