//! Pattern selection and emission.
//!
//! Selection walks each DAG bottom-up and picks, for every node, the
//! matching pattern with the lowest total cost: the pattern's own cost plus
//! the best cost of every child it does not cover. Results are memoized per
//! node; a sentinel entry breaks cycles through φ-nodes. Emission then runs
//! the chosen emitters in chain order, forcing not-yet-emitted chain
//! predecessors first so side effects keep program order.

use crate::context::Context;
use crate::datalayout::DataLayout;
use crate::fx::FxHashMap;
use crate::ir;
use crate::isa::{CallConv, InstructionInfo, RegisterInfo};
use crate::isel::dag::{Dag, Node, NodeKind};
use crate::isel::pattern::{MatchArgs, Pattern};
use crate::mir::{self, MirBlock, Operand, Reg};
use crate::passes::OptLevel;
use crate::result::{CodegenError, CodegenResult};

struct MatchResult {
    pattern: Option<&'static Pattern>,
    cost: u32,
}

/// The per-function instruction-selection engine.
///
/// Emitters receive this context: it carries the DAG, the machine function
/// being filled in, target tables, and the selection/emission memos.
pub struct Isel<'a> {
    /// The interning context.
    pub ctx: &'a mut Context,
    /// The DAG under selection.
    pub dag: &'a Dag,
    /// The machine function being emitted into.
    pub func: &'a mut mir::Function,
    /// The target's data layout.
    pub layout: &'a DataLayout,
    /// The target's register file.
    pub reg_info: &'static dyn RegisterInfo,
    /// The target's instruction tables.
    pub inst_info: &'static dyn InstructionInfo,
    /// The active optimization level; gates patterns.
    pub opt_level: OptLevel,
    /// The convention used for calls without an explicit one.
    pub default_cc: CallConv,

    best: FxHashMap<Node, MatchResult>,
    emitted: FxHashMap<Node, Option<Operand>>,
}

impl<'a> Isel<'a> {
    /// Create an engine over `dag` emitting into `func`.
    pub fn new(
        ctx: &'a mut Context,
        dag: &'a Dag,
        func: &'a mut mir::Function,
        layout: &'a DataLayout,
        reg_info: &'static dyn RegisterInfo,
        inst_info: &'static dyn InstructionInfo,
        opt_level: OptLevel,
        default_cc: CallConv,
    ) -> Self {
        Self {
            ctx,
            dag,
            func,
            layout,
            reg_info,
            inst_info,
            opt_level,
            default_cc,
            best: FxHashMap::default(),
            emitted: FxHashMap::default(),
        }
    }

    /// Select and emit every block of `blocks`, in order.
    pub fn run(&mut self, blocks: &[ir::Block]) -> CodegenResult<()> {
        for &ir_block in blocks {
            let root = self
                .dag
                .root_of(ir_block)
                .expect("DAG built for every block");
            let mir_block = self.mir_block(ir_block);
            let chain: Vec<Node> = self.dag.chain_iter(root).collect();
            for node in chain {
                self.select(node)?;
                self.emit_or_get(node, mir_block)?;
            }
        }
        Ok(())
    }

    /// The machine block lowered from `ir_block`.
    pub fn mir_block(&self, ir_block: ir::Block) -> MirBlock {
        self.func.ir_block_map[&ir_block]
    }

    /// Allocate a virtual register suitable for values of `ty`.
    pub fn vreg_for(&mut self, ty: crate::ir::types::Type) -> Reg {
        let class = self
            .reg_info
            .class_for_type(&self.ctx.types, self.layout, ty);
        self.func.new_vreg(class)
    }

    /// Append a machine instruction to `block`.
    pub fn push(&mut self, block: MirBlock, opcode: u32, ops: &[Operand]) -> mir::MirInst {
        self.func
            .push_inst(block, mir::InstData::new(opcode, ops.iter().copied()))
    }

    /// The value type of `node`.
    pub fn node_ty(&self, node: Node) -> crate::ir::types::Type {
        self.dag.nodes[node].ty.expand().expect("untyped node")
    }

    /// The size in bytes of `node`'s value.
    pub fn node_size(&self, node: Node) -> u64 {
        self.layout.size_of(&self.ctx.types, self.node_ty(node))
    }

    /// Is `node` float-typed?
    pub fn node_is_float(&self, node: Node) -> bool {
        self.ctx.types.is_float(self.node_ty(node))
    }

    /// Emit `node` and insist on a result operand.
    pub fn emit_value(&mut self, node: Node, block: MirBlock) -> CodegenResult<Operand> {
        self.emit_or_get(node, block)?.ok_or_else(|| {
            CodegenError::BadOperand(format!(
                "node kind {:?} produced no value",
                self.dag.kind(node)
            ))
        })
    }

    /// Emit `node` and insist on a register result.
    pub fn emit_reg(&mut self, node: Node, block: MirBlock) -> CodegenResult<Reg> {
        match self.emit_value(node, block)? {
            Operand::Reg(reg, _) => Ok(reg),
            other => Err(CodegenError::BadOperand(format!(
                "expected a register operand, found {other:?}"
            ))),
        }
    }

    /// Pick the lowest-cost pattern for `node`, recursing over children.
    pub fn select(&mut self, node: Node) -> CodegenResult<()> {
        if self.best.contains_key(&node) {
            return Ok(());
        }
        let kind = self.dag.kind(node);
        // Raw constants and globals are consumed inline by the patterns of
        // their `LoadConstant`/`LoadGlobal` parents.
        if matches!(kind, NodeKind::ConstantFloat | NodeKind::GlobalValue) {
            return Ok(());
        }
        if kind == NodeKind::MultiValue {
            let lanes: Vec<Node> = self.dag.multi_values(node).to_vec();
            for lane in lanes {
                self.select(lane)?;
            }
        }
        // Sentinel entry: breaks recursion cycles through φ operands.
        self.best.insert(
            node,
            MatchResult {
                pattern: None,
                cost: 0,
            },
        );

        let operands: Vec<Node> = self.dag.nodes[node].operands.iter().copied().collect();
        for op in operands {
            self.select(op)?;
        }
        if let Some(result) = self.dag.nodes[node].result.expand() {
            self.select(result)?;
        }

        let inst_info = self.inst_info;
        let patterns = inst_info.patterns(kind);
        if patterns.is_empty() {
            self.best.remove(&node);
            return Ok(());
        }

        let args = MatchArgs {
            dag: self.dag,
            layout: self.layout,
            types: &self.ctx.types,
        };
        let mut chosen: Option<MatchResult> = None;
        for pattern in patterns {
            if pattern.min_opt > self.opt_level {
                continue;
            }
            if !(pattern.matcher)(&args, node) {
                continue;
            }
            let mut cost = pattern.base_cost;
            for (idx, &child) in self.dag.nodes[node].operands.iter().enumerate() {
                if pattern.covered.contains(&idx) {
                    continue;
                }
                if let Some(child_best) = self.best.get(&child) {
                    cost += child_best.cost;
                }
            }
            let better = match chosen {
                None => true,
                Some(ref current) => {
                    let current_pattern = current.pattern.expect("chosen has pattern");
                    cost < current.cost
                        || (cost == current.cost
                            && pattern.base_cost < current_pattern.base_cost)
                }
            };
            if better {
                chosen = Some(MatchResult {
                    pattern: Some(pattern),
                    cost,
                });
            }
        }

        match chosen {
            Some(result) => {
                log::trace!(
                    "selected {} for {:?} (cost {})",
                    result.pattern.unwrap().name,
                    kind,
                    result.cost
                );
                self.best.insert(node, result);
                Ok(())
            }
            None => Err(CodegenError::Unsupported(format!(
                "no pattern matched node kind {kind:?}"
            ))),
        }
    }

    /// Emit `node` into `block` (memoized), returning its result operand.
    pub fn emit_or_get(&mut self, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
        if let Some(&op) = self.emitted.get(&node) {
            return Ok(op);
        }

        if self.is_instruction(node) {
            if let Some(result) = self.dag.nodes[node].result.expand() {
                // Memoize the result mapping early to stop recursion.
                let op = self.emit_or_get(result, block)?;
                self.emitted.insert(node, op);
            }
            // Side effects scheduled before this node must land first:
            // every chain node up to the node's chain index is emitted now
            // (already-emitted ones are memoized no-ops). A chain node's
            // own index points at itself and needs no forcing.
            let ir_block = self.blocks_ir(block);
            if let Some(root) = self.dag.root_of(ir_block) {
                let mut current = self.dag.nodes[root].next.expand();
                let mut remaining = self.dag.nodes[node].chain_index;
                while remaining > 0 {
                    let chain = match current {
                        Some(chain) if chain != node => chain,
                        _ => break,
                    };
                    self.select(chain)?;
                    self.emit_or_get(chain, block)?;
                    current = self.dag.nodes[chain].next.expand();
                    remaining -= 1;
                }
            }
        }

        let pattern = match self.best.get(&node) {
            Some(MatchResult {
                pattern: Some(pattern),
                ..
            }) => *pattern,
            _ => {
                return Err(CodegenError::Unsupported(format!(
                    "no pattern selected for node kind {:?}",
                    self.dag.kind(node)
                )))
            }
        };
        let result = (pattern.emitter)(self, node, block)?;
        self.emitted.insert(node, result);
        Ok(result)
    }

    fn blocks_ir(&self, block: MirBlock) -> ir::Block {
        self.func.blocks[block]
            .ir_block
            .expand()
            .expect("machine block has an IR origin")
    }

    fn is_instruction(&self, node: Node) -> bool {
        !matches!(
            self.dag.kind(node),
            NodeKind::ConstantInt
                | NodeKind::ConstantFloat
                | NodeKind::Register
                | NodeKind::FrameIndex
                | NodeKind::FunctionArgument
                | NodeKind::GlobalValue
                | NodeKind::MultiValue
        )
    }
}
