//! The instruction-selection DAG.
//!
//! Each IR block becomes a graph rooted at a [`NodeKind::Root`] node. From
//! the root, a *chain* of side-effecting nodes is singly linked in program
//! order; every other node is a pure value node hanging off the chain
//! through operand edges. A chain node's `chain_index` records that it is
//! the k-th side effect of its block, which the emitter uses to preserve
//! program order when a value node's result is demanded early.

use crate::entity::entity_impl;
use crate::entity::PrimaryMap;
use crate::fx::FxHashMap;
use crate::ir;
use crate::ir::types::Type;
use crate::isa::CallConv;
use crate::mir::StackSlot;
use cranelift_entity::packed_option::PackedOption;
use smallvec::SmallVec;

/// An opaque reference to a DAG node.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(u32);
entity_impl!(Node, "node");

/// The operation of a DAG node.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)] // The arithmetic kinds mirror the IR opcodes 1:1.
pub enum NodeKind {
    /// The per-block root; head of the chain.
    Root,
    /// An integer constant value node.
    ConstantInt,
    /// A float constant value node.
    ConstantFloat,
    /// A fresh result register.
    Register,
    /// A symbolic stack slot address.
    FrameIndex,
    /// An incoming formal argument.
    FunctionArgument,
    /// The raw address of a global or function.
    GlobalValue,
    /// Return chain node.
    Ret,
    /// Load chain node.
    Load,
    /// Store chain node.
    Store,
    Add,
    Sub,
    ICmpEq,
    ICmpNe,
    ICmpGt,
    ICmpGe,
    ICmpLt,
    ICmpLe,
    UCmpGt,
    UCmpGe,
    UCmpLt,
    UCmpLe,
    FCmpEq,
    FCmpNe,
    FCmpGt,
    FCmpGe,
    FCmpLt,
    FCmpLe,
    /// Branch chain node: `[target]` or `[then, else, cond]`.
    Jump,
    /// φ chain node; operands are `[value, root]` pairs.
    Phi,
    /// Materialize a constant-pool value into a register.
    LoadConstant,
    /// Materialize a global's address into a register.
    LoadGlobal,
    /// Address arithmetic: `[ptr, indices...]`.
    Gep,
    /// Call chain node: `[callee, args...]`.
    Call,
    Zext,
    Sext,
    Trunc,
    Fptrunc,
    Fpext,
    Fptosi,
    Fptoui,
    Sitofp,
    Uitofp,
    ShiftLeft,
    LShiftRight,
    AShiftRight,
    And,
    Or,
    IDiv,
    UDiv,
    FDiv,
    IRem,
    URem,
    IMul,
    UMul,
    FMul,
    /// Switch chain node: `[cond, default, (case, root)...]`.
    Switch,
    /// A bundle of scalar results for struct-typed loads and calls.
    MultiValue,
    Xor,
    /// A bit-pattern-preserving cast; `bitcast`, `ptrtoint` and `inttoptr`
    /// all lower through this one kind.
    GenericCast,
    /// `va_start` chain node.
    VaStart,
    /// `va_end` chain node.
    VaEnd,
}

impl NodeKind {
    /// Is this one of the comparison kinds?
    pub fn is_cmp(self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            ICmpEq
                | ICmpNe
                | ICmpGt
                | ICmpGe
                | ICmpLt
                | ICmpLe
                | UCmpGt
                | UCmpGe
                | UCmpLt
                | UCmpLe
                | FCmpEq
                | FCmpNe
                | FCmpGt
                | FCmpGe
                | FCmpLt
                | FCmpLe
        )
    }
}

/// Kind-specific payload of a node.
#[derive(Clone, Debug)]
pub enum NodePayload {
    /// Nothing extra.
    None,
    /// Integer constant value.
    Imm(i64),
    /// Float constant bit pattern.
    Float(u64),
    /// Stack slot of a `FrameIndex`.
    Slot(StackSlot),
    /// Argument position of a `FunctionArgument`.
    Arg(u32),
    /// The unit value of a `GlobalValue` (a global variable or function).
    Global(ir::Value),
    /// Debug name of a `Register`.
    Name(String),
    /// Call-specific data.
    Call {
        /// The convention the call site follows.
        conv: CallConv,
        /// Whether the callee is vararg.
        vararg: bool,
        /// Whether any instruction consumes the result.
        result_used: bool,
    },
    /// The scalar lanes of a `MultiValue`.
    Values(SmallVec<[Node; 4]>),
    /// The IR block of a `Root`.
    Block(ir::Block),
}

/// A DAG node.
#[derive(Clone, Debug)]
pub struct NodeData {
    /// The operation.
    pub kind: NodeKind,
    /// The value type of value-producing nodes.
    pub ty: PackedOption<Type>,
    /// Operand edges.
    pub operands: SmallVec<[Node; 4]>,
    /// The result value node of instruction-like nodes.
    pub result: PackedOption<Node>,
    /// Position in the block's chain; zero for the root and value nodes.
    pub chain_index: u32,
    /// Next chain node, for chain nodes.
    pub next: PackedOption<Node>,
    /// Kind-specific payload.
    pub payload: NodePayload,
}

impl NodeData {
    /// Create a bare node of `kind`.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            ty: None.into(),
            operands: SmallVec::new(),
            result: None.into(),
            chain_index: 0,
            next: None.into(),
            payload: NodePayload::None,
        }
    }
}

/// The DAGs of one function, one root per IR block, sharing a node arena.
pub struct Dag {
    /// Node arena.
    pub nodes: PrimaryMap<Node, NodeData>,
    roots: FxHashMap<ir::Block, Node>,
}

impl Dag {
    /// Create an empty DAG.
    pub fn new() -> Self {
        Self {
            nodes: PrimaryMap::new(),
            roots: FxHashMap::default(),
        }
    }

    /// Add a node.
    pub fn push(&mut self, data: NodeData) -> Node {
        self.nodes.push(data)
    }

    /// Create the root for `block`. Roots are memoized.
    pub fn make_root(&mut self, block: ir::Block) -> Node {
        if let Some(&root) = self.roots.get(&block) {
            return root;
        }
        let mut data = NodeData::new(NodeKind::Root);
        data.payload = NodePayload::Block(block);
        let root = self.nodes.push(data);
        self.roots.insert(block, root);
        root
    }

    /// The root of `block`, if built.
    pub fn root_of(&self, block: ir::Block) -> Option<Node> {
        self.roots.get(&block).copied()
    }

    /// The IR block of a root node.
    pub fn root_block(&self, root: Node) -> ir::Block {
        match self.nodes[root].payload {
            NodePayload::Block(block) => block,
            _ => panic!("not a root node"),
        }
    }

    /// The kind of `node`.
    pub fn kind(&self, node: Node) -> NodeKind {
        self.nodes[node].kind
    }

    /// Walk `steps` links down the chain from `from`; `None` when the chain
    /// ends first (a cross-block reference whose index belongs to another
    /// block's chain).
    pub fn chain_at(&self, from: Node, steps: u32) -> Option<Node> {
        let mut current = from;
        for _ in 0..steps {
            current = self.nodes[current].next.expand()?;
        }
        Some(current)
    }

    /// Iterate the chain after `root`.
    pub fn chain_iter(&self, root: Node) -> ChainIter<'_> {
        ChainIter {
            dag: self,
            next: self.nodes[root].next.expand(),
        }
    }

    /// The scalar lanes of a `MultiValue` node.
    pub fn multi_values(&self, node: Node) -> &[Node] {
        match self.nodes[node].payload {
            NodePayload::Values(ref values) => values,
            _ => panic!("not a multi-value node"),
        }
    }

    /// Strip instruction nodes down to the value node that represents their
    /// result, and casts down to their operand when `through_casts` is set.
    ///
    /// Value nodes pass through unchanged.
    pub fn extract_value(&self, node: Node, through_casts: bool) -> Node {
        match self.kind(node) {
            NodeKind::Root
            | NodeKind::ConstantInt
            | NodeKind::ConstantFloat
            | NodeKind::Register
            | NodeKind::FrameIndex
            | NodeKind::FunctionArgument
            | NodeKind::GlobalValue
            | NodeKind::MultiValue => node,
            NodeKind::GenericCast => {
                if through_casts {
                    self.extract_value(self.nodes[node].operands[0], through_casts)
                } else {
                    self.nodes[node].result.expand().unwrap_or(node)
                }
            }
            _ => self.nodes[node].result.expand().unwrap_or(node),
        }
    }

    /// Is `node` a register-like value (register or argument)?
    pub fn is_register_like(&self, node: Node) -> bool {
        matches!(
            self.kind(node),
            NodeKind::Register | NodeKind::FunctionArgument
        )
    }
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a block's chain, excluding the root.
pub struct ChainIter<'a> {
    dag: &'a Dag,
    next: Option<Node>,
}

impl Iterator for ChainIter<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let current = self.next?;
        self.next = self.dag.nodes[current].next.expand();
        Some(current)
    }
}
