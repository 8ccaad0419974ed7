//! Pattern descriptions for instruction selection.
//!
//! A target publishes, for every [`NodeKind`], the list of patterns that can
//! cover such a node. A pattern pairs a matcher predicate with an emitter;
//! the selection engine picks the lowest-cost cover (see
//! [`crate::isel::select`]). Pattern tables are built once per target at
//! first use and live for the program's lifetime.

use crate::datalayout::DataLayout;
use crate::fx::FxHashMap;
use crate::ir::types::TypeStore;
use crate::isel::dag::{Dag, Node, NodeKind};
use crate::isel::select::Isel;
use crate::mir::{MirBlock, Operand};
use crate::passes::OptLevel;
use crate::result::CodegenResult;

/// Read-only state handed to matcher predicates.
pub struct MatchArgs<'a> {
    /// The function's DAG.
    pub dag: &'a Dag,
    /// The target's data layout.
    pub layout: &'a DataLayout,
    /// The type store.
    pub types: &'a TypeStore,
}

/// A matcher predicate: does this pattern apply to `node`?
pub type MatcherFn = fn(&MatchArgs, Node) -> bool;

/// An emitter: append machine instructions covering `node` to the block and
/// return the operand holding the node's result (`None` for void sinks).
pub type EmitterFn = fn(&mut Isel, Node, MirBlock) -> CodegenResult<Option<Operand>>;

/// One selectable pattern.
#[derive(Copy, Clone)]
pub struct Pattern {
    /// Matcher predicate.
    pub matcher: MatcherFn,
    /// Emitter.
    pub emitter: EmitterFn,
    /// Cost of the instructions this pattern emits itself.
    pub base_cost: u32,
    /// Operand indices whose subtrees the pattern consumes inline; their
    /// cost is not added to the total and they are never emitted separately.
    pub covered: &'static [usize],
    /// The lowest optimization level at which the pattern is considered.
    pub min_opt: OptLevel,
    /// Diagnostic name.
    pub name: &'static str,
}

impl Pattern {
    /// A pattern with default cost 10, no covered operands, available at O0.
    pub fn new(name: &'static str, matcher: MatcherFn, emitter: EmitterFn) -> Self {
        Self {
            matcher,
            emitter,
            base_cost: 10,
            covered: &[],
            min_opt: OptLevel::O0,
            name,
        }
    }

    /// Set the base cost.
    pub fn cost(mut self, cost: u32) -> Self {
        self.base_cost = cost;
        self
    }

    /// Declare covered operand indices.
    pub fn covers(mut self, covered: &'static [usize]) -> Self {
        self.covered = covered;
        self
    }

    /// Gate the pattern behind an optimization level.
    pub fn min_opt(mut self, level: OptLevel) -> Self {
        self.min_opt = level;
        self
    }
}

/// The per-target map from node kinds to candidate patterns.
#[derive(Default)]
pub struct PatternTable {
    map: FxHashMap<NodeKind, Vec<Pattern>>,
}

impl PatternTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pattern` for `kind`. Insertion order breaks cost ties.
    pub fn add(&mut self, kind: NodeKind, pattern: Pattern) {
        self.map.entry(kind).or_default().push(pattern);
    }

    /// Register `pattern` for several kinds at once.
    pub fn add_many(&mut self, kinds: &[NodeKind], pattern: Pattern) {
        for &kind in kinds {
            self.add(kind, pattern);
        }
    }

    /// The candidate patterns for `kind`.
    pub fn get(&self, kind: NodeKind) -> &[Pattern] {
        self.map.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}
