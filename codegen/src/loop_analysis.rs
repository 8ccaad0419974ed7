//! Natural loop detection.
//!
//! Back edges are CFG edges whose target dominates their source. Each back
//! edge contributes a natural loop collected by walking predecessors
//! backward from the latch; nesting gives every block a loop depth, which
//! the register allocator uses to weight spill candidates.

use crate::dominator_tree::DominatorTree;
use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::entities::Block;
use crate::ir::unit::Unit;

/// One natural loop.
pub struct Loop {
    /// The loop header.
    pub header: Block,
    /// All blocks in the loop, header included.
    pub blocks: FxHashSet<Block>,
}

/// The loops of one function.
pub struct LoopForest {
    loops: Vec<Loop>,
    depth: FxHashMap<Block, u32>,
}

impl LoopForest {
    /// Find the loops of a function given its dominator tree.
    pub fn compute(unit: &Unit, domtree: &DominatorTree) -> Self {
        let mut loops: Vec<Loop> = Vec::new();
        for &block in domtree.rpo() {
            for &succ in &unit.blocks[block].succs {
                if !domtree.dominates(succ, block) {
                    continue;
                }
                // `block` → `succ` is a back edge with header `succ`.
                let mut body = FxHashSet::default();
                body.insert(succ);
                let mut stack = vec![block];
                while let Some(current) = stack.pop() {
                    if !body.insert(current) {
                        continue;
                    }
                    for &pred in &unit.blocks[current].preds {
                        if domtree.is_reachable(pred) {
                            stack.push(pred);
                        }
                    }
                }
                if let Some(existing) = loops.iter_mut().find(|l| l.header == succ) {
                    existing.blocks.extend(body);
                } else {
                    loops.push(Loop {
                        header: succ,
                        blocks: body,
                    });
                }
            }
        }

        let mut depth = FxHashMap::default();
        for l in &loops {
            for &block in &l.blocks {
                *depth.entry(block).or_insert(0) += 1;
            }
        }
        Self { loops, depth }
    }

    /// All detected loops.
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// The nesting depth of `block`; 0 outside any loop.
    pub fn depth(&self, block: Block) -> u32 {
        self.depth.get(&block).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::function::Linkage;

    #[test]
    fn simple_loop_depth() {
        let mut ctx = Context::new();
        let mut unit = Unit::new("l");
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("f", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        let header = b.create_block("header");
        let body = b.create_block("body");
        let exit = b.create_block("exit");
        b.position_at_end(entry);
        b.create_br(header);
        b.position_at_end(header);
        let cond = b.arg(0);
        b.create_cond_br(body, exit, cond);
        b.position_at_end(body);
        b.create_br(header);
        b.position_at_end(exit);
        b.create_ret(Some(cond));

        let tree = DominatorTree::compute(&unit, func);
        let forest = LoopForest::compute(&unit, &tree);
        assert_eq!(forest.loops().len(), 1);
        assert_eq!(forest.depth(header), 1);
        assert_eq!(forest.depth(body), 1);
        assert_eq!(forest.depth(entry), 0);
        assert_eq!(forest.depth(exit), 0);
    }
}
