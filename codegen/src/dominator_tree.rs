//! Dominator tree computation.
//!
//! Uses the iterative algorithm of Cooper, Harvey and Kennedy: immediate
//! dominators are refined over the reverse postorder until they reach a
//! fixed point. Query cost for `dominates` is a walk up the idom chain,
//! which is plenty for the verifier and loop analysis.

use crate::fx::FxHashMap;
use crate::ir::entities::{Block, Func};
use crate::ir::unit::Unit;

/// The dominator tree of one function's CFG.
pub struct DominatorTree {
    idom: FxHashMap<Block, Block>,
    rpo_index: FxHashMap<Block, usize>,
    rpo: Vec<Block>,
}

impl DominatorTree {
    /// Compute the tree for `func`.
    pub fn compute(unit: &Unit, func: Func) -> Self {
        let entry = unit.funcs[func].entry_block();
        let rpo = reverse_postorder(unit, entry);
        let mut rpo_index = FxHashMap::default();
        for (i, &block) in rpo.iter().enumerate() {
            rpo_index.insert(block, i);
        }

        let mut idom: FxHashMap<Block, Block> = FxHashMap::default();
        idom.insert(entry, entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<Block> = None;
                for &pred in &unit.blocks[block].preds {
                    if !idom.contains_key(&pred) || !rpo_index.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(&idom, &rpo_index, pred, cur),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        Self {
            idom,
            rpo_index,
            rpo,
        }
    }

    /// The blocks of the function in reverse postorder. Unreachable blocks
    /// are not included.
    pub fn rpo(&self) -> &[Block] {
        &self.rpo
    }

    /// The immediate dominator of `block`; `None` for the entry and for
    /// unreachable blocks.
    pub fn idom(&self, block: Block) -> Option<Block> {
        match self.idom.get(&block) {
            Some(&parent) if parent != block => Some(parent),
            _ => None,
        }
    }

    /// Is `block` reachable from the entry?
    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo_index.contains_key(&block)
    }

    /// Does `a` dominate `b`? Every block dominates itself.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }
}

fn intersect(
    idom: &FxHashMap<Block, Block>,
    rpo_index: &FxHashMap<Block, usize>,
    a: Block,
    b: Block,
) -> Block {
    let mut a = a;
    let mut b = b;
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

fn reverse_postorder(unit: &Unit, entry: Block) -> Vec<Block> {
    let mut postorder = Vec::new();
    let mut visited = crate::fx::FxHashSet::default();
    // Explicit stack with an entry per (block, next successor to visit).
    let mut stack: Vec<(Block, usize)> = vec![(entry, 0)];
    visited.insert(entry);
    while let Some(&mut (block, ref mut next)) = stack.last_mut() {
        let succs = &unit.blocks[block].succs;
        if *next < succs.len() {
            let succ = succs[*next];
            *next += 1;
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }
    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::builder::Builder;
    use crate::ir::function::Linkage;

    #[test]
    fn diamond_dominance() {
        let mut ctx = Context::new();
        let mut unit = Unit::new("d");
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("f", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        let left = b.create_block("left");
        let right = b.create_block("right");
        let join = b.create_block("join");
        b.position_at_end(entry);
        let cond = b.arg(0);
        b.create_cond_br(left, right, cond);
        b.position_at_end(left);
        b.create_br(join);
        b.position_at_end(right);
        b.create_br(join);
        b.position_at_end(join);
        b.create_ret(Some(cond));

        let tree = DominatorTree::compute(&unit, func);
        assert!(tree.dominates(entry, join));
        assert!(tree.dominates(entry, left));
        assert!(!tree.dominates(left, join));
        assert!(!tree.dominates(join, left));
        assert_eq!(tree.idom(join), Some(entry));
        assert_eq!(tree.rpo()[0], entry);
    }
}
