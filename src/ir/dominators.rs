//! Block ordering and dominance.
//!
//! Reverse post-order comes from an iterative depth-first walk of the
//! successor edges starting at the entry block. Immediate dominators are
//! computed with the Cooper-Harvey-Kennedy iterative scheme over that order:
//!
//! ```text
//!   idom(entry) = entry
//!   repeat until stable, for b in RPO \ {entry}:
//!       idom(b) = fold(intersect, processed predecessors of b)
//! ```
//!
//! Blocks not reachable from the entry get no dominator and are dominated by
//! nothing but themselves.

use crate::{
    ir::{BlockId, Graph, InstrId},
    utils::BitSet,
    Result,
};

impl Graph {
    /// Recomputes ordering, dominance and loop information and marks the
    /// analyses valid.
    ///
    /// Loop transformation annotations survive for loops whose header is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the block table is inconsistent.
    pub fn rebuild_analyses(&mut self) -> Result<()> {
        self.compute_reverse_post_order();
        self.compute_dominators();
        self.analyze_loops()?;
        self.analyses_valid = true;
        Ok(())
    }

    /// Returns the reachable blocks in reverse post-order.
    ///
    /// Only meaningful while [`Graph::analyses_valid`] holds.
    #[must_use]
    pub fn reverse_post_order(&self) -> &[BlockId] {
        &self.reverse_post_order
    }

    /// Iterates the reachable blocks in post-order.
    pub fn post_order(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.reverse_post_order.iter().rev().copied()
    }

    /// Returns `true` if `block` was reachable at the last rebuild.
    #[must_use]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        block == self.entry_block() || self.get_block(block).is_some_and(|b| b.dominator.is_some())
    }

    fn compute_reverse_post_order(&mut self) {
        let mut visited = BitSet::new(self.block_capacity());
        let mut post_order = Vec::with_capacity(self.block_capacity());
        let entry = self.entry_block();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry.index());

        while let Some((block, next_succ)) = stack.pop() {
            let successors = self.block(block).successors();
            if let Some(&succ) = successors.get(next_succ) {
                stack.push((block, next_succ + 1));
                if visited.insert(succ.index()) {
                    stack.push((succ, 0));
                }
            } else {
                post_order.push(block);
            }
        }

        post_order.reverse();
        self.reverse_post_order = post_order;
    }

    fn compute_dominators(&mut self) {
        let capacity = self.block_capacity();
        let mut order = vec![usize::MAX; capacity];
        for (position, block) in self.reverse_post_order.iter().enumerate() {
            order[block.index()] = position;
        }

        let entry = self.entry_block();
        let mut idom: Vec<Option<BlockId>> = vec![None; capacity];
        idom[entry.index()] = Some(entry);

        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| -> BlockId {
            while a != b {
                while order[a.index()] > order[b.index()] {
                    a = idom[a.index()].unwrap_or(entry);
                }
                while order[b.index()] > order[a.index()] {
                    b = idom[b.index()].unwrap_or(entry);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &block in self.reverse_post_order.iter().skip(1) {
                let mut new_idom = None;
                for &pred in self.block(block).predecessors() {
                    if idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, pred, current),
                    });
                }
                if new_idom.is_some() && idom[block.index()] != new_idom {
                    idom[block.index()] = new_idom;
                    changed = true;
                }
            }
        }

        for slot in self.blocks.iter_mut().flatten() {
            slot.dominator = None;
            slot.dominated.clear();
        }
        for &block in self.reverse_post_order.iter().skip(1) {
            let Some(parent) = idom[block.index()] else {
                continue;
            };
            if let Some(Some(b)) = self.blocks.get_mut(block.index()) {
                b.dominator = Some(parent);
            }
            if let Some(Some(p)) = self.blocks.get_mut(parent.index()) {
                p.dominated.push(block);
            }
        }
    }

    /// Returns `true` if block `a` dominates block `b`. Every block dominates itself.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.get_block(current).and_then(|blk| blk.dominator) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Returns `true` if block `a` dominates block `b` and differs from it.
    #[must_use]
    pub fn strictly_dominates_block(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns `true` if instruction `a` executes before `b` on every path to `b`.
    ///
    /// Within a block, phis precede the body and body order decides. Two phis
    /// of the same block do not dominate each other.
    #[must_use]
    pub fn strictly_dominates(&self, a: InstrId, b: InstrId) -> bool {
        if a == b {
            return false;
        }
        let (ia, ib) = (self.instr(a), self.instr(b));
        let (Some(ba), Some(bb)) = (ia.block(), ib.block()) else {
            return false;
        };
        if ba != bb {
            return self.strictly_dominates_block(ba, bb);
        }
        match (ia.is_phi(), ib.is_phi()) {
            (true, true) | (false, true) => false,
            (true, false) => true,
            (false, false) => {
                let mut cursor = ia.next();
                while let Some(id) = cursor {
                    if id == b {
                        return true;
                    }
                    cursor = self.instr(id).next();
                }
                false
            }
        }
    }

    /// Returns the blocks on some path from `from` to `to`, both included.
    ///
    /// Empty when `to` is unreachable from `from`.
    #[must_use]
    pub fn path_between(&self, from: BlockId, to: BlockId) -> BitSet {
        let capacity = self.block_capacity();
        let forward = self.flood(from, capacity, |b| self.block(b).successors());
        let backward = self.flood(to, capacity, |b| self.block(b).predecessors());
        let mut on_path = forward;
        on_path.intersect_with(&backward);
        if !on_path.contains(from.index()) || !on_path.contains(to.index()) {
            on_path.clear();
        }
        on_path
    }

    fn flood<'a>(
        &'a self,
        start: BlockId,
        capacity: usize,
        edges: impl Fn(BlockId) -> &'a [BlockId],
    ) -> BitSet {
        let mut seen = BitSet::new(capacity);
        let mut work = vec![start];
        seen.insert(start.index());
        while let Some(block) = work.pop() {
            for &next in edges(block) {
                if seen.insert(next.index()) {
                    work.push(next);
                }
            }
        }
        seen
    }
}
