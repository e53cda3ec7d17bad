//! Loop discovery and the per-loop information kept on the graph.
//!
//! A back edge is a retreating edge of the depth-first walk from the entry
//! block, i.e. an edge into a block still on the walk stack. All back edges
//! into one header form one loop. A loop whose header does not dominate every
//! latch is irreducible; transformations that need natural-loop shape must
//! check [`LoopInformation::contains_irreducible_loop`] before touching it.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    ir::{BlockId, Graph, InstrId},
    utils::BitSet,
    Result,
};

/// Index of a loop in the graph's loop table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub(crate) u32);

impl LoopId {
    /// Returns the raw table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The peeling or unrolling decision attached to a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopTransformDecision {
    /// Leave the loop alone.
    #[default]
    None,
    /// Replace the loop by `trip_count` copies of its body.
    FullUnroll {
        /// Known iteration count.
        trip_count: u64,
    },
    /// Split off the first iteration.
    Peel,
    /// Replicate the body `factor` times per iteration.
    Unroll {
        /// Replication factor, at least 2.
        factor: u32,
    },
}

impl fmt::Display for LoopTransformDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::FullUnroll { trip_count } => write!(f, "full-unroll x{trip_count}"),
            Self::Peel => write!(f, "peel"),
            Self::Unroll { factor } => write!(f, "unroll x{factor}"),
        }
    }
}

/// Structural facts about one loop.
#[derive(Debug, Clone)]
pub struct LoopInformation {
    pub(crate) id: LoopId,
    pub(crate) header: BlockId,
    pub(crate) back_edges: Vec<BlockId>,
    pub(crate) blocks: BitSet,
    pub(crate) pre_header: Option<BlockId>,
    pub(crate) outer: Option<LoopId>,
    pub(crate) depth: u32,
    pub(crate) irreducible: bool,
    pub(crate) contains_irreducible: bool,
    pub(crate) decision: LoopTransformDecision,
}

impl LoopInformation {
    /// Returns the loop id.
    #[must_use]
    pub const fn id(&self) -> LoopId {
        self.id
    }

    /// Returns the header block.
    #[must_use]
    pub const fn header(&self) -> BlockId {
        self.header
    }

    /// Returns the sources of the back edges (the latches).
    #[must_use]
    pub fn back_edges(&self) -> &[BlockId] {
        &self.back_edges
    }

    /// Returns the body as a block bit set, header included.
    #[must_use]
    pub const fn blocks(&self) -> &BitSet {
        &self.blocks
    }

    /// Returns `true` if `block` is part of this loop or a nested one.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(block.index())
    }

    /// Returns the unique block entering the header from outside, if there is one.
    #[must_use]
    pub const fn pre_header(&self) -> Option<BlockId> {
        self.pre_header
    }

    /// Returns the enclosing loop.
    #[must_use]
    pub const fn outer(&self) -> Option<LoopId> {
        self.outer
    }

    /// Returns the nesting depth, 1 for outermost loops.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns `true` if the header does not dominate all latches.
    #[must_use]
    pub const fn is_irreducible(&self) -> bool {
        self.irreducible
    }

    /// Returns `true` if this loop or any loop nested in it is irreducible.
    #[must_use]
    pub const fn contains_irreducible_loop(&self) -> bool {
        self.contains_irreducible
    }

    /// Returns the transformation chosen for this loop.
    #[must_use]
    pub const fn decision(&self) -> LoopTransformDecision {
        self.decision
    }
}

impl Graph {
    /// Returns every loop, outer loops before the loops they contain.
    #[must_use]
    pub fn loops(&self) -> &[LoopInformation] {
        &self.loops
    }

    /// Returns the loop `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in the current loop table.
    #[must_use]
    pub fn loop_info(&self, id: LoopId) -> &LoopInformation {
        &self.loops[id.index()]
    }

    /// Returns the innermost loop containing `block`.
    #[must_use]
    pub fn loop_of(&self, block: BlockId) -> Option<&LoopInformation> {
        self.block(block).loop_id().map(|id| self.loop_info(id))
    }

    /// Records the transformation chosen for a loop. Returns `true` if it changed.
    pub fn set_loop_decision(&mut self, id: LoopId, decision: LoopTransformDecision) -> bool {
        let info = &mut self.loops[id.index()];
        let changed = info.decision != decision;
        info.decision = decision;
        changed
    }

    /// Returns `true` if the defining block of `instr` is inside `id`.
    #[must_use]
    pub fn is_defined_in_loop(&self, instr: InstrId, id: LoopId) -> bool {
        self.instr(instr)
            .block()
            .is_some_and(|b| self.loop_info(id).contains(b))
    }

    /// Returns `true` if no input of `instr` is defined inside loop `id`.
    #[must_use]
    pub fn inputs_defined_outside_loop(&self, instr: InstrId, id: LoopId) -> bool {
        self.instr(instr)
            .inputs()
            .iter()
            .all(|&input| !self.is_defined_in_loop(input, id))
    }

    /// Discovers loops. Relies on up-to-date ordering and dominators.
    pub(crate) fn analyze_loops(&mut self) -> Result<()> {
        let previous: FxHashMap<BlockId, LoopTransformDecision> = self
            .loops
            .iter()
            .map(|l| (l.header, l.decision))
            .collect();

        let capacity = self.block_capacity();
        let headers = self.find_back_edges();

        let mut found: Vec<LoopInformation> = Vec::with_capacity(headers.len());
        for (header, latches) in headers {
            let irreducible = latches.iter().any(|&latch| !self.dominates(header, latch));
            let blocks = self.loop_body(header, &latches, irreducible);
            let pre_header = {
                let mut outside = self
                    .block(header)
                    .predecessors()
                    .iter()
                    .filter(|p| !blocks.contains(p.index()));
                match (outside.next(), outside.next()) {
                    (Some(&only), None) => Some(only),
                    _ => None,
                }
            };
            found.push(LoopInformation {
                id: LoopId(0),
                header,
                back_edges: latches,
                blocks,
                pre_header,
                outer: None,
                depth: 1,
                irreducible,
                contains_irreducible: irreducible,
                decision: previous.get(&header).copied().unwrap_or_default(),
            });
        }

        // Outer loops first: a containing loop has strictly more blocks.
        found.sort_by_key(|l| std::cmp::Reverse(l.blocks.count()));
        for (index, info) in found.iter_mut().enumerate() {
            info.id = LoopId(index as u32);
        }

        for inner in 0..found.len() {
            let parent = (0..inner).rev().find(|&outer| {
                found[outer].blocks.count() > found[inner].blocks.count()
                    && found[inner].blocks.is_subset(&found[outer].blocks)
            });
            if let Some(parent) = parent {
                found[inner].outer = Some(LoopId(parent as u32));
                found[inner].depth = found[parent].depth + 1;
            }
        }
        for inner in (0..found.len()).rev() {
            if found[inner].contains_irreducible {
                if let Some(parent) = found[inner].outer {
                    found[parent.index()].contains_irreducible = true;
                }
            }
        }

        let mut innermost: Vec<Option<LoopId>> = vec![None; capacity];
        for info in &found {
            for block in &info.blocks {
                innermost[block] = Some(info.id);
            }
        }
        for block in self.blocks.iter_mut().flatten() {
            block.loop_id = innermost[block.id.index()];
        }

        self.loops = found;
        Ok(())
    }

    /// Groups the retreating edges of a depth-first walk by their target.
    fn find_back_edges(&self) -> Vec<(BlockId, Vec<BlockId>)> {
        let capacity = self.block_capacity();
        let mut visited = BitSet::new(capacity);
        let mut on_stack = BitSet::new(capacity);
        let mut by_header: Vec<(BlockId, Vec<BlockId>)> = Vec::new();

        let entry = self.entry_block();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry.index());
        on_stack.insert(entry.index());

        while let Some((block, next_succ)) = stack.pop() {
            if let Some(&succ) = self.block(block).successors().get(next_succ) {
                stack.push((block, next_succ + 1));
                if on_stack.contains(succ.index()) {
                    match by_header.iter_mut().find(|(h, _)| *h == succ) {
                        Some((_, latches)) => {
                            if !latches.contains(&block) {
                                latches.push(block);
                            }
                        }
                        None => by_header.push((succ, vec![block])),
                    }
                } else if visited.insert(succ.index()) {
                    on_stack.insert(succ.index());
                    stack.push((succ, 0));
                }
            } else {
                on_stack.remove(block.index());
            }
        }
        by_header
    }

    fn loop_body(&self, header: BlockId, latches: &[BlockId], irreducible: bool) -> BitSet {
        let capacity = self.block_capacity();
        let mut body = BitSet::new(capacity);
        body.insert(header.index());
        let mut work: Vec<BlockId> = Vec::new();
        for &latch in latches {
            if body.insert(latch.index()) {
                work.push(latch);
            }
        }
        while let Some(block) = work.pop() {
            for &pred in self.block(block).predecessors() {
                if self.is_reachable(pred) && body.insert(pred.index()) {
                    work.push(pred);
                }
            }
        }
        if irreducible {
            // The backward walk may leave the loop through a second entry;
            // keep only blocks that the header can also reach.
            let mut forward = BitSet::new(capacity);
            let mut work = vec![header];
            forward.insert(header.index());
            while let Some(block) = work.pop() {
                for &succ in self.block(block).successors() {
                    if body.contains(succ.index()) && forward.insert(succ.index()) {
                        work.push(succ);
                    }
                }
            }
            body.intersect_with(&forward);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(graph: &mut Graph, from: BlockId, to: BlockId) {
        graph.add_edge(from, to).unwrap();
    }

    #[test]
    fn nested_loops() {
        // entry -> h1 -> h2 -> body -> h2, h2 -> l1 -> h1, h1 -> exit
        let mut graph = Graph::new("nested");
        let entry = graph.entry_block();
        let h1 = graph.add_block();
        let h2 = graph.add_block();
        let body = graph.add_block();
        let l1 = graph.add_block();
        let exit = graph.add_block();
        edge(&mut graph, entry, h1);
        edge(&mut graph, h1, h2);
        edge(&mut graph, h1, exit);
        edge(&mut graph, h2, body);
        edge(&mut graph, h2, l1);
        edge(&mut graph, body, h2);
        edge(&mut graph, l1, h1);
        graph.rebuild_analyses().unwrap();

        assert_eq!(graph.loops().len(), 2);
        let outer = graph.loop_of(h1).unwrap();
        let inner = graph.loop_of(body).unwrap();
        assert_eq!(outer.header(), h1);
        assert_eq!(inner.header(), h2);
        assert_eq!(inner.outer(), Some(outer.id()));
        assert_eq!(inner.depth(), 2);
        assert_eq!(inner.pre_header(), Some(h1));
        assert_eq!(outer.pre_header(), Some(entry));
        assert!(outer.contains(body));
        assert!(!inner.contains(l1));
        assert!(graph.loop_of(exit).is_none());
        assert!(!outer.contains_irreducible_loop());
    }

    #[test]
    fn irreducible_loop_is_flagged() {
        // entry -> a, entry -> b, a <-> b
        let mut graph = Graph::new("irreducible");
        let entry = graph.entry_block();
        let a = graph.add_block();
        let b = graph.add_block();
        edge(&mut graph, entry, a);
        edge(&mut graph, entry, b);
        edge(&mut graph, a, b);
        edge(&mut graph, b, a);
        graph.rebuild_analyses().unwrap();

        assert_eq!(graph.loops().len(), 1);
        let info = &graph.loops()[0];
        assert!(info.is_irreducible());
        assert!(info.contains_irreducible_loop());
        assert!(!info.contains(entry));
    }

    #[test]
    fn decisions_survive_rebuild() {
        let mut graph = Graph::new("decision");
        let entry = graph.entry_block();
        let header = graph.add_block();
        let exit = graph.add_block();
        edge(&mut graph, entry, header);
        edge(&mut graph, header, header);
        edge(&mut graph, header, exit);
        graph.rebuild_analyses().unwrap();

        let id = graph.loops()[0].id();
        assert!(graph.set_loop_decision(id, LoopTransformDecision::Peel));
        assert!(!graph.set_loop_decision(id, LoopTransformDecision::Peel));
        graph.rebuild_analyses().unwrap();
        assert_eq!(graph.loops()[0].decision(), LoopTransformDecision::Peel);
    }
}
