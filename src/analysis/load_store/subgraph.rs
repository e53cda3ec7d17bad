//! Restricted reachability views of a method's control flow.
//!
//! An [`ExecutionSubgraph`] starts out as the whole graph. Removing a block
//! (because, for example, an object escapes there) also removes every edge
//! into it; pruning then drops each block that can no longer reach the exit
//! block through the remaining edges. What is left is the set of executions
//! that never touch a removed block.
//!
//! Removed blocks group into [`ExcludedCohort`]s, the connected components of
//! the removed set, each with its entry blocks (entered from outside) and
//! exit blocks (left towards outside).
//!
//! ```text
//!        entry
//!        /    \
//!     left    right     remove_block(right)      entry
//!        \    /        ------------------->        |
//!         exit                                   left
//!                                                  |
//!                                                 exit
//! ```
//!
//! Each block may filter at most [`MAX_FILTERABLE_SUCCESSORS`] successors;
//! graphs with wider branches cannot be analyzed and yield an invalid
//! subgraph.

use std::fmt;

use crate::{
    ir::{BlockId, Graph},
    utils::BitSet,
};

/// Largest successor count a block may have for its edges to be filtered.
pub const MAX_FILTERABLE_SUCCESSORS: usize = 8;

/// One bit per successor slot.
pub type SuccessorSet = u8;

const ALL_SUCCESSORS: SuccessorSet = SuccessorSet::MAX;

fn has_path(graph: &Graph, from: BlockId, to: BlockId) -> bool {
    !graph.path_between(from, to).is_empty()
}

/// A connected group of blocks excluded from an [`ExecutionSubgraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedCohort {
    blocks: BitSet,
    entry_blocks: BitSet,
    exit_blocks: BitSet,
}

impl ExcludedCohort {
    fn new(capacity: usize) -> Self {
        Self {
            blocks: BitSet::new(capacity),
            entry_blocks: BitSet::new(capacity),
            exit_blocks: BitSet::new(capacity),
        }
    }

    /// Iterates every block of the cohort.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().map(BlockId::new)
    }

    /// Iterates the blocks with a predecessor outside the cohort.
    pub fn entry_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.entry_blocks.iter().map(BlockId::new)
    }

    /// Iterates the blocks with a successor outside the cohort.
    pub fn exit_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.exit_blocks.iter().map(BlockId::new)
    }

    /// Returns `true` if `block` belongs to the cohort.
    #[must_use]
    pub fn contains_block(&self, block: BlockId) -> bool {
        self.blocks.contains(block.index())
    }

    /// Returns `true` if `block` lies outside the cohort and can reach one of
    /// its entry blocks, i.e. the cohort may execute after `block`.
    #[must_use]
    pub fn succeeds_block(&self, graph: &Graph, block: BlockId) -> bool {
        !self.contains_block(block) && self.entry_blocks().any(|entry| has_path(graph, block, entry))
    }

    /// Returns `true` if `block` lies outside the cohort and is reachable from
    /// one of its exit blocks, i.e. the cohort may execute before `block`.
    #[must_use]
    pub fn precedes_block(&self, graph: &Graph, block: BlockId) -> bool {
        !self.contains_block(block) && self.exit_blocks().any(|exit| has_path(graph, exit, block))
    }
}

impl fmt::Display for ExcludedCohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, ids: impl Iterator<Item = usize>) -> fmt::Result {
            f.write_str("[")?;
            for (position, id) in ids.enumerate() {
                if position > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{id}")?;
            }
            f.write_str("]")
        }

        f.write_str("{ entry: ")?;
        list(f, self.entry_blocks.iter())?;
        f.write_str(", interior: ")?;
        list(
            f,
            self.blocks
                .iter()
                .filter(|&b| !self.entry_blocks.contains(b) && !self.exit_blocks.contains(b)),
        )?;
        f.write_str(", exit: ")?;
        list(f, self.exit_blocks.iter())?;
        f.write_str("}")
    }
}

/// The part of a graph whose executions avoid a set of removed blocks.
#[derive(Debug, Clone)]
pub struct ExecutionSubgraph {
    allowed_successors: Vec<SuccessorSet>,
    unreachable_blocks: BitSet,
    excluded_cohorts: Vec<ExcludedCohort>,
    valid: bool,
    needs_prune: bool,
    finalized: bool,
}

/// Iterative depth-first walk state of [`ExecutionSubgraph::prune`].
struct PruneWalk {
    /// Successor slots known to lead to the exit, `None` for unvisited blocks.
    results: Vec<Option<SuccessorSet>>,
    /// Next successor slot to examine per block, `None` before the first.
    last_successor_seen: Vec<Option<usize>>,
    /// The blocks above the current one, outermost first.
    path: Vec<BlockId>,
    visiting: BitSet,
    current: Option<BlockId>,
}

/// Marks a block whose successors have all been examined.
const EXPLORED: usize = MAX_FILTERABLE_SUCCESSORS;

impl PruneWalk {
    fn push(&mut self, next: BlockId) {
        if let Some(current) = self.current {
            self.path.push(current);
            self.visiting.insert(current.index());
        }
        self.current = Some(next);
    }

    fn pop(&mut self) {
        self.current = self.path.pop();
        if let Some(parent) = self.current {
            self.visiting.remove(parent.index());
        }
    }

    /// Records that every edge on the current path leads to the exit.
    fn propagate_true(&mut self) {
        for block in &self.path {
            if let (Some(result), Some(slot)) =
                (&mut self.results[block.index()], self.last_successor_seen[block.index()])
            {
                *result |= 1 << slot;
            }
        }
    }
}

impl ExecutionSubgraph {
    /// Creates a subgraph covering all of `graph`.
    ///
    /// The subgraph starts invalid if some block has more successors than
    /// [`MAX_FILTERABLE_SUCCESSORS`].
    #[must_use]
    pub fn new(graph: &Graph) -> Self {
        let capacity = graph.block_capacity();
        Self {
            allowed_successors: vec![ALL_SUCCESSORS; capacity],
            unreachable_blocks: BitSet::new(capacity),
            excluded_cohorts: Vec::new(),
            valid: Self::can_analyse(graph),
            needs_prune: false,
            finalized: false,
        }
    }

    /// Returns `true` if every block's successors fit the filter width.
    #[must_use]
    pub fn can_analyse(graph: &Graph) -> bool {
        graph
            .block_ids()
            .all(|b| graph.block(b).successors().len() <= MAX_FILTERABLE_SUCCESSORS)
    }

    /// Marks the subgraph unusable.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Returns `true` if some execution through the subgraph reaches the exit.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns `true` if `block` is part of a valid subgraph.
    #[must_use]
    pub fn contains_block(&self, block: BlockId) -> bool {
        debug_assert!(!self.finalized || !self.needs_prune);
        self.valid && !self.unreachable_blocks.contains(block.index())
    }

    /// Excludes `block` and every edge into it.
    pub fn remove_block(&mut self, graph: &Graph, block: BlockId) {
        if !self.valid || !self.unreachable_blocks.insert(block.index()) {
            return;
        }
        for &pred in graph.block(block).predecessors() {
            let allowed = graph
                .block(pred)
                .successors()
                .iter()
                .enumerate()
                .filter(|&(_, &succ)| succ != block)
                .fold(0, |set: SuccessorSet, (slot, _)| set | (1 << slot));
            self.limit_block_successors(pred, allowed);
        }
    }

    /// Restricts the successor slots of `block` that executions may take.
    pub fn limit_block_successors(&mut self, block: BlockId, allowed: SuccessorSet) {
        self.needs_prune = true;
        if let Some(set) = self.allowed_successors.get_mut(block.index()) {
            *set &= allowed;
        }
    }

    /// Prunes, removes concavities and freezes the subgraph.
    pub fn finalize(&mut self, graph: &Graph) {
        self.prune(graph);
        self.remove_concavity(graph);
        self.finalized = true;
    }

    /// Iterates the excluded blocks.
    pub fn unreachable_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.unreachable_blocks.iter().map(BlockId::new)
    }

    /// Iterates the live blocks that are part of the subgraph.
    pub fn reachable_blocks<'a>(&'a self, graph: &'a Graph) -> impl Iterator<Item = BlockId> + 'a {
        graph.block_ids().filter(move |&b| self.contains_block(b))
    }

    /// Returns the connected groups of excluded blocks.
    #[must_use]
    pub fn excluded_cohorts(&self) -> &[ExcludedCohort] {
        debug_assert!(!self.valid || !self.needs_prune);
        if !self.valid || self.unreachable_blocks.is_empty() {
            &[]
        } else {
            &self.excluded_cohorts
        }
    }

    /// Drops every block that can no longer reach the exit block.
    ///
    /// The walk is an explicit-stack depth-first search over allowed edges.
    /// An edge back into a block on the current path counts as reaching the
    /// exit, so loops are kept whenever some block of the loop can leave it.
    pub fn prune(&mut self, graph: &Graph) {
        if !self.valid {
            return;
        }
        self.needs_prune = false;
        self.unreachable_blocks.clear();

        let Some(exit) = graph.exit_block() else {
            self.valid = false;
            return;
        };

        let capacity = graph.block_capacity();
        let entry = graph.entry_block();
        let mut walk = PruneWalk {
            results: vec![None; capacity],
            last_successor_seen: vec![None; capacity],
            path: Vec::with_capacity(capacity),
            visiting: BitSet::new(capacity),
            current: Some(entry),
        };
        walk.results[exit.index()] = Some(ALL_SUCCESSORS);

        let mut start_reaches_end = false;
        while let Some(block) = walk.current {
            let id = block.index();
            if block == exit {
                start_reaches_end = true;
                walk.propagate_true();
                walk.pop();
                continue;
            }
            if walk.last_successor_seen[id] == Some(EXPLORED) {
                if walk.results[id].is_some_and(|r| r != 0) {
                    walk.propagate_true();
                }
                walk.pop();
                continue;
            }
            if walk.results[id].is_none() {
                walk.results[id] = Some(0);
            }

            let allowed = self.allowed_successors[id];
            let mut slot = walk.last_successor_seen[id].map_or(0, |s| s + 1);
            while slot < MAX_FILTERABLE_SUCCESSORS && allowed & (1 << slot) == 0 {
                slot += 1;
            }
            let successors = graph.block(block).successors();
            if slot >= successors.len() {
                walk.last_successor_seen[id] = Some(EXPLORED);
                walk.pop();
                continue;
            }
            walk.last_successor_seen[id] = Some(slot);

            let next = successors[slot];
            if walk.visiting.contains(next.index()) || next == block {
                if let Some(result) = &mut walk.results[id] {
                    *result |= 1 << slot;
                }
                walk.propagate_true();
            } else {
                walk.push(next);
            }
        }

        if !start_reaches_end {
            self.valid = false;
            return;
        }

        for block in graph.block_ids() {
            if walk.results[block.index()].map_or(true, |r| r == 0) && block != entry {
                self.unreachable_blocks.insert(block.index());
            }
        }

        walk.results[exit.index()] = None;
        self.allowed_successors.fill(ALL_SUCCESSORS);
        for block in graph.block_ids() {
            if let Some(result) = walk.results[block.index()] {
                if result.count_ones() as usize != graph.block(block).successors().len() {
                    self.allowed_successors[block.index()] = result;
                }
            }
        }
        self.recalculate_excluded_cohorts(graph);
    }

    /// Also excludes every block that sits on a path between two excluded
    /// blocks, so each cohort is entered and left at most once per execution.
    pub fn remove_concavity(&mut self, graph: &Graph) {
        if !self.valid {
            return;
        }
        debug_assert!(!self.needs_prune);
        let initial = self.unreachable_blocks.clone();
        let blocks: Vec<BlockId> = graph.block_ids().collect();
        for block in blocks {
            if initial.contains(block.index()) {
                continue;
            }
            let between = initial.iter().map(BlockId::new).any(|before| has_path(graph, before, block))
                && initial.iter().map(BlockId::new).any(|after| has_path(graph, block, after));
            if between {
                self.remove_block(graph, block);
            }
        }
        self.prune(graph);
    }

    fn recalculate_excluded_cohorts(&mut self, graph: &Graph) {
        debug_assert!(!self.needs_prune);
        let capacity = graph.block_capacity();
        let mut cohorts = Vec::new();
        let mut unassigned = self.unreachable_blocks.clone();

        // Flood-fill over excluded blocks in both edge directions.
        while let Some(seed) = unassigned.highest() {
            let mut cohort = ExcludedCohort::new(capacity);
            let mut work = vec![BlockId::new(seed)];
            while let Some(block) = work.pop() {
                if !unassigned.remove(block.index()) {
                    continue;
                }
                cohort.blocks.insert(block.index());
                let node = graph.block(block);
                work.extend(node.predecessors().iter().copied());
                work.extend(node.successors().iter().copied());
            }
            cohorts.push(cohort);
        }

        for cohort in &mut cohorts {
            for index in cohort.blocks.iter().collect::<Vec<_>>() {
                let node = graph.block(BlockId::new(index));
                if node.predecessors().iter().any(|p| !cohort.blocks.contains(p.index())) {
                    cohort.entry_blocks.insert(index);
                }
                if node.successors().iter().any(|s| !cohort.blocks.contains(s.index())) {
                    cohort.exit_blocks.insert(index);
                }
            }
        }
        self.excluded_cohorts = cohorts;
    }
}
