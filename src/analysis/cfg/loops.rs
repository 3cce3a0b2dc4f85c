//! Natural loops and the loop nest forest.
//!
//! # Loop Structure
//!
//! A loop in simplified form has the following shape:
//!
//! ```text
//!     [guard]?        <- optional branch that skips the loop entirely
//!        |
//!     [preheader]     <- single out-of-loop predecessor of the header
//!          |
//!          v
//!     [header] <------+  <- single entry point, dominates all loop blocks
//!          |          |
//!          v          |
//!     [body ...]      |
//!          |          |
//!          v          |
//!     [latch] --------+  <- single back edge source
//!          |
//!          v
//!     [exit]             <- dedicated: every predecessor is inside the loop
//! ```
//!
//! A loop is **rotated** when its latch is also its exiting block (the
//! do-while shape). Guards are only recognized on rotated loops.
//!
//! # Structural Queries
//!
//! [`LoopInfo`] caches only the loop's identity, header, blocks and nesting.
//! Preheader, latch, exiting and exit blocks are derived from the
//! [`Function`] on demand, so they stay correct while fusion rewrites edges.
//!
//! # Mutation
//!
//! The forest is updated in place when two loops are fused:
//! [`LoopForest::merge_loops`] moves every block and child loop of the erased
//! loop into the survivor, and [`LoopForest::remove_block`] drops blocks that
//! were deleted from the function. [`LoopForest::verify`] re-detects loops
//! from scratch and compares the result with the maintained forest.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use crate::{
    analysis::ssa::Function,
    utils::graph::{
        algorithms::{compute_dominators, DominatorTree},
        GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
    Error, Result,
};

/// Stable identifier of a loop within a [`LoopForest`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoopId(pub(crate) usize);

impl LoopId {
    /// Creates a loop id from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        LoopId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoopId({})", self.0)
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// One natural loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// Identity within the forest.
    pub id: LoopId,

    /// The header block (single entry point, dominates all loop blocks).
    pub header: NodeId,

    /// All blocks in the loop, nested loops included.
    pub body: BTreeSet<NodeId>,

    /// Enclosing loop, if nested.
    pub parent: Option<LoopId>,

    /// Immediately nested loops, in program order.
    pub children: Vec<LoopId>,

    erased: bool,
}

impl LoopInfo {
    /// Creates a loop containing only its header.
    #[must_use]
    pub fn new(id: LoopId, header: NodeId) -> Self {
        let mut body = BTreeSet::new();
        body.insert(header);
        Self {
            id,
            header,
            body,
            parent: None,
            children: Vec::new(),
            erased: false,
        }
    }

    /// Returns true if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Returns the number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns true once the loop has been erased from its forest.
    #[must_use]
    pub fn is_erased(&self) -> bool {
        self.erased
    }

    /// Returns true if this is an innermost loop (no children).
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true if this is an outermost loop (no parent).
    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.parent.is_none()
    }

    /// Blocks outside the loop branching into the header.
    #[must_use]
    pub fn entering_blocks(&self, func: &Function) -> Vec<NodeId> {
        func.predecessors_of(self.header)
            .into_iter()
            .filter(|pred| !self.contains(*pred))
            .collect()
    }

    /// The preheader: the unique entering block, provided the header is its
    /// only successor.
    #[must_use]
    pub fn preheader(&self, func: &Function) -> Option<NodeId> {
        match self.entering_blocks(func).as_slice() {
            [pred] if func.block(*pred)?.single_successor() == Some(self.header) => Some(*pred),
            _ => None,
        }
    }

    /// All back-edge sources.
    #[must_use]
    pub fn latches(&self, func: &Function) -> Vec<NodeId> {
        func.predecessors_of(self.header)
            .into_iter()
            .filter(|pred| self.contains(*pred))
            .collect()
    }

    /// The single latch, if there is exactly one.
    #[must_use]
    pub fn latch(&self, func: &Function) -> Option<NodeId> {
        match self.latches(func).as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }

    /// Exiting blocks: loop blocks with a successor outside the loop.
    #[must_use]
    pub fn exiting_blocks(&self, func: &Function) -> Vec<NodeId> {
        self.body
            .iter()
            .copied()
            .filter(|&block| func.successors(block).any(|succ| !self.contains(succ)))
            .collect()
    }

    /// The single exiting block, if there is exactly one.
    #[must_use]
    pub fn exiting_block(&self, func: &Function) -> Option<NodeId> {
        match self.exiting_blocks(func).as_slice() {
            [exiting] => Some(*exiting),
            _ => None,
        }
    }

    /// Distinct exit blocks, in id order.
    #[must_use]
    pub fn exit_blocks(&self, func: &Function) -> Vec<NodeId> {
        let exits: BTreeSet<NodeId> = self
            .body
            .iter()
            .flat_map(|&block| func.successors(block).collect::<Vec<_>>())
            .filter(|succ| !self.contains(*succ))
            .collect();
        exits.into_iter().collect()
    }

    /// The unique exit block, if all exiting edges lead to the same block.
    #[must_use]
    pub fn exit_block(&self, func: &Function) -> Option<NodeId> {
        match self.exit_blocks(func).as_slice() {
            [exit] => Some(*exit),
            _ => None,
        }
    }

    /// Returns true if every exit block is reached only from inside the loop.
    #[must_use]
    pub fn has_dedicated_exits(&self, func: &Function) -> bool {
        self.exit_blocks(func).into_iter().all(|exit| {
            func.predecessors_of(exit)
                .into_iter()
                .all(|pred| self.contains(pred))
        })
    }

    /// Returns true if the loop has a preheader, a single latch and dedicated
    /// exits.
    #[must_use]
    pub fn is_simplified(&self, func: &Function) -> bool {
        self.preheader(func).is_some()
            && self.latch(func).is_some()
            && self.has_dedicated_exits(func)
    }

    /// Returns true if `block` is an exiting block of this loop.
    #[must_use]
    pub fn is_exiting(&self, func: &Function, block: NodeId) -> bool {
        self.contains(block) && func.successors(block).any(|succ| !self.contains(succ))
    }

    /// Returns true if the latch is also an exiting block.
    #[must_use]
    pub fn is_rotated(&self, func: &Function) -> bool {
        self.latch(func)
            .is_some_and(|latch| self.is_exiting(func, latch))
    }

    /// Returns the block holding the loop's guard branch.
    ///
    /// A guard is a conditional branch that either enters the preheader or
    /// skips the loop to the block following its exit. It is recognized only
    /// for simplified, rotated loops with a unique exit block whose unique
    /// successor is the guard's other target.
    #[must_use]
    pub fn guard_block(&self, func: &Function) -> Option<NodeId> {
        if !self.is_simplified(func) || !self.is_rotated(func) {
            return None;
        }
        let exit = self.exit_block(func)?;
        let skip = func.block(exit)?.single_successor()?;
        let preheader = self.preheader(func)?;
        let guard = func.single_predecessor(preheader)?;
        let guard_block = func.block(guard)?;
        if !guard_block.ends_in_conditional_branch() {
            return None;
        }
        let other = match (guard_block.successor(0)?, guard_block.successor(1)?) {
            (first, second) if first == preheader => second,
            (first, _) => first,
        };
        (other == skip && other != preheader).then_some(guard)
    }
}

/// All loops of a function, arranged as a forest by nesting.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    /// Loops indexed by [`LoopId`]; erased loops keep their slot.
    loops: Vec<LoopInfo>,
    /// Innermost loop containing each block.
    block_to_loop: HashMap<NodeId, LoopId>,
}

impl LoopForest {
    /// Creates an empty forest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Detects the loops of `func`.
    #[must_use]
    pub fn analyze(func: &Function) -> Self {
        let dominators = compute_dominators(func, func.entry());
        detect_loops(func, &dominators)
    }

    /// Returns the live loop `id`.
    #[must_use]
    pub fn get(&self, id: LoopId) -> Option<&LoopInfo> {
        self.loops.get(id.index()).filter(|l| !l.erased)
    }

    /// Returns the live loop `id` or [`Error::InvalidLoop`].
    pub fn loop_checked(&self, id: LoopId) -> Result<&LoopInfo> {
        self.get(id).ok_or(Error::InvalidLoop(id))
    }

    fn loop_mut(&mut self, id: LoopId) -> Result<&mut LoopInfo> {
        self.loops
            .get_mut(id.index())
            .filter(|l| !l.erased)
            .ok_or(Error::InvalidLoop(id))
    }

    /// Returns true if `id` names a loop that was erased.
    #[must_use]
    pub fn is_erased(&self, id: LoopId) -> bool {
        self.loops.get(id.index()).is_none_or(|l| l.erased)
    }

    /// Iterates over live loops in id order.
    pub fn iter(&self) -> impl Iterator<Item = &LoopInfo> {
        self.loops.iter().filter(|l| !l.erased)
    }

    /// Number of live loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if there are no live loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outermost loops in program order.
    #[must_use]
    pub fn top_level(&self) -> Vec<LoopId> {
        let mut top: Vec<&LoopInfo> = self.iter().filter(|l| l.parent.is_none()).collect();
        top.sort_by_key(|l| l.header);
        top.into_iter().map(|l| l.id).collect()
    }

    /// Immediately nested loops of `id`.
    #[must_use]
    pub fn children(&self, id: LoopId) -> &[LoopId] {
        self.get(id).map_or(&[], |l| l.children.as_slice())
    }

    /// The innermost loop containing `block`.
    #[must_use]
    pub fn loop_for(&self, block: NodeId) -> Option<LoopId> {
        self.block_to_loop.get(&block).copied()
    }

    /// Nesting depth of `id`; outermost loops have depth 1.
    #[must_use]
    pub fn depth(&self, id: LoopId) -> usize {
        let mut depth = 0;
        let mut current = self.get(id);
        while let Some(l) = current {
            depth += 1;
            current = l.parent.and_then(|p| self.get(p));
        }
        depth
    }

    /// Loop depth of a block (0 if not in any loop).
    #[must_use]
    pub fn loop_depth(&self, block: NodeId) -> usize {
        self.loop_for(block).map_or(0, |l| self.depth(l))
    }

    /// Returns true if `outer` contains `inner` (a loop contains itself).
    #[must_use]
    pub fn contains_loop(&self, outer: LoopId, inner: LoopId) -> bool {
        let mut current = Some(inner);
        while let Some(id) = current {
            if id == outer {
                return true;
            }
            current = self.get(id).and_then(|l| l.parent);
        }
        false
    }

    /// Adds `block` to the block set of `id` only; enclosing loops are left
    /// untouched.
    pub fn add_block_entry(&mut self, id: LoopId, block: NodeId) -> Result<()> {
        self.loop_mut(id)?.body.insert(block);
        Ok(())
    }

    /// Sets the innermost loop of `block`, or clears it with `None`.
    pub fn change_loop_for(&mut self, block: NodeId, id: Option<LoopId>) {
        match id {
            Some(id) => self.block_to_loop.insert(block, id),
            None => self.block_to_loop.remove(&block),
        };
    }

    /// Removes `block` from every loop.
    pub fn remove_block(&mut self, block: NodeId) {
        for l in &mut self.loops {
            l.body.remove(&block);
        }
        self.block_to_loop.remove(&block);
    }

    /// Moves blocks and child loops of `erased` into `survivor` and erases
    /// `erased`.
    ///
    /// Blocks whose innermost loop was `erased` now map to `survivor`; blocks
    /// of nested loops keep their innermost loop.
    pub fn merge_loops(&mut self, survivor: LoopId, erased: LoopId) -> Result<()> {
        if survivor == erased {
            return Err(malformed_error!("cannot merge {} into itself", survivor));
        }
        let (blocks, children) = {
            let gone = self.loop_checked(erased)?;
            (gone.body.clone(), gone.children.clone())
        };
        self.loop_checked(survivor)?;

        for &block in &blocks {
            self.add_block_entry(survivor, block)?;
            if self.loop_for(block) == Some(erased) {
                self.change_loop_for(block, Some(survivor));
            }
        }

        for child in children {
            self.loop_mut(child)?.parent = Some(survivor);
            self.loop_mut(survivor)?.children.push(child);
        }
        self.loop_mut(erased)?.children.clear();

        self.erase(erased)
    }

    /// Erases loop `id`, unlinking it from its parent.
    ///
    /// The loop must have no children left.
    pub fn erase(&mut self, id: LoopId) -> Result<()> {
        let target = self.loop_checked(id)?;
        if !target.children.is_empty() {
            return Err(malformed_error!("{} still has nested loops", id));
        }
        let parent = target.parent;
        if let Some(parent) = parent {
            self.loop_mut(parent)?.children.retain(|&c| c != id);
        }
        match parent {
            Some(parent) => {
                for l in self.block_to_loop.values_mut() {
                    if *l == id {
                        *l = parent;
                    }
                }
            }
            None => self.block_to_loop.retain(|_, l| *l != id),
        }
        let target = self.loop_mut(id)?;
        target.erased = true;
        target.body.clear();
        target.parent = None;
        Ok(())
    }

    /// Re-detects the loops of `func` and checks that the maintained forest
    /// describes the same loops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] on the first mismatch.
    pub fn verify(&self, func: &Function) -> Result<()> {
        let fresh = Self::analyze(func);

        let shape = |forest: &LoopForest| {
            let mut loops: Vec<(NodeId, Vec<NodeId>, Option<NodeId>)> = forest
                .iter()
                .map(|l| {
                    let parent = l.parent.and_then(|p| forest.get(p)).map(|p| p.header);
                    (l.header, l.body.iter().copied().collect(), parent)
                })
                .collect();
            loops.sort();
            loops
        };

        let expected = shape(&fresh);
        let actual = shape(self);
        if expected != actual {
            return Err(Error::Verification(format!(
                "loop forest is stale: expected {expected:?}, found {actual:?}"
            )));
        }

        for block in func.node_ids() {
            let expected = fresh.loop_for(block).map(|l| fresh.loops[l.index()].header);
            let actual = self.loop_for(block).and_then(|l| self.get(l)).map(|l| l.header);
            if expected != actual {
                return Err(Error::Verification(format!(
                    "innermost loop of {block} is stale"
                )));
            }
        }
        Ok(())
    }
}

/// Detects all natural loops in a graph using dominance-based back edge
/// detection.
///
/// # Algorithm
///
/// 1. Finds back edges using dominance (n → h where h dominates n)
/// 2. For each back edge, computes the natural loop body
/// 3. Establishes nesting relationships
///
/// Loop ids are assigned in header order, so sibling loops are numbered in
/// program order.
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: GraphBase + Successors + Predecessors,
{
    let mut bodies: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();

    for node in graph.node_ids() {
        if !dominators.is_reachable(node) {
            continue;
        }
        for succ in graph.successors(node) {
            if dominators.dominates(succ, node) {
                let body = bodies
                    .entry(succ)
                    .or_insert_with(|| BTreeSet::from([succ]));
                expand_loop_body(graph, body, succ, node);
            }
        }
    }

    let mut headers: Vec<NodeId> = bodies.keys().copied().collect();
    headers.sort();

    let mut loops: Vec<LoopInfo> = headers
        .iter()
        .enumerate()
        .map(|(index, &header)| {
            let mut info = LoopInfo::new(LoopId::new(index), header);
            if let Some(body) = bodies.remove(&header) {
                info.body = body;
            }
            info
        })
        .collect();

    compute_nesting(&mut loops);

    let mut forest = LoopForest {
        loops,
        block_to_loop: HashMap::new(),
    };
    for l in &forest.loops {
        for &block in &l.body {
            let deeper = match forest.block_to_loop.get(&block) {
                Some(existing) => forest.loops[existing.index()].size() > l.size(),
                None => true,
            };
            if deeper {
                forest.block_to_loop.insert(block, l.id);
            }
        }
    }
    forest
}

/// Expands the loop body to include all nodes that can reach the latch
/// without passing through the header.
fn expand_loop_body<G>(graph: &G, body: &mut BTreeSet<NodeId>, header: NodeId, latch: NodeId)
where
    G: Predecessors,
{
    let mut worklist = vec![latch];

    while let Some(node) = worklist.pop() {
        if node == header || !body.insert(node) {
            continue;
        }
        for pred in graph.predecessors(node) {
            if pred != header && !body.contains(&pred) {
                worklist.push(pred);
            }
        }
    }
}

/// Computes parent/child links; the parent is the smallest enclosing loop.
fn compute_nesting(loops: &mut [LoopInfo]) {
    let n = loops.len();

    for i in 0..n {
        let header = loops[i].header;
        let parent = (0..n)
            .filter(|&j| j != i && loops[j].contains(header))
            .min_by_key(|&j| loops[j].size());
        loops[i].parent = parent.map(|j| loops[j].id);
    }

    for i in 0..n {
        if let Some(parent) = loops[i].parent {
            let child = loops[i].id;
            loops[parent.index()].children.push(child);
        }
    }
}
