//! Dominator and post-dominator trees.
//!
//! A block `d` **dominates** `n` if every path from the entry to `n` passes
//! through `d`. A block `p` **post-dominates** `n` if every path from `n` to a
//! function exit passes through `p`. Loop fusion uses the pair of relations to
//! decide control-flow equivalence: two loop entries are equivalent when one
//! dominates the other and the other post-dominates the first.
//!
//! Both trees are computed with the Lengauer-Tarjan algorithm (with path
//! compression). Post-dominators run the same algorithm over the
//! [`Reversed`] view of the graph, whose entry is a virtual exit node linked to
//! every block without successors.
//!
//! Blocks that cannot be reached from the root (or, for post-dominance, that
//! cannot reach an exit) are outside the tree. Queries involving them answer
//! `false` unless both arguments are the same block.

use crate::utils::graph::{GraphBase, NodeId, Predecessors, Reversed, RootedGraph, Successors};

const UNDEFINED: NodeId = NodeId::new(usize::MAX);

/// Immediate-dominator tree of a rooted graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominatorTree {
    /// Root of the tree.
    entry: NodeId,
    /// Immediate dominator per node; the root maps to itself and unreachable
    /// nodes map to `UNDEFINED`.
    idom: Vec<NodeId>,
    /// Number of node slots covered.
    node_count: usize,
}

impl DominatorTree {
    /// Returns the root of the tree.
    #[inline]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the number of node slots covered by the tree.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Returns true if `node` was reached from the root.
    #[inline]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.idom
            .get(node.index())
            .is_some_and(|idom| *idom != UNDEFINED)
    }

    /// Returns the immediate dominator of `node`.
    ///
    /// `None` for the root and for unreachable nodes.
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry || !self.is_reachable(node) {
            None
        } else {
            Some(self.idom[node.index()])
        }
    }

    /// Checks if `a` dominates `b`. Every node dominates itself.
    ///
    /// O(depth of `b`).
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }

        let mut current = b;
        while current != self.entry {
            let idom = self.idom[current.index()];
            if idom == a {
                return true;
            }
            current = idom;
        }
        a == self.entry
    }

    /// Checks if `a` dominates `b` and `a != b`.
    #[inline]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Iterates from `node` up to the root, yielding every dominator of `node`
    /// (including itself).
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: self.is_reachable(node).then_some(node),
        }
    }

    /// Depth of `node` in the tree; the root has depth 0.
    pub fn depth(&self, node: NodeId) -> usize {
        self.dominators(node).count().saturating_sub(1)
    }

    /// Children of `node` in the tree.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        (0..self.node_count)
            .map(NodeId::new)
            .filter(|&n| n != self.entry && self.idom[n.index()] == node)
            .collect()
    }
}

/// Iterator over the dominators of a node, innermost first.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = if current == self.tree.entry {
            None
        } else {
            Some(self.tree.idom[current.index()])
        };
        Some(current)
    }
}

/// Post-dominator tree, rooted at a virtual exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDominatorTree {
    tree: DominatorTree,
}

impl PostDominatorTree {
    /// The virtual exit node; every block without successors flows into it.
    #[inline]
    pub fn virtual_exit(&self) -> NodeId {
        self.tree.entry
    }

    /// Checks if `a` post-dominates `b`. Every node post-dominates itself.
    pub fn post_dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.tree.dominates(a, b)
    }

    /// Returns the immediate post-dominator of `node`.
    ///
    /// `None` when the immediate post-dominator is the virtual exit, or the
    /// node cannot reach an exit.
    pub fn immediate_post_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .immediate_dominator(node)
            .filter(|&ipdom| ipdom != self.virtual_exit())
    }

    /// Returns true if `node` reaches a function exit.
    pub fn reaches_exit(&self, node: NodeId) -> bool {
        self.tree.is_reachable(node)
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
///
/// O(V α(V)) time, O(V) space.
///
/// # Examples
///
/// ```rust,ignore
/// // Diamond: entry -> {a, b} -> join
/// let dom_tree = compute_dominators(&graph, entry);
/// assert!(dom_tree.dominates(entry, join));
/// assert!(!dom_tree.strictly_dominates(a, join));
/// assert_eq!(dom_tree.immediate_dominator(join), Some(entry));
/// ```
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let node_count = graph.node_count();
    if node_count == 0 || entry.index() >= node_count {
        return DominatorTree {
            entry,
            idom: vec![UNDEFINED; node_count],
            node_count,
        };
    }

    let mut lt = LengauerTarjan::new(node_count, entry);
    lt.compute(graph);

    DominatorTree {
        entry,
        idom: lt.idom,
        node_count,
    }
}

/// Computes the dominator tree of a [`RootedGraph`] from its own entry.
pub fn compute_dominators_rooted<G>(graph: &G) -> DominatorTree
where
    G: RootedGraph,
{
    compute_dominators(graph, graph.entry())
}

/// Computes the post-dominator tree of `graph`.
pub fn compute_post_dominators<G>(graph: &G) -> PostDominatorTree
where
    G: Successors + Predecessors,
{
    let reversed = Reversed::new(graph);
    let exit = reversed.virtual_exit();
    PostDominatorTree {
        tree: compute_dominators(&reversed, exit),
    }
}

/// Working state of one Lengauer-Tarjan run.
struct LengauerTarjan {
    entry: NodeId,
    /// DFS number per node, 0 = not visited.
    dfnum: Vec<usize>,
    /// Node with each DFS number (offset by one).
    vertex: Vec<NodeId>,
    parent: Vec<NodeId>,
    semi: Vec<NodeId>,
    idom: Vec<NodeId>,
    ancestor: Vec<NodeId>,
    /// Node with the smallest semidominator on the compressed path.
    best: Vec<NodeId>,
    bucket: Vec<Vec<NodeId>>,
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize, entry: NodeId) -> Self {
        Self {
            entry,
            dfnum: vec![0; n],
            vertex: vec![UNDEFINED; n],
            parent: vec![UNDEFINED; n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: vec![UNDEFINED; n],
            ancestor: vec![UNDEFINED; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute<G: Successors + Predecessors>(&mut self, graph: &G) {
        self.dfs(graph, self.entry);

        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            for v in graph.predecessors(w) {
                if self.dfnum.get(v.index()).copied().unwrap_or(0) == 0 {
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.ancestor[w.index()] = parent_w;

            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                self.idom[v.index()] = if self.semi[u.index()] == self.semi[v.index()] {
                    parent_w
                } else {
                    u
                };
            }
        }

        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        self.idom[self.entry.index()] = self.entry;
    }

    fn dfs<G: Successors>(&mut self, graph: &G, start: NodeId) {
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if self.dfnum[node.index()] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[node.index()] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;

            for succ in graph.successors(node) {
                if self.dfnum[succ.index()] == 0 {
                    self.parent[succ.index()] = node;
                    stack.push(succ);
                }
            }
        }
    }

    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()] == UNDEFINED {
            return v;
        }
        self.compress(v);
        self.best[v.index()]
    }

    fn compress(&mut self, v: NodeId) {
        let ancestor_v = self.ancestor[v.index()];
        if self.ancestor[ancestor_v.index()] == UNDEFINED {
            return;
        }

        self.compress(ancestor_v);

        let best_ancestor = self.best[ancestor_v.index()];
        let best_v = self.best[v.index()];
        if self.dfnum[self.semi[best_ancestor.index()].index()]
            < self.dfnum[self.semi[best_v.index()].index()]
        {
            self.best[v.index()] = best_ancestor;
        }

        self.ancestor[v.index()] = self.ancestor[ancestor_v.index()];
    }
}

/// Returns true if the live node set of `graph` has a single node without
/// predecessors, which must be the entry.
pub fn has_unique_root<G: RootedGraph>(graph: &G) -> bool {
    let entry = graph.entry();
    graph
        .node_ids()
        .filter(|&n| graph.predecessors(n).next().is_none())
        .all(|n| n == entry)
}
