//! Edge-reversed view of a graph with a virtual exit root.

use crate::utils::graph::{GraphBase, NodeId, Predecessors, Successors};

/// Borrowing view that flips every edge of the wrapped graph.
///
/// One extra node is appended at index `inner.node_count()`: the virtual exit.
/// In the reversed view it has an edge to every live node that has no
/// successors in the original graph, which makes it a single root for
/// post-dominance.
pub struct Reversed<'a, G> {
    inner: &'a G,
}

impl<'a, G> Reversed<'a, G>
where
    G: Successors + Predecessors,
{
    /// Wraps `inner`.
    pub fn new(inner: &'a G) -> Self {
        Self { inner }
    }

    /// The virtual exit node.
    pub fn virtual_exit(&self) -> NodeId {
        NodeId::new(self.inner.node_count())
    }

    fn is_exit(&self, node: NodeId) -> bool {
        self.inner.successors(node).next().is_none()
    }
}

impl<G> GraphBase for Reversed<'_, G>
where
    G: Successors + Predecessors,
{
    fn node_count(&self) -> usize {
        self.inner.node_count() + 1
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.inner
            .node_ids()
            .chain(std::iter::once(self.virtual_exit()))
    }
}

impl<G> Successors for Reversed<'_, G>
where
    G: Successors + Predecessors,
{
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let targets: Vec<NodeId> = if node == self.virtual_exit() {
            self.inner.node_ids().filter(|&n| self.is_exit(n)).collect()
        } else {
            self.inner.predecessors(node).collect()
        };
        targets.into_iter()
    }
}

impl<G> Predecessors for Reversed<'_, G>
where
    G: Successors + Predecessors,
{
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let mut sources: Vec<NodeId> = Vec::new();
        if node != self.virtual_exit() {
            sources.extend(self.inner.successors(node));
            if sources.is_empty() {
                sources.push(self.virtual_exit());
            }
        }
        sources.into_iter()
    }
}
