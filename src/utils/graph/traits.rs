//! Capability traits shared by every graph the analyses run on.
//!
//! Algorithms are written against the smallest capability they need, so the
//! dominator computation runs unchanged on a [`Function`](crate::analysis::Function),
//! on the [`Reversed`](super::Reversed) view used for post-dominance, and on the
//! small edge-list graphs in the unit tests.

use crate::utils::graph::NodeId;

/// Node enumeration.
pub trait GraphBase {
    /// Upper bound (exclusive) of node indices in the graph.
    ///
    /// Erased nodes still occupy an index, so this is not necessarily the
    /// number of live nodes.
    fn node_count(&self) -> usize;

    /// Iterates over all live nodes.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward edges.
pub trait Successors: GraphBase {
    /// Iterates over the successors of `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward edges.
pub trait Predecessors: GraphBase {
    /// Iterates over the predecessors of `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a designated entry node.
pub trait RootedGraph: Successors + Predecessors {
    /// The entry node.
    fn entry(&self) -> NodeId;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Edge-list graph used by the algorithm tests.
    pub(crate) struct EdgeGraph {
        pub(crate) node_count: usize,
        pub(crate) edges: Vec<(usize, usize)>,
    }

    impl EdgeGraph {
        pub(crate) fn new(node_count: usize, edges: &[(usize, usize)]) -> Self {
            EdgeGraph {
                node_count,
                edges: edges.to_vec(),
            }
        }
    }

    impl GraphBase for EdgeGraph {
        fn node_count(&self) -> usize {
            self.node_count
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.node_count).map(NodeId::new)
        }
    }

    impl Successors for EdgeGraph {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(src, _)| *src == node.index())
                .map(|(_, dst)| NodeId::new(*dst))
        }
    }

    impl Predecessors for EdgeGraph {
        fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(_, dst)| *dst == node.index())
                .map(|(src, _)| NodeId::new(*src))
        }
    }

    impl RootedGraph for EdgeGraph {
        fn entry(&self) -> NodeId {
            NodeId::new(0)
        }
    }

    #[test]
    fn test_edge_graph_adjacency() {
        let graph = EdgeGraph::new(3, &[(0, 1), (0, 2), (1, 2)]);
        let succs: Vec<_> = graph.successors(NodeId::new(0)).collect();
        assert_eq!(succs, vec![NodeId::new(1), NodeId::new(2)]);
        let preds: Vec<_> = graph.predecessors(NodeId::new(2)).collect();
        assert_eq!(preds, vec![NodeId::new(0), NodeId::new(1)]);
        assert_eq!(graph.entry(), NodeId::new(0));
    }
}
