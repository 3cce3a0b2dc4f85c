//! Block identifiers for control-flow graphs.
//!
//! [`NodeId`] is the strongly-typed index of a basic block inside a
//! [`Function`](crate::analysis::Function). Erased blocks keep their slot, so an
//! identifier stays meaningful for the lifetime of the function even after
//! fusion deletes the block it names.

use std::fmt;

/// Index of a basic block (graph node).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a node identifier from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering_follows_index() {
        let mut nodes = vec![NodeId::new(3), NodeId::new(1), NodeId::new(2)];
        nodes.sort();
        assert_eq!(nodes, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(format!("{}", NodeId::new(7)), "bb7");
        assert_eq!(format!("{:?}", NodeId::new(7)), "NodeId(7)");
    }

    #[test]
    fn test_node_id_conversions() {
        let node: NodeId = 12usize.into();
        assert_eq!(node.index(), 12);
        let raw: usize = node.into();
        assert_eq!(raw, 12);
    }
}
