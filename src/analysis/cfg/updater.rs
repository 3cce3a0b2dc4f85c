//! Batched maintenance of the dominator and post-dominator trees.
//!
//! Transforms never show the trees an intermediate graph. They rewrite
//! terminators first, describe every edge they touched as a [`DomUpdate`],
//! queue the batch with [`DomTreeUpdater::apply_updates`], schedule dead
//! blocks with [`DomTreeUpdater::delete_block`], and finally
//! [`flush`](DomTreeUpdater::flush). Flushing checks each queued edit against
//! the function (an inserted edge must exist, a deleted edge must be gone),
//! erases the dead blocks and brings both trees up to date.

use std::fmt;

use crate::{
    analysis::ssa::Function,
    utils::graph::{
        algorithms::{
            compute_dominators, compute_post_dominators, DominatorTree, PostDominatorTree,
        },
        NodeId, RootedGraph, Successors,
    },
    Error, Result,
};

/// One edge edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomUpdate {
    /// The edge `from -> to` was added.
    Insert(NodeId, NodeId),
    /// The edge `from -> to` was removed.
    Delete(NodeId, NodeId),
}

impl fmt::Display for DomUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomUpdate::Insert(from, to) => write!(f, "insert {from} -> {to}"),
            DomUpdate::Delete(from, to) => write!(f, "delete {from} -> {to}"),
        }
    }
}

/// Owner of the dominance oracles of one function.
#[derive(Debug, Clone)]
pub struct DomTreeUpdater {
    dominators: DominatorTree,
    post_dominators: PostDominatorTree,
    pending_updates: Vec<DomUpdate>,
    pending_deletes: Vec<NodeId>,
}

impl DomTreeUpdater {
    /// Computes both trees for `func`.
    #[must_use]
    pub fn new(func: &Function) -> Self {
        Self {
            dominators: compute_dominators(func, func.entry()),
            post_dominators: compute_post_dominators(func),
            pending_updates: Vec::new(),
            pending_deletes: Vec::new(),
        }
    }

    /// The dominator tree as of the last flush.
    #[must_use]
    pub fn dominators(&self) -> &DominatorTree {
        &self.dominators
    }

    /// The post-dominator tree as of the last flush.
    #[must_use]
    pub fn post_dominators(&self) -> &PostDominatorTree {
        &self.post_dominators
    }

    /// Returns true if `a` dominates `b`.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.dominators.dominates(a, b)
    }

    /// Returns true if `a` post-dominates `b`.
    #[must_use]
    pub fn post_dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.post_dominators.post_dominates(a, b)
    }

    /// Returns true if edits or deletions are waiting for a flush.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending_updates.is_empty() || !self.pending_deletes.is_empty()
    }

    /// Queues a batch of edge edits.
    pub fn apply_updates(&mut self, updates: &[DomUpdate]) {
        self.pending_updates.extend_from_slice(updates);
    }

    /// Schedules `block` for erasure at the next flush.
    pub fn delete_block(&mut self, block: NodeId) {
        if !self.pending_deletes.contains(&block) {
            self.pending_deletes.push(block);
        }
    }

    /// Validates the queued edits, erases scheduled blocks and recomputes both
    /// trees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] if a queued edit disagrees with the
    /// function, or any error from [`Function::erase_block`].
    pub fn flush(&mut self, func: &mut Function) -> Result<()> {
        let updates = std::mem::take(&mut self.pending_updates);
        let deletes = std::mem::take(&mut self.pending_deletes);

        for update in &updates {
            let holds = match *update {
                DomUpdate::Insert(from, to) => func.successors(from).any(|s| s == to),
                DomUpdate::Delete(from, to) => {
                    deletes.contains(&from) || !func.successors(from).any(|s| s == to)
                }
            };
            if !holds {
                return Err(Error::Verification(format!(
                    "dominator update '{update}' does not match the function"
                )));
            }
        }

        for &block in &deletes {
            func.erase_block(block)?;
        }

        self.recalculate(func);
        Ok(())
    }

    /// Recomputes both trees from scratch, dropping nothing that is queued.
    pub fn recalculate(&mut self, func: &Function) {
        self.dominators = compute_dominators(func, func.entry());
        self.post_dominators = compute_post_dominators(func);
    }

    /// Checks that both trees match freshly computed ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] if updates are still pending or a tree
    /// is stale.
    pub fn verify(&self, func: &Function) -> Result<()> {
        if self.has_pending() {
            return Err(Error::Verification(
                "dominator updates pending at verification".into(),
            ));
        }
        if self.dominators != compute_dominators(func, func.entry()) {
            return Err(Error::Verification("dominator tree is stale".into()));
        }
        if self.post_dominators != compute_post_dominators(func) {
            return Err(Error::Verification("post-dominator tree is stale".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FunctionBuilder;

    fn chain() -> Function {
        FunctionBuilder::new("chain")
            .build_with(|f| {
                f.block(0, |b| b.jump(1));
                f.block(1, |b| b.jump(2));
                f.block(2, |b| b.ret());
            })
            .unwrap()
    }

    #[test]
    fn test_flush_applies_batch_and_erases() {
        let mut func = chain();
        let mut dtu = DomTreeUpdater::new(&func);
        assert!(dtu.dominates(NodeId::new(1), NodeId::new(2)));

        func.replace_successor(NodeId::new(0), NodeId::new(1), NodeId::new(2))
            .unwrap();
        func.make_unreachable(NodeId::new(1)).unwrap();
        dtu.apply_updates(&[
            DomUpdate::Delete(NodeId::new(0), NodeId::new(1)),
            DomUpdate::Insert(NodeId::new(0), NodeId::new(2)),
            DomUpdate::Delete(NodeId::new(1), NodeId::new(2)),
        ]);
        dtu.delete_block(NodeId::new(1));
        assert!(dtu.has_pending());
        assert!(dtu.verify(&func).is_err());

        dtu.flush(&mut func).unwrap();

        assert!(func.block(NodeId::new(1)).is_none());
        assert_eq!(dtu.dominators().immediate_dominator(NodeId::new(2)), Some(NodeId::new(0)));
        assert!(dtu.post_dominates(NodeId::new(2), NodeId::new(0)));
        assert!(dtu.verify(&func).is_ok());
    }

    #[test]
    fn test_flush_rejects_stale_edit() {
        let mut func = chain();
        let mut dtu = DomTreeUpdater::new(&func);
        dtu.apply_updates(&[DomUpdate::Insert(NodeId::new(0), NodeId::new(2))]);
        assert!(matches!(dtu.flush(&mut func), Err(Error::Verification(_))));
    }
}
