//! Level-by-level walk over the loop forest.

use std::collections::HashSet;

use crate::analysis::{LoopForest, LoopId};

/// Sibling groups of one nesting depth, outermost first.
///
/// Fusion only ever pairs loops that share a parent, so the pass walks the
/// forest one depth at a time. Each call to [`descend`](Self::descend) replaces
/// the current groups with the children of every loop that is still alive;
/// loops fused away at the current depth are marked with
/// [`remove_loop`](Self::remove_loop) and skipped.
#[derive(Debug, Clone)]
pub struct LoopDepthTree {
    levels: Vec<Vec<LoopId>>,
    removed: HashSet<LoopId>,
    depth: usize,
}

impl LoopDepthTree {
    /// Starts at depth 1 with the top-level loops as a single group.
    #[must_use]
    pub fn new(forest: &LoopForest) -> Self {
        let top = forest.top_level();
        Self {
            levels: if top.is_empty() { Vec::new() } else { vec![top] },
            removed: HashSet::new(),
            depth: 1,
        }
    }

    /// Moves to the next depth.
    ///
    /// Every non-removed loop with children contributes its children, ordered
    /// by header, as one new group. The removed set is cleared.
    pub fn descend(&mut self, forest: &LoopForest) {
        let mut next = Vec::new();
        for group in &self.levels {
            for &id in group {
                if self.removed.contains(&id) || forest.is_erased(id) {
                    continue;
                }
                let mut children = forest.children(id).to_vec();
                if children.is_empty() {
                    continue;
                }
                children.sort_by_key(|&c| forest.get(c).map(|l| l.header));
                next.push(children);
            }
        }
        self.levels = next;
        self.removed.clear();
        self.depth += 1;
    }

    /// Marks `id` as fused away at the current depth.
    pub fn remove_loop(&mut self, id: LoopId) {
        self.removed.insert(id);
    }

    /// Returns true if `id` was removed at the current depth.
    #[must_use]
    pub fn is_removed_loop(&self, id: LoopId) -> bool {
        self.removed.contains(&id)
    }

    /// Sibling groups at the current depth.
    #[must_use]
    pub fn levels(&self) -> &[Vec<LoopId>] {
        &self.levels
    }

    /// Current depth; top-level loops are depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of groups minus the number of removed loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len().saturating_sub(self.removed.len())
    }

    /// Returns true once there are no groups left to visit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
