//! Mutable state shared by every step of a fusion sweep.
//!
//! The dominance trees and the loop forest are updated in place while loops
//! are fused, and are not safe for concurrent updates. The context therefore
//! borrows everything exclusively for the duration of one sweep, and every
//! operation that observes or changes the shape of the graph takes it by
//! reference. Graph edits follow the batched protocol of
//! [`DomTreeUpdater`]: rewrite terminators, queue the edge edits, then flush.

use crate::{
    analysis::{DependenceOracle, DomTreeUpdater, Function, LoopForest, ScalarEvolution},
    compiler::EventLog,
    Result,
};

/// Exclusive borrow of a function and the analyses kept alongside it.
pub struct FusionContext<'a> {
    /// The function being transformed.
    pub func: &'a mut Function,

    /// Loop nest of `func`, updated as loops are fused.
    pub forest: &'a mut LoopForest,

    /// Dominator and post-dominator trees of `func`.
    pub dtu: &'a mut DomTreeUpdater,

    /// Trip counts and address expressions.
    pub scev: &'a mut dyn ScalarEvolution,

    /// Fallback memory dependence test.
    pub dependence: &'a dyn DependenceOracle,

    /// Sink for diagnostics and statistics.
    pub events: &'a EventLog,
}

impl<'a> FusionContext<'a> {
    /// Bundles a function with its analyses.
    pub fn new(
        func: &'a mut Function,
        forest: &'a mut LoopForest,
        dtu: &'a mut DomTreeUpdater,
        scev: &'a mut dyn ScalarEvolution,
        dependence: &'a dyn DependenceOracle,
        events: &'a EventLog,
    ) -> Self {
        Self {
            func,
            forest,
            dtu,
            scev,
            dependence,
            events,
        }
    }

    /// Checks the function, both dominance trees and the loop forest against
    /// each other.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`](crate::Error::Verification) describing
    /// the first inconsistency.
    pub fn verify(&self) -> Result<()> {
        self.func.verify()?;
        self.dtu.verify(&*self.func)?;
        self.forest.verify(&*self.func)
    }
}
