//! Pass trait and analysis preservation.

use bitflags::bitflags;

use crate::{compiler::FusionContext, Result};

bitflags! {
    /// Analyses that are still valid after a pass ran.
    ///
    /// A pass that keeps an analysis up to date incrementally reports it as
    /// preserved, so the host does not need to recompute it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PreservedAnalyses: u8 {
        /// The dominator tree.
        const DOMINATORS = 0b0001;
        /// The post-dominator tree.
        const POST_DOMINATORS = 0b0010;
        /// Scalar evolution, including trip counts.
        const SCALAR_EVOLUTION = 0b0100;
        /// The loop forest.
        const LOOP_INFO = 0b1000;
    }
}

/// A transformation that operates on one function at a time.
///
/// All passes must be thread-safe (Send + Sync) so that a host can run the
/// same pass over different functions in parallel. Each function is handed
/// over in its own [`FusionContext`].
pub trait FunctionPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on the function in `ctx`?
    ///
    /// Called before `run_on_function`. Override to skip functions the pass
    /// cannot improve.
    fn should_run(&self, _ctx: &FusionContext<'_>) -> bool {
        true
    }

    /// Run the pass on the function in `ctx`.
    ///
    /// Returns `true` if any changes were made, `false` otherwise. Events
    /// should be recorded directly to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the function is malformed or the pass broke one of
    /// its own invariants.
    fn run_on_function(&self, ctx: &mut FusionContext<'_>) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
