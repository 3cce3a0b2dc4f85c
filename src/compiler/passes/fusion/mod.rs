//! Loop fusion pass.
//!
//! This pass merges adjacent sibling loops that run the same number of
//! iterations into a single loop, so that both bodies execute in one
//! iteration space:
//!
//! ```text
//! Before:                             After:
//!
//!   [preheader0]                        [preheader0]
//!        |                                   |
//!        v                                   v
//!   [header0] <--+                      [header0] <------+
//!        |       |                           |           |
//!     [body0] ---+                        [body0]        |
//!        |                                   |           |
//!        v                                   v           |
//!   [preheader1]                        [header1]        |
//!        |                                   |           |
//!        v                                   v           |
//!   [header1] <--+                        [body1] -------+
//!        |       |                           |
//!     [body1] ---+                           v
//!        |                                [exit1]
//!        v
//!     [exit1]
//! ```
//!
//! # Sweep
//!
//! The loop forest is visited one nesting depth at a time
//! ([`LoopDepthTree`]). The loops of each sibling group are wrapped as
//! [`FusionCandidate`]s and partitioned into control-flow-equivalent sets in
//! dominance order. Within a set every ordered pair is put through the
//! legality checks; a legal pair is fused, and the fused loop is reinserted
//! into the set so it can absorb the next loop in the same sweep.
//!
//! # Legality
//!
//! A pair is fused only if, in order:
//!
//! 1. both trip counts are known and structurally identical
//! 2. the second loop starts where the first one ends
//! 3. guarded loops have identical guards
//! 4. the blocks between the loops are empty
//! 5. no memory dependence or value flow would be reversed
//! 6. the profitability predicate agrees
//!
//! The first failing check is recorded as a [`FusionReason`] in the event log.
//! Rejections are ordinary outcomes and never errors.

mod candidate;
mod config;
mod dependence;
mod depth;
mod grouping;
mod legality;
mod reason;
mod transform;

pub use candidate::FusionCandidate;
pub use config::{DependenceAnalysis, FusionConfig};
pub use depth::LoopDepthTree;
pub use grouping::{
    collect_candidates, comes_before, control_flow_equivalent, insert_ordered, CandidateSet,
};
pub use legality::{always_profitable, Profitability};
pub use reason::FusionReason;
pub use transform::perform_fusion;

use log::debug;

use crate::{
    compiler::{pass::FunctionPass, EventKind, FusionContext, PreservedAnalyses},
    Result,
};

/// Result of one fusion sweep over a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionOutcome {
    /// Whether the function was modified.
    pub changed: bool,
    /// Number of loop pairs fused.
    pub fused: usize,
    /// Analyses still valid without recomputation.
    pub preserved: PreservedAnalyses,
}

/// The fusion sweep driver.
///
/// # Example
///
/// ```rust,ignore
/// use loopfuse::compiler::{FusionConfig, LoopFuser};
///
/// let outcome = LoopFuser::new(FusionConfig::default()).run(&mut ctx)?;
/// println!("fused {} pairs", outcome.fused);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LoopFuser {
    config: FusionConfig,
    profitable: Profitability,
}

impl Default for LoopFuser {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

impl LoopFuser {
    /// Creates a driver that fuses every legal pair.
    #[must_use]
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            profitable: always_profitable,
        }
    }

    /// Replaces the profitability predicate. It is consulted last, after
    /// every correctness check has passed.
    #[must_use]
    pub fn with_profitability(mut self, profitable: Profitability) -> Self {
        self.profitable = profitable;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Runs the sweep over every nesting depth of the function in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the transform broke one of its own
    /// invariants or verification failed; rejected pairs are reported to
    /// `ctx.events` instead.
    pub fn run(&self, ctx: &mut FusionContext<'_>) -> Result<FusionOutcome> {
        let mut ldt = LoopDepthTree::new(ctx.forest);
        let mut fused = 0;

        while !ldt.is_empty() {
            debug!(
                "{}: got {} loop sets for depth {}",
                ctx.func.name(),
                ldt.len(),
                ldt.depth()
            );
            let groups = ldt.levels().to_vec();
            for group in &groups {
                if group.len() == 1 {
                    continue;
                }
                let sets = collect_candidates(
                    ctx.func,
                    ctx.forest,
                    ctx.dtu,
                    &*ctx.scev,
                    ctx.events,
                    group,
                )?;
                for set in sets {
                    fused += self.fuse_candidates(ctx, set, &mut ldt)?;
                }
            }
            ldt.descend(ctx.forest);
        }

        debug!("{}: fused {} loop pairs", ctx.func.name(), fused);
        Ok(FusionOutcome {
            changed: fused > 0,
            fused,
            preserved: PreservedAnalyses::all(),
        })
    }

    /// Tries every ordered pair of `set`, reinserting each fused loop.
    fn fuse_candidates(
        &self,
        ctx: &mut FusionContext<'_>,
        mut set: CandidateSet,
        ldt: &mut LoopDepthTree,
    ) -> Result<usize> {
        if set.len() < 2 {
            return Ok(0);
        }
        debug!("Attempting fusion on candidate set of {} loops", set.len());

        let mut fused = 0;
        let mut i = 0;
        while i < set.len() {
            let mut j = i + 1;
            while j < set.len() {
                let (fc0, fc1) = (&set[i], &set[j]);
                debug_assert!(
                    fc0.verify(ctx.func, ctx.forest, ctx.dtu).is_ok()
                        && fc1.verify(ctx.func, ctx.forest, ctx.dtu).is_ok()
                );
                debug!("Attempting to fuse {} with {}", fc0.loop_id(), fc1.loop_id());

                if let Err(reason) =
                    legality::check_pair(ctx, &self.config, fc0, fc1, self.profitable)
                {
                    debug!("Fusion rejected: {reason}");
                    ctx.events
                        .record(EventKind::FusionMissed)
                        .function(ctx.func.name())
                        .blocks(fc0.name(ctx.func), fc1.name(ctx.func))
                        .at(fc0.location())
                        .reason(reason);
                    j += 1;
                    continue;
                }

                debug!("Fusion is legal and profitable");
                ctx.events
                    .record(EventKind::LoopsFused)
                    .function(ctx.func.name())
                    .blocks(fc0.name(ctx.func), fc1.name(ctx.func))
                    .at(fc0.location());

                let removed = fc1.loop_id();
                let survivor = perform_fusion(ctx, &self.config, fc0, fc1)?;
                let fused_candidate =
                    FusionCandidate::new(survivor, ctx.func, ctx.forest, ctx.events);
                if !fused_candidate.is_eligible_for_fusion(
                    ctx.func,
                    ctx.forest,
                    &*ctx.scev,
                    ctx.events,
                ) {
                    return Err(invariant_error!(
                        "fused loop {} is not a valid fusion candidate",
                        survivor
                    ));
                }
                if self.config.verify {
                    fused_candidate.verify(ctx.func, ctx.forest, ctx.dtu)?;
                }

                ldt.remove_loop(removed);
                set.remove(j);
                set.remove(i);
                i = insert_ordered(ctx.dtu, &mut set, fused_candidate)?;
                j = i + 1;
                fused += 1;
            }
            i += 1;
        }
        Ok(fused)
    }
}

/// Loop fusion as a [`FunctionPass`].
///
/// # Example
///
/// ```rust,ignore
/// use loopfuse::compiler::{FunctionPass, LoopFusionPass};
///
/// let pass = LoopFusionPass::new();
/// let changed = pass.run_on_function(&mut ctx)?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopFusionPass {
    fuser: LoopFuser,
}

impl LoopFusionPass {
    /// Creates the pass with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the pass around a configured driver.
    #[must_use]
    pub fn with_fuser(fuser: LoopFuser) -> Self {
        Self { fuser }
    }
}

impl FunctionPass for LoopFusionPass {
    fn name(&self) -> &'static str {
        "LoopFusion"
    }

    fn should_run(&self, ctx: &FusionContext<'_>) -> bool {
        ctx.forest.len() >= 2
    }

    fn run_on_function(&self, ctx: &mut FusionContext<'_>) -> Result<bool> {
        ctx.events
            .record(EventKind::PassStarted)
            .function(ctx.func.name())
            .pass(self.name());

        let outcome = self.fuser.run(ctx)?;

        ctx.events
            .record(EventKind::PassCompleted)
            .function(ctx.func.name())
            .pass(self.name())
            .message(format!("fused {} loop pairs", outcome.fused));
        Ok(outcome.changed)
    }

    fn description(&self) -> &'static str {
        "Fuses adjacent sibling loops with identical trip counts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            AffineEvolution, BaseDisjointDependence, DomTreeUpdater, Function, LoopForest,
        },
        compiler::{EventLog, FusionStats},
        test::{
            adjacent_loops_with_bounds, address_taken_pair, guarded_pair, guarded_shared_pair,
            loops_with_offset, mismatched_guards, nested_pair, non_empty_exit_pair,
            non_empty_guard_pair, non_empty_preheader_pair, outer_pair, three_loop_chain,
            two_adjacent_loops,
        },
    };

    fn run_with(func: &mut Function, fuser: LoopFuser) -> (FusionOutcome, EventLog, LoopForest) {
        let mut forest = LoopForest::analyze(func);
        let mut dtu = DomTreeUpdater::new(func);
        let mut se = AffineEvolution::analyze(func, &forest);
        let oracle = BaseDisjointDependence::new();
        let events = EventLog::new();
        let outcome = {
            let mut ctx =
                FusionContext::new(func, &mut forest, &mut dtu, &mut se, &oracle, &events);
            fuser.run(&mut ctx).unwrap()
        };
        (outcome, events, forest)
    }

    fn run(func: &mut Function) -> (FusionOutcome, EventLog, LoopForest) {
        run_with(func, LoopFuser::new(FusionConfig::default().with_verify(true)))
    }

    #[test]
    fn test_adjacent_loops_fuse() {
        let mut func = two_adjacent_loops();
        let (outcome, events, forest) = run(&mut func);

        assert!(outcome.changed);
        assert_eq!(outcome.fused, 1);
        assert_eq!(outcome.preserved, PreservedAnalyses::all());
        assert_eq!(forest.top_level().len(), 1);
        assert_eq!(events.count_kind(EventKind::LoopsFused), 1);
        assert_eq!(events.count_kind(EventKind::CandidateCollected), 2);
    }

    #[test]
    fn test_unequal_trip_counts_are_rejected() {
        let mut func = adjacent_loops_with_bounds(0, 1);
        let before = func.to_string();
        let (outcome, events, _) = run(&mut func);

        assert!(!outcome.changed);
        assert_eq!(outcome.preserved, PreservedAnalyses::all());
        assert!(events.has_reason(FusionReason::NonEqualTripCount));
        assert_eq!(func.to_string(), before);
    }

    #[test]
    fn test_backward_dependence_leaves_graph_unmodified() {
        let mut func = loops_with_offset(1);
        let before = func.to_string();
        let (outcome, events, _) = run(&mut func);

        assert_eq!(outcome.fused, 0);
        assert!(events.has_reason(FusionReason::InvalidDependencies));
        assert_eq!(func.to_string(), before);
    }

    #[test]
    fn test_chain_fuses_transitively() {
        let mut func = three_loop_chain();
        let (outcome, events, forest) = run(&mut func);

        assert_eq!(outcome.fused, 2);
        assert_eq!(forest.top_level().len(), 1);
        assert_eq!(events.count_kind(EventKind::BlockRemoved), 2);
    }

    #[test]
    fn test_guarded_loops_fuse() {
        let mut func = guarded_pair();
        let (outcome, events, forest) = run(&mut func);

        assert_eq!(outcome.fused, 1);
        assert_eq!(forest.top_level().len(), 1);
        assert_eq!(events.count_kind(EventKind::BlockRemoved), 3);
        let fused = forest.get(forest.top_level()[0]).unwrap();
        assert!(fused.guard_block(&func).is_some());
    }

    #[test]
    fn test_guarded_shared_array_is_rejected() {
        // the headers are unordered by dominance, so only the base oracle
        // gets a say and both loops touch a
        let mut func = guarded_shared_pair();
        let before = func.to_string();
        let (outcome, events, _) = run(&mut func);

        assert_eq!(outcome.fused, 0);
        assert!(events.has_reason(FusionReason::InvalidDependencies));
        assert_eq!(func.to_string(), before);
    }

    #[test]
    fn test_lone_loop_emits_no_candidate_events() {
        let mut func = nested_pair();
        let (_, events, _) = run(&mut func);

        // only the two inner loops are ever collected
        assert_eq!(events.count_kind(EventKind::CandidateCollected), 2);
    }

    #[test]
    fn test_inner_loops_fuse_at_depth_two() {
        let mut func = nested_pair();
        let (outcome, _, forest) = run(&mut func);

        assert_eq!(outcome.fused, 1);
        let top = forest.top_level();
        assert_eq!(top.len(), 1);
        assert_eq!(forest.children(top[0]).len(), 1);
    }

    #[test]
    fn test_outer_fusion_keeps_both_inner_loops() {
        // the outer latch sits between the inner loops once the outer
        // loops are fused
        let mut func = outer_pair();
        let (outcome, events, forest) = run(&mut func);

        assert_eq!(outcome.fused, 1);
        let top = forest.top_level();
        assert_eq!(top.len(), 1);
        assert_eq!(forest.children(top[0]).len(), 2);
        assert!(events.has_reason(FusionReason::NonAdjacent));
    }

    #[test]
    fn test_each_rejection_reason() {
        let cases: [(fn() -> Function, FusionReason); 5] = [
            (non_empty_preheader_pair, FusionReason::NonEmptyPreheader),
            (non_empty_exit_pair, FusionReason::NonEmptyExitBlock),
            (non_empty_guard_pair, FusionReason::NonEmptyGuardBlock),
            (mismatched_guards, FusionReason::NonIdenticalGuards),
            (address_taken_pair, FusionReason::AddressTakenBlock),
        ];
        for (build, reason) in cases {
            let mut func = build();
            let (outcome, events, _) = run(&mut func);
            assert_eq!(outcome.fused, 0, "{reason:?}");
            assert!(events.has_reason(reason), "{reason:?}");
        }
    }

    #[test]
    fn test_profitability_is_checked_last() {
        fn never(_: &FusionCandidate, _: &FusionCandidate) -> bool {
            false
        }
        let mut func = two_adjacent_loops();
        let fuser = LoopFuser::new(FusionConfig::default()).with_profitability(never);
        let (outcome, events, _) = run_with(&mut func, fuser);

        assert!(!outcome.changed);
        let stats = FusionStats::from_log(&events);
        assert_eq!(stats.reason(FusionReason::FusionNotBeneficial), 1);
        assert_eq!(stats.missed, 1);
    }

    #[test]
    fn test_remark_names_both_preheaders() {
        let mut func = adjacent_loops_with_bounds(0, 1);
        let (_, events, _) = run(&mut func);
        let remark = events
            .filter_kind(EventKind::FusionMissed)
            .map(|e| e.remark())
            .next()
            .unwrap();
        assert_eq!(
            remark,
            "bounds: pre0 and pre1: Loop trip counts are not the same"
        );
    }

    #[test]
    fn test_pass_records_lifecycle_events() {
        let mut func = two_adjacent_loops();
        let mut forest = LoopForest::analyze(&func);
        let mut dtu = DomTreeUpdater::new(&func);
        let mut se = AffineEvolution::analyze(&func, &forest);
        let oracle = BaseDisjointDependence::new();
        let events = EventLog::new();
        let mut ctx =
            FusionContext::new(&mut func, &mut forest, &mut dtu, &mut se, &oracle, &events);

        let pass = LoopFusionPass::new();
        assert!(pass.should_run(&ctx));
        assert!(pass.run_on_function(&mut ctx).unwrap());
        assert!(events.has(EventKind::PassStarted));
        assert!(events.has(EventKind::PassCompleted));
        assert_eq!(pass.name(), "LoopFusion");
    }
}
