//! Pairwise legality checks.
//!
//! The checks run in a fixed order and stop at the first failure, so every
//! rejected pair carries exactly one [`FusionReason`].

use log::trace;

use crate::{
    analysis::{Definition, Function, Operand, ScalarEvolution},
    compiler::{
        passes::fusion::{
            dependence::dependences_allow_fusion, reason::Legality, FusionCandidate, FusionConfig,
            FusionReason,
        },
        FusionContext,
    },
    utils::graph::NodeId,
};

/// Decides whether a legal pair is worth fusing.
pub type Profitability = fn(&FusionCandidate, &FusionCandidate) -> bool;

/// Fuses every legal pair.
#[must_use]
pub fn always_profitable(_fc0: &FusionCandidate, _fc1: &FusionCandidate) -> bool {
    true
}

/// Runs every check on `fc0` followed by `fc1`.
pub(crate) fn check_pair(
    ctx: &FusionContext<'_>,
    config: &FusionConfig,
    fc0: &FusionCandidate,
    fc1: &FusionCandidate,
    profitable: Profitability,
) -> Legality {
    identical_trip_counts(&*ctx.scev, fc0, fc1)?;
    require(is_adjacent(fc0, fc1), FusionReason::NonAdjacent)?;

    if fc0.is_guarded() && fc1.is_guarded() {
        require(
            have_identical_guards(ctx.func, fc0, fc1),
            FusionReason::NonIdenticalGuards,
        )?;
    }

    require(
        block_is_empty(ctx.func, fc1.preheader()),
        FusionReason::NonEmptyPreheader,
    )?;
    if fc0.is_guarded() {
        require(
            block_is_empty(ctx.func, fc0.exit_block()),
            FusionReason::NonEmptyExitBlock,
        )?;
    }
    if fc1.is_guarded() {
        require(
            is_empty_guard_block(ctx.func, fc1),
            FusionReason::NonEmptyGuardBlock,
        )?;
    }

    require(
        dependences_allow_fusion(ctx, config, fc0, fc1),
        FusionReason::InvalidDependencies,
    )?;
    require(profitable(fc0, fc1), FusionReason::FusionNotBeneficial)
}

fn require(condition: bool, reason: FusionReason) -> Legality {
    if condition {
        Ok(())
    } else {
        Err(reason)
    }
}

fn identical_trip_counts(
    scev: &dyn ScalarEvolution,
    fc0: &FusionCandidate,
    fc1: &FusionCandidate,
) -> Legality {
    let (Some(count0), Some(count1)) = (
        scev.backedge_taken_count(fc0.loop_id()),
        scev.backedge_taken_count(fc1.loop_id()),
    ) else {
        return Err(FusionReason::UncomputableTripCount);
    };
    trace!("\tTrip counts: {count0} & {count1} are equal: {}", count0 == count1);
    require(count0 == count1, FusionReason::NonEqualTripCount)
}

/// FC1 must start where FC0 ends: at FC0's skip target when both loops are
/// guarded, at FC0's exit block otherwise.
fn is_adjacent(fc0: &FusionCandidate, fc1: &FusionCandidate) -> bool {
    if fc0.is_guarded() {
        fc1.is_guarded() && fc0.non_loop_block() == fc1.entry_block()
    } else {
        fc0.exit_block().is_some() && fc0.exit_block() == fc1.preheader()
    }
}

fn have_identical_guards(func: &Function, fc0: &FusionCandidate, fc1: &FusionCandidate) -> bool {
    let (Some(cond0), Some(cond1)) = (fc0.guard_condition(func), fc1.guard_condition(func)) else {
        return false;
    };
    if let (Some((_, cmp0)), Some((_, cmp1))) = (
        func.defining_instruction(cond0),
        func.defining_instruction(cond1),
    ) {
        if !cmp0.op().is_identical_to(cmp1.op()) {
            return false;
        }
    }

    let successor = |fc: &FusionCandidate, index| {
        fc.guard_block()
            .and_then(|g| func.block(g))
            .and_then(|b| b.successor(index))
    };
    if successor(fc0, 0) == fc0.preheader() {
        successor(fc1, 0) == fc1.preheader()
    } else {
        successor(fc1, 1) == fc1.preheader()
    }
}

/// A block holding nothing but its terminator.
fn block_is_empty(func: &Function, block: Option<NodeId>) -> bool {
    block.and_then(|b| func.block(b)).is_some_and(|b| b.len() == 1)
}

/// The guard block may hold the compare feeding its branch, and nothing else.
fn is_empty_guard_block(func: &Function, fc: &FusionCandidate) -> bool {
    let Some(guard) = fc.guard_block().and_then(|g| func.block(g)) else {
        return false;
    };
    let Some(Operand::Value(condition)) = fc.guard_condition(func) else {
        return false;
    };
    match func.definition(condition) {
        Some(Definition::Instruction { block, .. } | Definition::Phi { block })
            if block == guard.id() =>
        {
            guard.len() == 2
        }
        Some(Definition::Instruction { .. } | Definition::Phi { .. }) => guard.len() == 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::LoopForest,
        compiler::EventLog,
        test::{guarded_pair, non_empty_guard_pair, phi_guard_pair},
    };

    fn second_guard_is_empty(func: &Function) -> bool {
        let forest = LoopForest::analyze(func);
        let events = EventLog::new();
        let fc1 = FusionCandidate::new(forest.top_level()[1], func, &forest, &events);
        assert!(fc1.is_guarded());
        is_empty_guard_block(func, &fc1)
    }

    #[test]
    fn test_guard_with_only_its_compare_is_empty() {
        assert!(second_guard_is_empty(&guarded_pair()));
        assert!(!second_guard_is_empty(&non_empty_guard_pair()));
    }

    #[test]
    fn test_phi_condition_counts_as_the_guard_compare() {
        assert!(second_guard_is_empty(&phi_guard_pair()));
    }
}
