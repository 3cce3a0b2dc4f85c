//! Control-flow-equivalent candidate sets.
//!
//! Two loops can only be fused if one always runs when the other does. The
//! candidates of one sibling group are therefore partitioned into sets whose
//! entry blocks are control-flow equivalent, and each set is kept in
//! dominance order so that neighbours are the pairs worth checking.

use log::debug;

use crate::{
    analysis::{DomTreeUpdater, Function, LoopForest, LoopId, ScalarEvolution},
    compiler::{passes::fusion::FusionCandidate, EventKind, EventLog},
    utils::graph::NodeId,
    Result,
};

/// Candidates ordered so that each entry block dominates the next.
pub type CandidateSet = Vec<FusionCandidate>;

/// Returns true if `a` and `b` always execute together.
#[must_use]
pub fn control_flow_equivalent(dtu: &DomTreeUpdater, a: NodeId, b: NodeId) -> bool {
    (dtu.dominates(a, b) && dtu.post_dominates(b, a))
        || (dtu.dominates(b, a) && dtu.post_dominates(a, b))
}

/// Returns true if `lhs` runs before `rhs`.
///
/// # Errors
///
/// Returns [`Error::Invariant`](crate::Error::Invariant) when neither entry
/// dominates the other; such candidates never share a set.
pub fn comes_before(
    dtu: &DomTreeUpdater,
    lhs: &FusionCandidate,
    rhs: &FusionCandidate,
) -> Result<bool> {
    let (Some(l), Some(r)) = (lhs.entry_block(), rhs.entry_block()) else {
        return Err(invariant_error!("candidates without an entry block cannot be ordered"));
    };
    if dtu.dominates(r, l) {
        debug_assert!(dtu.post_dominates(l, r));
        return Ok(false);
    }
    if dtu.dominates(l, r) {
        debug_assert!(dtu.post_dominates(r, l));
        return Ok(true);
    }
    Err(invariant_error!(
        "entries {} and {} are not ordered by dominance",
        l,
        r
    ))
}

/// Inserts `candidate` in dominance order and returns its position.
///
/// # Errors
///
/// Propagates ordering failures from [`comes_before`].
pub fn insert_ordered(
    dtu: &DomTreeUpdater,
    set: &mut CandidateSet,
    candidate: FusionCandidate,
) -> Result<usize> {
    let mut position = set.len();
    for (index, existing) in set.iter().enumerate() {
        if comes_before(dtu, &candidate, existing)? {
            position = index;
            break;
        }
    }
    set.insert(position, candidate);
    Ok(position)
}

/// Builds the eligible candidates of one sibling group and partitions them
/// into control-flow-equivalent sets.
///
/// Loops in `group` are visited in program order; ineligible loops are
/// reported and skipped.
///
/// # Errors
///
/// Propagates ordering failures from [`insert_ordered`].
pub fn collect_candidates(
    func: &Function,
    forest: &LoopForest,
    dtu: &DomTreeUpdater,
    scev: &dyn ScalarEvolution,
    events: &EventLog,
    group: &[LoopId],
) -> Result<Vec<CandidateSet>> {
    let mut sets: Vec<CandidateSet> = Vec::new();

    for &loop_id in group {
        let candidate = FusionCandidate::new(loop_id, func, forest, events);
        if !candidate.is_eligible_for_fusion(func, forest, scev, events) {
            continue;
        }
        events
            .record(EventKind::CandidateCollected)
            .function(func.name())
            .block(candidate.name(func))
            .at(candidate.location());

        let Some(entry) = candidate.entry_block() else {
            continue;
        };
        let home = sets.iter().position(|set| {
            set.first()
                .and_then(FusionCandidate::entry_block)
                .is_some_and(|first| control_flow_equivalent(dtu, first, entry))
        });
        match home {
            Some(index) => {
                debug!("Adding {candidate} to existing candidate set");
                insert_ordered(dtu, &mut sets[index], candidate)?;
            }
            None => {
                debug!("Adding {candidate} to new candidate set");
                sets.push(vec![candidate]);
            }
        }
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::AffineEvolution,
        test::{conditional_second_loop, three_loop_chain},
    };

    #[test]
    fn test_chain_forms_one_ordered_set() {
        let func = three_loop_chain();
        let forest = LoopForest::analyze(&func);
        let dtu = DomTreeUpdater::new(&func);
        let se = AffineEvolution::analyze(&func, &forest);
        let events = EventLog::new();

        let top = forest.top_level();
        let sets = collect_candidates(&func, &forest, &dtu, &se, &events, &top).unwrap();
        assert_eq!(sets.len(), 1);
        let ids: Vec<LoopId> = sets[0].iter().map(FusionCandidate::loop_id).collect();
        assert_eq!(ids, top);
        assert_eq!(events.count_kind(EventKind::CandidateCollected), 3);
    }

    #[test]
    fn test_insert_ordered_restores_dominance_order() {
        let func = three_loop_chain();
        let forest = LoopForest::analyze(&func);
        let dtu = DomTreeUpdater::new(&func);
        let events = EventLog::new();
        let top = forest.top_level();

        let mut set = CandidateSet::new();
        for &id in top.iter().rev() {
            insert_ordered(&dtu, &mut set, FusionCandidate::new(id, &func, &forest, &events))
                .unwrap();
        }
        let ids: Vec<LoopId> = set.iter().map(FusionCandidate::loop_id).collect();
        assert_eq!(ids, top);

        let first = FusionCandidate::new(top[0], &func, &forest, &events);
        let last = FusionCandidate::new(top[2], &func, &forest, &events);
        assert!(comes_before(&dtu, &first, &last).unwrap());
        assert!(!comes_before(&dtu, &last, &first).unwrap());
    }

    #[test]
    fn test_conditional_loop_gets_its_own_set() {
        let func = conditional_second_loop();
        let forest = LoopForest::analyze(&func);
        let dtu = DomTreeUpdater::new(&func);
        let se = AffineEvolution::analyze(&func, &forest);
        let events = EventLog::new();

        let top = forest.top_level();
        let sets = collect_candidates(&func, &forest, &dtu, &se, &events, &top).unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(|s| s.len() == 1));
    }
}
