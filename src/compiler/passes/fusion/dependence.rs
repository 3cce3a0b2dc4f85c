//! Dependence legality for a pair of candidates.
//!
//! Fusing FC0 with FC1 interleaves their iterations: iteration `i` of FC1 now
//! runs before iteration `i + 1` of FC0. That is only sound if no access of
//! FC1 depends on an access FC0 performs in a later iteration. Every pair of
//! memory instructions that involves at least one write is checked, with the
//! symbolic access comparison, the general oracle, or both.

use log::trace;

use crate::{
    analysis::{
        CmpPredicate, DomTreeUpdater, ExprRewriter, Function, InstId, LoopForest, LoopId,
        Operand, ScalarEvolution, SymExpr,
    },
    compiler::{
        passes::fusion::{DependenceAnalysis, FusionCandidate, FusionConfig},
        FusionContext,
    },
};

/// Moves recurrences of `old` onto `new`.
///
/// A recurrence of a loop nested inside `old` is replaced by its start value,
/// which is its minimum when the step is known positive. Anything else nested
/// inside `old` makes the rewrite invalid.
struct AddRecLoopReplacer<'a> {
    scev: &'a dyn ScalarEvolution,
    forest: &'a LoopForest,
    old: LoopId,
    new: LoopId,
    valid: bool,
}

impl ExprRewriter for AddRecLoopReplacer<'_> {
    fn visit_add_rec(&mut self, operands: &[SymExpr], loop_id: LoopId) -> SymExpr {
        if loop_id == self.old {
            return SymExpr::add_rec(operands.to_vec(), self.new);
        }

        if self.forest.contains_loop(self.old, loop_id) {
            let rec = SymExpr::add_rec(operands.to_vec(), loop_id);
            let positive = rec.step().is_some_and(|step| self.scev.is_known_positive(&step));
            return match rec.start() {
                Some(start) if positive && rec.is_affine() => self.visit(start),
                _ => {
                    self.valid = false;
                    rec
                }
            };
        }

        let operands = operands.iter().map(|op| self.visit(op)).collect();
        SymExpr::add_rec(operands, loop_id)
    }
}

/// Returns true if the address of `i0` in `l0` is provably never below the
/// address of `i1` in `l1` once both run in `l1`'s iteration space.
///
/// With `equal_is_invalid` the comparison is strict.
pub(crate) fn access_diff_is_positive(
    ctx: &FusionContext<'_>,
    config: &FusionConfig,
    (l0, l1): (LoopId, LoopId),
    (i0, i1): (InstId, InstId),
    equal_is_invalid: bool,
) -> bool {
    let (Some(addr0), Some(addr1)) = (pointer_operand(ctx.func, i0), pointer_operand(ctx.func, i1))
    else {
        return false;
    };
    let (Some(ptr0), Some(ptr1)) = (
        ctx.scev.scev_at_scope(&addr0, l0),
        ctx.scev.scev_at_scope(&addr1, l1),
    ) else {
        return false;
    };
    if config.verbose {
        trace!("    Access function check: {ptr0} vs {ptr1}");
    }

    let mut rewriter = AddRecLoopReplacer {
        scev: &*ctx.scev,
        forest: ctx.forest,
        old: l0,
        new: l1,
        valid: true,
    };
    let ptr0 = rewriter.visit(&ptr0);
    if config.verbose {
        trace!(
            "    Access function after rewrite: {ptr0} [Valid: {}]",
            rewriter.valid
        );
    }
    if !rewriter.valid {
        return false;
    }

    let Some(l0_header) = ctx.forest.get(l0).map(|l| l.header) else {
        return false;
    };
    if has_unrelated_recurrence(&ptr1, l0_header, ctx.forest, ctx.dtu) {
        return false;
    }

    let predicate = if equal_is_invalid {
        CmpPredicate::Sgt
    } else {
        CmpPredicate::Sge
    };
    let always_ge = ctx.scev.is_known_predicate(predicate, &ptr0, &ptr1);
    if config.verbose {
        trace!(
            "    Relation: {ptr0} {} {ptr1}",
            if always_ge { " >= " } else { " may < " }
        );
    }
    always_ge
}

fn pointer_operand(func: &Function, inst: InstId) -> Option<Operand> {
    func.instruction(inst)?.1.op().pointer_operand()
}

/// A recurrence whose loop header is not ordered by dominance with `header`.
fn has_unrelated_recurrence(
    expr: &SymExpr,
    header: crate::utils::graph::NodeId,
    forest: &LoopForest,
    dtu: &DomTreeUpdater,
) -> bool {
    expr.contains(&mut |e| {
        let Some(rec_loop) = e.rec_loop() else {
            return false;
        };
        let Some(rec_header) = forest.get(rec_loop).map(|l| l.header) else {
            return true;
        };
        !dtu.dominates(header, rec_header) && !dtu.dominates(rec_header, header)
    })
}

fn pair_allows_fusion(
    ctx: &FusionContext<'_>,
    config: &FusionConfig,
    fc0: &FusionCandidate,
    fc1: &FusionCandidate,
    (i0, i1): (InstId, InstId),
    analysis: DependenceAnalysis,
) -> bool {
    if config.verbose {
        trace!("Check dep: {i0} vs {i1} : {analysis:?}");
    }
    match analysis {
        DependenceAnalysis::Scev => access_diff_is_positive(
            ctx,
            config,
            (fc0.loop_id(), fc1.loop_id()),
            (i0, i1),
            false,
        ),
        DependenceAnalysis::Da => match ctx.dependence.depends(ctx.func, i0, i1) {
            None => true,
            Some(dependence) => {
                if config.verbose {
                    trace!("DA res: {dependence}");
                }
                false
            }
        },
        DependenceAnalysis::All => {
            pair_allows_fusion(ctx, config, fc0, fc1, (i0, i1), DependenceAnalysis::Scev)
                || pair_allows_fusion(ctx, config, fc0, fc1, (i0, i1), DependenceAnalysis::Da)
        }
    }
}

/// Returns true if no memory dependence or value flow between the two
/// candidates prevents fusing them.
pub(crate) fn dependences_allow_fusion(
    ctx: &FusionContext<'_>,
    config: &FusionConfig,
    fc0: &FusionCandidate,
    fc1: &FusionCandidate,
) -> bool {
    trace!("Check if {fc0} can be fused with {fc1}");
    let analysis = config.dependence_analysis;
    let allows = |pair| pair_allows_fusion(ctx, config, fc0, fc1, pair, analysis);

    for &w0 in fc0.writes() {
        if !fc1.writes().iter().all(|&w1| allows((w0, w1))) {
            return false;
        }
        if !fc1.reads().iter().all(|&r1| allows((w0, r1))) {
            return false;
        }
    }
    for &w1 in fc1.writes() {
        if !fc0.writes().iter().all(|&w0| allows((w0, w1))) {
            return false;
        }
        if !fc0.reads().iter().all(|&r0| allows((r0, w1))) {
            return false;
        }
    }

    !uses_value_from(ctx, fc1.loop_id(), fc0.loop_id())
        && !uses_value_from(ctx, fc0.loop_id(), fc1.loop_id())
}

/// Returns true if any phi or instruction in `user` reads a value defined in
/// a block of `definer`.
fn uses_value_from(ctx: &FusionContext<'_>, user: LoopId, definer: LoopId) -> bool {
    let (Some(user), Some(definer)) = (ctx.forest.get(user), ctx.forest.get(definer)) else {
        return true;
    };
    let defined_in_definer = |operand: Operand| {
        operand
            .as_value()
            .and_then(|v| ctx.func.definition(v))
            .and_then(|d| d.block())
            .is_some_and(|b| definer.contains(b))
    };

    user.body.iter().filter_map(|&b| ctx.func.block(b)).any(|block| {
        block
            .phi_nodes()
            .iter()
            .flat_map(|phi| phi.operands().iter().map(|op| op.value()))
            .chain(block.instructions().iter().flat_map(|i| i.op().operands()))
            .any(defined_in_definer)
    })
}
