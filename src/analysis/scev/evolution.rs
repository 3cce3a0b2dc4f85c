//! The reference scalar-evolution oracle.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::{
    analysis::{
        cfg::{LoopForest, LoopId},
        scev::{ExprRewriter, ScalarEvolution, SymExpr},
        ssa::{BinaryOp, CmpPredicate, Function, Op, Operand, PhiNode, PhiOperand, ValueId},
    },
    utils::graph::NodeId,
};

/// Table-driven scalar evolution.
///
/// [`AffineEvolution::analyze`] walks the function once and records:
///
/// - an expression for every value, where header phis of the shape
///   `phi [init, preheader], [phi + step, latch]` become affine recurrences
/// - a backedge-taken count for every loop whose single exiting branch
///   compares a unit-stride recurrence against a loop-invariant bound
///
/// Counts can be overridden with [`AffineEvolution::set_backedge_taken_count`]
/// for shapes the analysis does not recognize.
#[derive(Debug, Clone, Default)]
pub struct AffineEvolution {
    values: HashMap<ValueId, SymExpr>,
    trip_counts: HashMap<LoopId, Option<SymExpr>>,
    parents: HashMap<LoopId, Option<LoopId>>,
}

enum ValueDef {
    Phi(NodeId, PhiNode),
    Op(NodeId, Op),
}

struct Analyzer<'a> {
    func: &'a Function,
    forest: &'a LoopForest,
    defs: HashMap<ValueId, ValueDef>,
    values: HashMap<ValueId, SymExpr>,
    in_progress: HashSet<ValueId>,
}

impl Analyzer<'_> {
    fn def_block(&self, value: ValueId) -> Option<NodeId> {
        match self.defs.get(&value)? {
            ValueDef::Phi(block, _) | ValueDef::Op(block, _) => Some(*block),
        }
    }

    fn is_invariant(&self, expr: &SymExpr, loop_id: LoopId) -> bool {
        let Some(info) = self.forest.get(loop_id) else {
            return false;
        };
        let recs_ok = expr
            .loops()
            .into_iter()
            .all(|l| !self.forest.contains_loop(loop_id, l));
        let values_ok = expr
            .unknowns()
            .into_iter()
            .all(|v| self.def_block(v).is_none_or(|b| !info.contains(b)));
        recs_ok && values_ok
    }

    fn operand(&mut self, operand: Operand) -> Option<SymExpr> {
        match operand {
            Operand::Const(c) => Some(SymExpr::Constant(c)),
            Operand::Value(v) => Some(self.value(v)),
            Operand::Undef => None,
        }
    }

    fn value(&mut self, value: ValueId) -> SymExpr {
        if let Some(expr) = self.values.get(&value) {
            return expr.clone();
        }
        if !self.in_progress.insert(value) {
            return SymExpr::Unknown(value);
        }
        let expr = self.compute(value).unwrap_or(SymExpr::Unknown(value));
        self.in_progress.remove(&value);
        self.values.insert(value, expr.clone());
        expr
    }

    fn compute(&mut self, value: ValueId) -> Option<SymExpr> {
        match self.defs.get(&value)? {
            ValueDef::Phi(block, phi) => {
                let (block, phi) = (*block, phi.clone());
                self.recurrence(block, &phi)
            }
            ValueDef::Op(_, op) => match op.clone() {
                Op::Const { value, .. } => Some(SymExpr::Constant(value)),
                Op::Binary {
                    op, left, right, ..
                } => {
                    let (l, r) = (self.operand(left)?, self.operand(right)?);
                    match op {
                        BinaryOp::Add => Some(SymExpr::add([l, r])),
                        BinaryOp::Sub => Some(SymExpr::sub(l, r)),
                        BinaryOp::Mul => Some(SymExpr::mul([l, r])),
                        _ => None,
                    }
                }
                _ => None,
            },
        }
    }

    /// `phi [init, outside], [phi +/- step, inside]` in a loop header.
    fn recurrence(&mut self, block: NodeId, phi: &PhiNode) -> Option<SymExpr> {
        let loop_id = self.forest.loop_for(block)?;
        let info = self.forest.get(loop_id)?;
        if info.header != block {
            return None;
        }
        let (inside, outside): (Vec<&PhiOperand>, Vec<&PhiOperand>) = phi
            .operands()
            .iter()
            .partition(|op| info.contains(op.predecessor()));
        let ([update], [init]) = (inside.as_slice(), outside.as_slice()) else {
            return None;
        };
        let (update, init) = (update.value(), init.value());

        let step_operand = match self.defs.get(&update.as_value()?)? {
            ValueDef::Op(
                _,
                Op::Binary {
                    op: BinaryOp::Add,
                    left,
                    right,
                    ..
                },
            ) => {
                if left.as_value() == Some(phi.result()) {
                    (*right, false)
                } else if right.as_value() == Some(phi.result()) {
                    (*left, false)
                } else {
                    return None;
                }
            }
            ValueDef::Op(
                _,
                Op::Binary {
                    op: BinaryOp::Sub,
                    left,
                    right,
                    ..
                },
            ) if left.as_value() == Some(phi.result()) => (*right, true),
            _ => return None,
        };

        let step = self.operand(step_operand.0)?;
        let step = if step_operand.1 { step.negate() } else { step };
        if !self.is_invariant(&step, loop_id) {
            return None;
        }
        let start = self.operand(init)?;
        Some(SymExpr::affine(start, step, loop_id))
    }

    fn trip_count(&mut self, loop_id: LoopId) -> Option<SymExpr> {
        let info = self.forest.get(loop_id)?;
        let exiting = info.exiting_block(self.func)?;
        let block = self.func.block(exiting)?;
        let Op::Branch {
            condition,
            true_target,
            false_target,
        } = block.terminator()?.op()
        else {
            return None;
        };
        let stay_on_true = match (info.contains(*true_target), info.contains(*false_target)) {
            (true, false) => true,
            (false, true) => false,
            _ => return None,
        };
        let (_, cmp) = self.func.defining_instruction(*condition)?;
        let Op::Compare {
            predicate,
            left,
            right,
            ..
        } = cmp.op()
        else {
            return None;
        };
        let (predicate, left, right) = (*predicate, *left, *right);
        let predicate = if stay_on_true {
            predicate
        } else {
            negate(predicate)
        };

        let (lhs, rhs) = (self.operand(left)?, self.operand(right)?);
        let (iv, bound, predicate) = if lhs.rec_loop() == Some(loop_id) {
            (lhs, rhs, predicate)
        } else if rhs.rec_loop() == Some(loop_id) {
            (rhs, lhs, swap(predicate))
        } else {
            return None;
        };
        if !iv.is_affine() || !self.is_invariant(&bound, loop_id) {
            return None;
        }
        let start = iv.start()?.clone();
        let step = iv.step()?.as_constant()?;

        match (step, predicate) {
            (1, CmpPredicate::Slt | CmpPredicate::Ne) => Some(SymExpr::sub(bound, start)),
            (1, CmpPredicate::Sle) => Some(SymExpr::add([
                SymExpr::sub(bound, start),
                SymExpr::Constant(1),
            ])),
            (-1, CmpPredicate::Sgt | CmpPredicate::Ne) => Some(SymExpr::sub(start, bound)),
            (-1, CmpPredicate::Sge) => Some(SymExpr::add([
                SymExpr::sub(start, bound),
                SymExpr::Constant(1),
            ])),
            _ => None,
        }
    }
}

fn negate(predicate: CmpPredicate) -> CmpPredicate {
    match predicate {
        CmpPredicate::Eq => CmpPredicate::Ne,
        CmpPredicate::Ne => CmpPredicate::Eq,
        CmpPredicate::Slt => CmpPredicate::Sge,
        CmpPredicate::Sle => CmpPredicate::Sgt,
        CmpPredicate::Sgt => CmpPredicate::Sle,
        CmpPredicate::Sge => CmpPredicate::Slt,
    }
}

fn swap(predicate: CmpPredicate) -> CmpPredicate {
    match predicate {
        CmpPredicate::Slt => CmpPredicate::Sgt,
        CmpPredicate::Sle => CmpPredicate::Sge,
        CmpPredicate::Sgt => CmpPredicate::Slt,
        CmpPredicate::Sge => CmpPredicate::Sle,
        other => other,
    }
}

impl AffineEvolution {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes value expressions and backedge-taken counts for `func`.
    #[must_use]
    pub fn analyze(func: &Function, forest: &LoopForest) -> Self {
        let mut defs = HashMap::new();
        for block in func.blocks() {
            for phi in block.phi_nodes() {
                defs.insert(phi.result(), ValueDef::Phi(block.id(), phi.clone()));
            }
            for inst in block.instructions() {
                if let Some(dest) = inst.op().dest() {
                    defs.insert(dest, ValueDef::Op(block.id(), inst.op().clone()));
                }
            }
        }

        let mut analyzer = Analyzer {
            func,
            forest,
            defs,
            values: HashMap::new(),
            in_progress: HashSet::new(),
        };

        let all: Vec<ValueId> = analyzer.defs.keys().copied().collect();
        for value in all {
            analyzer.value(value);
        }

        let mut trip_counts = HashMap::new();
        let mut parents = HashMap::new();
        for info in forest.iter() {
            let count = analyzer.trip_count(info.id);
            trace!(
                "{}: backedge-taken count of {}: {}",
                func.name(),
                info.id,
                count.as_ref().map_or_else(|| "unknown".to_string(), ToString::to_string)
            );
            trip_counts.insert(info.id, count);
            parents.insert(info.id, info.parent);
        }

        Self {
            values: analyzer.values,
            trip_counts,
            parents,
        }
    }

    /// Overrides the backedge-taken count of `loop_id`.
    pub fn set_backedge_taken_count(&mut self, loop_id: LoopId, count: Option<SymExpr>) {
        self.trip_counts.insert(loop_id, count);
    }

    /// Overrides the expression of `value`.
    pub fn set_value(&mut self, value: ValueId, expr: SymExpr) {
        self.values.insert(value, expr);
    }

    /// The expression recorded for `value`, or the value itself.
    #[must_use]
    pub fn value_expr(&self, value: ValueId) -> SymExpr {
        self.values
            .get(&value)
            .cloned()
            .unwrap_or(SymExpr::Unknown(value))
    }

    fn contains_loop(&self, outer: LoopId, inner: LoopId) -> bool {
        let mut current = Some(inner);
        while let Some(l) = current {
            if l == outer {
                return true;
            }
            current = self.parents.get(&l).copied().flatten();
        }
        false
    }
}

/// Evaluates recurrences of loops that do not enclose the scope at their
/// exit value.
struct AtScope<'a> {
    evolution: &'a AffineEvolution,
    scope: LoopId,
}

impl ExprRewriter for AtScope<'_> {
    fn visit_add_rec(&mut self, operands: &[SymExpr], loop_id: LoopId) -> SymExpr {
        let operands: Vec<SymExpr> = operands.iter().map(|op| self.visit(op)).collect();
        let rec = SymExpr::add_rec(operands, loop_id);
        if self.evolution.contains_loop(loop_id, self.scope) || !rec.is_affine() {
            return rec;
        }
        match (
            rec.start(),
            rec.step(),
            self.evolution.backedge_taken_count(loop_id),
        ) {
            (Some(start), Some(step), Some(count)) => {
                SymExpr::add([start.clone(), SymExpr::mul([step, count])])
            }
            _ => rec,
        }
    }
}

/// Moves recurrences of a folded loop onto the surviving loop.
struct Relabel {
    from: LoopId,
    to: LoopId,
}

impl ExprRewriter for Relabel {
    fn visit_add_rec(&mut self, operands: &[SymExpr], loop_id: LoopId) -> SymExpr {
        let operands = operands.iter().map(|op| self.visit(op)).collect();
        let loop_id = if loop_id == self.from { self.to } else { loop_id };
        SymExpr::add_rec(operands, loop_id)
    }
}

impl ScalarEvolution for AffineEvolution {
    fn backedge_taken_count(&self, loop_id: LoopId) -> Option<SymExpr> {
        self.trip_counts.get(&loop_id).cloned().flatten()
    }

    fn has_loop_invariant_backedge_taken_count(&self, loop_id: LoopId) -> bool {
        self.trip_counts
            .get(&loop_id)
            .is_some_and(Option::is_some)
    }

    fn scev_at_scope(&self, operand: &Operand, loop_id: LoopId) -> Option<SymExpr> {
        let expr = match operand {
            Operand::Const(c) => SymExpr::Constant(*c),
            Operand::Value(v) => self.value_expr(*v),
            Operand::Undef => return None,
        };
        let mut at_scope = AtScope {
            evolution: self,
            scope: loop_id,
        };
        Some(at_scope.visit(&expr))
    }

    fn forget_loop(&mut self, erased: LoopId, survivor: LoopId) {
        let mut relabel = Relabel {
            from: erased,
            to: survivor,
        };
        for expr in self.values.values_mut() {
            if expr.loops().contains(&erased) {
                *expr = relabel.visit(expr);
            }
        }
        self.trip_counts.remove(&erased);
        self.parents.remove(&erased);
        for parent in self.parents.values_mut() {
            if *parent == Some(erased) {
                *parent = Some(survivor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{adjacent_loops_with_bounds, nested_pair, two_adjacent_loops};

    #[test]
    fn test_unit_stride_trip_count() {
        let func = two_adjacent_loops();
        let forest = LoopForest::analyze(&func);
        let se = AffineEvolution::analyze(&func, &forest);
        let top = forest.top_level();

        let n = func.arguments()[0];
        let expected = SymExpr::add([SymExpr::Unknown(n), SymExpr::Constant(-1)]);
        assert_eq!(se.backedge_taken_count(top[0]), Some(expected.clone()));
        assert_eq!(se.backedge_taken_count(top[1]), Some(expected));
        assert!(se.has_loop_invariant_backedge_taken_count(top[0]));
    }

    #[test]
    fn test_distinct_bounds_give_distinct_counts() {
        let func = adjacent_loops_with_bounds(0, 1);
        let forest = LoopForest::analyze(&func);
        let se = AffineEvolution::analyze(&func, &forest);
        let top = forest.top_level();
        assert_ne!(se.backedge_taken_count(top[0]), se.backedge_taken_count(top[1]));
    }

    #[test]
    fn test_induction_variable_is_recurrence() {
        let func = two_adjacent_loops();
        let forest = LoopForest::analyze(&func);
        let se = AffineEvolution::analyze(&func, &forest);
        let first = forest.get(forest.top_level()[0]).unwrap();
        let header = func.block(first.header).unwrap();
        let iv = header.phi_nodes()[0].result();

        let expr = se.scev_at_scope(&Operand::Value(iv), first.id).unwrap();
        assert!(expr.is_affine());
        assert_eq!(expr.rec_loop(), Some(first.id));
        assert_eq!(expr.step(), Some(SymExpr::Constant(1)));
        assert!(se.is_known_positive(&expr.step().unwrap()));
    }

    #[test]
    fn test_forget_loop_relabels() {
        let func = two_adjacent_loops();
        let forest = LoopForest::analyze(&func);
        let mut se = AffineEvolution::analyze(&func, &forest);
        let top = forest.top_level();
        let second = forest.get(top[1]).unwrap();
        let iv = func.block(second.header).unwrap().phi_nodes()[0].result();

        se.forget_loop(top[1], top[0]);

        assert_eq!(se.value_expr(iv).rec_loop(), Some(top[0]));
        assert!(!se.has_loop_invariant_backedge_taken_count(top[1]));
    }

    #[test]
    fn test_nested_loops_have_counts() {
        let func = nested_pair();
        let forest = LoopForest::analyze(&func);
        let se = AffineEvolution::analyze(&func, &forest);
        let outer = forest.top_level()[0];
        for &inner in forest.children(outer) {
            assert!(se.has_loop_invariant_backedge_taken_count(inner));
        }
        assert!(se.has_loop_invariant_backedge_taken_count(outer));
    }
}
