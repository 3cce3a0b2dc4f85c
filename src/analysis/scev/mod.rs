//! Scalar evolution: symbolic expressions for integer values and loop trip
//! counts.
//!
//! Loop fusion asks three kinds of questions, all answered through the
//! [`ScalarEvolution`] trait:
//!
//! - how many times does a loop's backedge run ([`ScalarEvolution::backedge_taken_count`])
//! - what does an address look like when viewed from a given loop
//!   ([`ScalarEvolution::scev_at_scope`])
//! - is a relation between two expressions provable
//!   ([`ScalarEvolution::is_known_predicate`])
//!
//! # Key Components
//!
//! - [`SymExpr`] - canonical symbolic expressions with add-recurrences
//! - [`ExprRewriter`] - bottom-up rewriting used to move recurrences between
//!   loops
//! - [`AffineEvolution`] - the table-driven implementation built from a
//!   function and its loop forest
//!
//! # Examples
//!
//! ```rust,ignore
//! use loopfuse::analysis::{AffineEvolution, LoopForest, ScalarEvolution};
//!
//! let forest = LoopForest::analyze(&func);
//! let se = AffineEvolution::analyze(&func, &forest);
//! for id in forest.top_level() {
//!     println!("{id}: {:?}", se.backedge_taken_count(id));
//! }
//! ```

mod evolution;
mod expr;
pub(crate) mod linear;

pub use evolution::AffineEvolution;
pub use expr::{ExprRewriter, SymExpr};

use crate::analysis::{
    cfg::LoopId,
    scev::linear::{LinearForm, Sign},
    ssa::{CmpPredicate, Operand},
};

/// Symbolic oracle consulted by loop fusion.
///
/// Implementations must be conservative: a `false` or `None` answer only
/// blocks a fusion, a wrong `true` miscompiles.
pub trait ScalarEvolution {
    /// Number of times the backedge of `loop_id` is taken, if computable.
    fn backedge_taken_count(&self, loop_id: LoopId) -> Option<SymExpr>;

    /// Returns true if the backedge-taken count is known and invariant.
    fn has_loop_invariant_backedge_taken_count(&self, loop_id: LoopId) -> bool {
        self.backedge_taken_count(loop_id).is_some()
    }

    /// Expression for `operand` as observed inside `loop_id`.
    ///
    /// Recurrences of loops that do not enclose `loop_id` are replaced by
    /// their exit value when it is computable. `None` when the operand has no
    /// expression at all.
    fn scev_at_scope(&self, operand: &Operand, loop_id: LoopId) -> Option<SymExpr>;

    /// Returns true if `lhs <predicate> rhs` is provable for every iteration.
    fn is_known_predicate(&self, predicate: CmpPredicate, lhs: &SymExpr, rhs: &SymExpr) -> bool {
        let Some(diff) = LinearForm::from_expr(lhs)
            .zip(LinearForm::from_expr(rhs))
            .and_then(|(l, r)| l.minus(&r))
        else {
            return false;
        };
        let sign = diff.sign();
        match predicate {
            CmpPredicate::Eq => sign == Sign::Zero,
            CmpPredicate::Ne => matches!(sign, Sign::Positive | Sign::Negative),
            CmpPredicate::Sgt => sign == Sign::Positive,
            CmpPredicate::Sge => matches!(sign, Sign::Zero | Sign::Positive | Sign::NonNegative),
            CmpPredicate::Slt => sign == Sign::Negative,
            CmpPredicate::Sle => matches!(sign, Sign::Zero | Sign::Negative | Sign::NonPositive),
        }
    }

    /// Returns true if `expr` is provably greater than zero.
    fn is_known_positive(&self, expr: &SymExpr) -> bool {
        self.is_known_predicate(CmpPredicate::Sgt, expr, &SymExpr::Constant(0))
    }

    /// Drops everything cached for `erased` after it was folded into
    /// `survivor`.
    fn forget_loop(&mut self, erased: LoopId, survivor: LoopId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::ValueId;

    #[test]
    fn test_default_predicates() {
        let se = AffineEvolution::new();
        let n = SymExpr::Unknown(ValueId::new(0));
        let l = LoopId::new(0);
        let rec = SymExpr::affine(n.clone(), SymExpr::Constant(4), l);
        let shifted = SymExpr::add([rec.clone(), SymExpr::Constant(4)]);

        assert!(se.is_known_predicate(CmpPredicate::Sge, &rec, &rec));
        assert!(se.is_known_predicate(CmpPredicate::Sgt, &shifted, &rec));
        assert!(se.is_known_predicate(CmpPredicate::Sge, &rec, &n));
        assert!(!se.is_known_predicate(CmpPredicate::Sgt, &rec, &n));
        assert!(se.is_known_predicate(CmpPredicate::Slt, &rec, &shifted));
        assert!(!se.is_known_predicate(CmpPredicate::Eq, &rec, &n));
        assert!(se.is_known_positive(&SymExpr::Constant(3)));
        assert!(!se.is_known_positive(&n));
    }
}
