//! Canonical symbolic expressions.
//!
//! Every [`SymExpr`] built through the constructors is in canonical form:
//! nested sums and products are flattened, constants are folded and placed
//! first, like terms are combined, and operands are sorted. Two expressions
//! describing the same polynomial in the same way therefore compare equal
//! with the derived `PartialEq`, which is what trip-count identity relies on.
//!
//! Recurrences absorb loop-invariant terms the usual way:
//!
//! ```text
//! {a,+,b}<L> + c   =>  {a + c,+,b}<L>
//! {a,+,b}<L> * c   =>  {a * c,+,b * c}<L>
//! ```

use std::{collections::BTreeMap, fmt};

use crate::analysis::{cfg::LoopId, ssa::ValueId};

/// A symbolic integer expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymExpr {
    /// Integer constant.
    Constant(i64),
    /// Opaque SSA value.
    Unknown(ValueId),
    /// Sum of two or more terms.
    Add(Vec<SymExpr>),
    /// Product of two or more factors.
    Mul(Vec<SymExpr>),
    /// Add-recurrence `{operands[0],+,operands[1],+,...}<loop_id>`.
    AddRec {
        /// Start, step, and higher-order steps.
        operands: Vec<SymExpr>,
        /// The loop the recurrence advances with.
        loop_id: LoopId,
    },
}

impl SymExpr {
    /// The constant `value`.
    #[must_use]
    pub const fn constant(value: i64) -> Self {
        SymExpr::Constant(value)
    }

    /// An opaque value.
    #[must_use]
    pub const fn unknown(value: ValueId) -> Self {
        SymExpr::Unknown(value)
    }

    /// Canonical sum of `terms`.
    #[must_use]
    pub fn add(terms: impl IntoIterator<Item = SymExpr>) -> Self {
        let mut constant: i64 = 0;
        let mut recs: BTreeMap<LoopId, Vec<SymExpr>> = BTreeMap::new();
        let mut others: BTreeMap<SymExpr, i64> = BTreeMap::new();

        let mut stack: Vec<SymExpr> = terms.into_iter().collect();
        while let Some(term) = stack.pop() {
            match term {
                SymExpr::Constant(c) => constant = constant.wrapping_add(c),
                SymExpr::Add(inner) => stack.extend(inner),
                SymExpr::AddRec { operands, loop_id } => {
                    let acc = recs.entry(loop_id).or_default();
                    for (i, op) in operands.into_iter().enumerate() {
                        if i < acc.len() {
                            let prev = std::mem::replace(&mut acc[i], SymExpr::Constant(0));
                            acc[i] = SymExpr::add([prev, op]);
                        } else {
                            acc.push(op);
                        }
                    }
                }
                other => {
                    let (coeff, rest) = other.split_coefficient();
                    let entry = others.entry(rest).or_insert(0);
                    *entry = entry.wrapping_add(coeff);
                }
            }
        }

        let mut result: Vec<SymExpr> = others
            .into_iter()
            .filter(|(_, coeff)| *coeff != 0)
            .map(|(rest, coeff)| SymExpr::scaled(coeff, rest))
            .collect();

        let (mut rec_terms, collapsed): (Vec<SymExpr>, Vec<SymExpr>) = recs
            .into_iter()
            .map(|(loop_id, operands)| SymExpr::add_rec(operands, loop_id))
            .partition(|r| matches!(r, SymExpr::AddRec { .. }));

        if !collapsed.is_empty() {
            result.extend(collapsed);
            result.extend(rec_terms);
            result.push(SymExpr::Constant(constant));
            return SymExpr::add(result);
        }

        if rec_terms.len() == 1 {
            if let Some(SymExpr::AddRec {
                mut operands,
                loop_id,
            }) = rec_terms.pop()
            {
                if let Some(first) = operands.first_mut() {
                    let start = std::mem::replace(first, SymExpr::Constant(0));
                    result.push(start);
                    result.push(SymExpr::Constant(constant));
                    *first = SymExpr::add(result);
                    return SymExpr::AddRec { operands, loop_id };
                }
            }
        }

        result.extend(rec_terms);
        SymExpr::from_terms(result, constant)
    }

    /// Canonical product of `factors`.
    #[must_use]
    pub fn mul(factors: impl IntoIterator<Item = SymExpr>) -> Self {
        let mut constant: i64 = 1;
        let mut rest: Vec<SymExpr> = Vec::new();

        let mut stack: Vec<SymExpr> = factors.into_iter().collect();
        while let Some(factor) = stack.pop() {
            match factor {
                SymExpr::Constant(c) => constant = constant.wrapping_mul(c),
                SymExpr::Mul(inner) => stack.extend(inner),
                other => rest.push(other),
            }
        }

        if constant == 0 || rest.is_empty() {
            return SymExpr::Constant(if rest.is_empty() { constant } else { 0 });
        }

        let rec_positions: Vec<usize> = rest
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f, SymExpr::AddRec { .. }))
            .map(|(i, _)| i)
            .collect();
        if let [pos] = rec_positions.as_slice() {
            if let SymExpr::AddRec { operands, loop_id } = rest.remove(*pos) {
                let mut scale = rest;
                scale.push(SymExpr::Constant(constant));
                let operands = operands
                    .into_iter()
                    .map(|op| {
                        let mut factors = scale.clone();
                        factors.push(op);
                        SymExpr::mul(factors)
                    })
                    .collect();
                return SymExpr::add_rec(operands, loop_id);
            }
        }

        if rest.len() == 1 {
            let single = rest.remove(0);
            return match single {
                SymExpr::Add(terms) if constant != 1 => SymExpr::add(
                    terms
                        .into_iter()
                        .map(|t| SymExpr::mul([SymExpr::Constant(constant), t])),
                ),
                other if constant == 1 => other,
                other => SymExpr::Mul(vec![SymExpr::Constant(constant), other]),
            };
        }

        rest.sort();
        if constant != 1 {
            rest.insert(0, SymExpr::Constant(constant));
        }
        SymExpr::Mul(rest)
    }

    /// Canonical `lhs - rhs`.
    #[must_use]
    pub fn sub(lhs: SymExpr, rhs: SymExpr) -> Self {
        SymExpr::add([lhs, rhs.negate()])
    }

    /// Canonical `-self`.
    #[must_use]
    pub fn negate(self) -> Self {
        SymExpr::mul([SymExpr::Constant(-1), self])
    }

    /// Canonical add-recurrence; trailing zero steps are dropped and a
    /// recurrence without steps collapses to its start.
    #[must_use]
    pub fn add_rec(mut operands: Vec<SymExpr>, loop_id: LoopId) -> Self {
        while operands.len() > 1 && operands.last().is_some_and(SymExpr::is_zero) {
            operands.pop();
        }
        match operands.len() {
            0 => SymExpr::Constant(0),
            1 => operands.remove(0),
            _ => SymExpr::AddRec { operands, loop_id },
        }
    }

    /// Affine recurrence `{start,+,step}<loop_id>`.
    #[must_use]
    pub fn affine(start: SymExpr, step: SymExpr, loop_id: LoopId) -> Self {
        SymExpr::add_rec(vec![start, step], loop_id)
    }

    fn scaled(coeff: i64, rest: SymExpr) -> Self {
        if coeff == 1 {
            return rest;
        }
        match rest {
            SymExpr::Mul(mut factors) => {
                factors.insert(0, SymExpr::Constant(coeff));
                SymExpr::Mul(factors)
            }
            other => SymExpr::Mul(vec![SymExpr::Constant(coeff), other]),
        }
    }

    fn split_coefficient(self) -> (i64, SymExpr) {
        match self {
            SymExpr::Mul(mut factors) => match factors.first() {
                Some(SymExpr::Constant(c)) => {
                    let c = *c;
                    factors.remove(0);
                    if factors.len() == 1 {
                        (c, factors.remove(0))
                    } else {
                        (c, SymExpr::Mul(factors))
                    }
                }
                _ => (1, SymExpr::Mul(factors)),
            },
            other => (1, other),
        }
    }

    fn from_terms(mut terms: Vec<SymExpr>, constant: i64) -> Self {
        terms.sort();
        if constant != 0 {
            terms.insert(0, SymExpr::Constant(constant));
        }
        match terms.len() {
            0 => SymExpr::Constant(0),
            1 => terms.remove(0),
            _ => SymExpr::Add(terms),
        }
    }

    /// Returns true for the constant zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, SymExpr::Constant(0))
    }

    /// The constant value, if this is a constant.
    #[must_use]
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            SymExpr::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// The loop of an add-recurrence.
    #[must_use]
    pub fn rec_loop(&self) -> Option<LoopId> {
        match self {
            SymExpr::AddRec { loop_id, .. } => Some(*loop_id),
            _ => None,
        }
    }

    /// Returns true for recurrences with exactly a start and a step.
    #[must_use]
    pub fn is_affine(&self) -> bool {
        matches!(self, SymExpr::AddRec { operands, .. } if operands.len() == 2)
    }

    /// Start of a recurrence.
    #[must_use]
    pub fn start(&self) -> Option<&SymExpr> {
        match self {
            SymExpr::AddRec { operands, .. } => operands.first(),
            _ => None,
        }
    }

    /// Step of a recurrence: `{b,+,c,...}` for `{a,+,b,+,c,...}`.
    #[must_use]
    pub fn step(&self) -> Option<SymExpr> {
        match self {
            SymExpr::AddRec { operands, loop_id } => {
                let rest = operands.get(1..)?;
                Some(SymExpr::add_rec(rest.to_vec(), *loop_id))
            }
            _ => None,
        }
    }

    /// Direct sub-expressions.
    #[must_use]
    pub fn operands(&self) -> &[SymExpr] {
        match self {
            SymExpr::Constant(_) | SymExpr::Unknown(_) => &[],
            SymExpr::Add(ops) | SymExpr::Mul(ops) => ops,
            SymExpr::AddRec { operands, .. } => operands,
        }
    }

    /// Returns true if `pred` holds for this expression or any
    /// sub-expression.
    pub fn contains(&self, pred: &mut impl FnMut(&SymExpr) -> bool) -> bool {
        pred(self) || self.operands().iter().any(|op| op.contains(pred))
    }

    /// Every loop with a recurrence somewhere in the expression.
    #[must_use]
    pub fn loops(&self) -> Vec<LoopId> {
        let mut loops = Vec::new();
        self.contains(&mut |e| {
            if let Some(l) = e.rec_loop() {
                if !loops.contains(&l) {
                    loops.push(l);
                }
            }
            false
        });
        loops
    }

    /// Every opaque value referenced by the expression.
    #[must_use]
    pub fn unknowns(&self) -> Vec<ValueId> {
        let mut values = Vec::new();
        self.contains(&mut |e| {
            if let SymExpr::Unknown(v) = e {
                if !values.contains(v) {
                    values.push(*v);
                }
            }
            false
        });
        values
    }
}

impl From<i64> for SymExpr {
    fn from(value: i64) -> Self {
        SymExpr::Constant(value)
    }
}

impl From<ValueId> for SymExpr {
    fn from(value: ValueId) -> Self {
        SymExpr::Unknown(value)
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, ops: &[SymExpr], sep: &str| -> fmt::Result {
            f.write_str("(")?;
            for (i, op) in ops.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{op}")?;
            }
            f.write_str(")")
        };
        match self {
            SymExpr::Constant(c) => write!(f, "{c}"),
            SymExpr::Unknown(v) => write!(f, "{v}"),
            SymExpr::Add(ops) => join(f, ops, " + "),
            SymExpr::Mul(ops) => join(f, ops, " * "),
            SymExpr::AddRec { operands, loop_id } => {
                f.write_str("{")?;
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",+,")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, "}}<{loop_id}>")
            }
        }
    }
}

/// Bottom-up rewriting of expressions.
///
/// The default methods rebuild every node through the canonicalizing
/// constructors; implementors override the node kinds they care about.
pub trait ExprRewriter {
    /// Rewrites `expr`.
    fn visit(&mut self, expr: &SymExpr) -> SymExpr {
        match expr {
            SymExpr::Constant(_) | SymExpr::Unknown(_) => expr.clone(),
            SymExpr::Add(ops) => SymExpr::add(ops.iter().map(|op| self.visit(op))),
            SymExpr::Mul(ops) => SymExpr::mul(ops.iter().map(|op| self.visit(op))),
            SymExpr::AddRec { operands, loop_id } => self.visit_add_rec(operands, *loop_id),
        }
    }

    /// Rewrites a recurrence; the default rewrites its operands.
    fn visit_add_rec(&mut self, operands: &[SymExpr], loop_id: LoopId) -> SymExpr {
        let operands = operands.iter().map(|op| self.visit(op)).collect();
        SymExpr::add_rec(operands, loop_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: usize) -> SymExpr {
        SymExpr::Unknown(ValueId::new(n))
    }

    #[test]
    fn test_add_is_order_independent() {
        let a = SymExpr::add([v(1), SymExpr::constant(3), v(0)]);
        let b = SymExpr::add([v(0), v(1), SymExpr::constant(3)]);
        assert_eq!(a, b);
        assert_eq!(
            a,
            SymExpr::Add(vec![SymExpr::Constant(3), v(0), v(1)])
        );
    }

    #[test]
    fn test_empty_recurrence_has_no_step() {
        let empty = SymExpr::AddRec {
            operands: Vec::new(),
            loop_id: LoopId::new(0),
        };
        assert_eq!(empty.step(), None);
        assert_eq!(empty.start(), None);
        assert_eq!(SymExpr::add([empty, v(1)]), v(1));
    }

    #[test]
    fn test_like_terms_cancel() {
        let n = v(4);
        let diff = SymExpr::sub(SymExpr::add([n.clone(), SymExpr::constant(1)]), n);
        assert_eq!(diff, SymExpr::Constant(1));

        let twice = SymExpr::add([v(2), v(2)]);
        assert_eq!(twice, SymExpr::Mul(vec![SymExpr::Constant(2), v(2)]));
    }

    #[test]
    fn test_recurrence_folding() {
        let l = LoopId::new(0);
        let iv = SymExpr::affine(SymExpr::constant(0), SymExpr::constant(1), l);
        let addr = SymExpr::add([v(9), SymExpr::mul([SymExpr::constant(4), iv])]);
        assert_eq!(
            addr,
            SymExpr::AddRec {
                operands: vec![v(9), SymExpr::Constant(4)],
                loop_id: l
            }
        );
        assert_eq!(addr.step(), Some(SymExpr::Constant(4)));
        assert_eq!(addr.to_string(), "{%9,+,4}<loop0>");
    }

    #[test]
    fn test_zero_step_collapses() {
        let l = LoopId::new(1);
        let rec = SymExpr::affine(v(0), SymExpr::constant(0), l);
        assert_eq!(rec, v(0));
    }

    #[test]
    fn test_constant_distributes_over_sum() {
        let e = SymExpr::mul([SymExpr::constant(2), SymExpr::add([v(0), SymExpr::constant(1)])]);
        assert_eq!(
            e,
            SymExpr::Add(vec![
                SymExpr::Constant(2),
                SymExpr::Mul(vec![SymExpr::Constant(2), v(0)])
            ])
        );
    }

    struct Shift;

    impl ExprRewriter for Shift {
        fn visit_add_rec(&mut self, operands: &[SymExpr], _loop_id: LoopId) -> SymExpr {
            let operands = operands.iter().map(|op| self.visit(op)).collect();
            SymExpr::add_rec(operands, LoopId::new(7))
        }
    }

    #[test]
    fn test_rewriter_rebuilds_canonically() {
        let l = LoopId::new(0);
        let e = SymExpr::add([
            v(1),
            SymExpr::affine(SymExpr::constant(0), SymExpr::constant(1), l),
        ]);
        let shifted = Shift.visit(&e);
        assert_eq!(shifted.loops(), vec![LoopId::new(7)]);
        assert_eq!(shifted.unknowns(), vec![ValueId::new(1)]);
    }
}
