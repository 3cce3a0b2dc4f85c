//! Linear normalization used to prove predicates between expressions.
//!
//! An expression is flattened into `constant + Σ coeff·term`, where a term is
//! an opaque value, the canonical induction variable of a loop, or an opaque
//! non-linear sub-expression. An affine recurrence `{a,+,s}<L>` with constant
//! `s` becomes `a + s·iv(L)`, and every induction variable is known to be
//! non-negative. A difference is provably non-negative when its constant is
//! non-negative and every remaining term is an induction variable with a
//! non-negative coefficient.

use std::collections::BTreeMap;

use crate::analysis::{cfg::LoopId, scev::SymExpr, ssa::ValueId};

/// A term of a linear form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LinearTerm {
    Symbol(ValueId),
    Iv(LoopId),
    Opaque(SymExpr),
}

/// `constant + Σ coeff·term`, with no zero coefficients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LinearForm {
    constant: i64,
    terms: BTreeMap<LinearTerm, i64>,
}

/// Sign information proved for a linear form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sign {
    Zero,
    Positive,
    NonNegative,
    Negative,
    NonPositive,
    Unknown,
}

impl LinearForm {
    fn constant(value: i64) -> Self {
        Self {
            constant: value,
            terms: BTreeMap::new(),
        }
    }

    fn term(term: LinearTerm) -> Self {
        let mut form = Self::default();
        form.terms.insert(term, 1);
        form
    }

    /// Normalizes `expr`; `None` on arithmetic overflow.
    pub(crate) fn from_expr(expr: &SymExpr) -> Option<Self> {
        match expr {
            SymExpr::Constant(c) => Some(Self::constant(*c)),
            SymExpr::Unknown(v) => Some(Self::term(LinearTerm::Symbol(*v))),
            SymExpr::Add(ops) => {
                let mut sum = Self::default();
                for op in ops {
                    sum = sum.plus(&Self::from_expr(op)?)?;
                }
                Some(sum)
            }
            SymExpr::Mul(ops) => {
                let mut scale: i64 = 1;
                let mut variable = Vec::new();
                for op in ops {
                    match op.as_constant() {
                        Some(c) => scale = scale.checked_mul(c)?,
                        None => variable.push(op.clone()),
                    }
                }
                match variable.len() {
                    0 => Some(Self::constant(scale)),
                    1 => Self::from_expr(&variable[0])?.scaled(scale),
                    _ => Self::term(LinearTerm::Opaque(SymExpr::Mul(variable))).scaled(scale),
                }
            }
            SymExpr::AddRec { operands, loop_id } => match operands.as_slice() {
                [start, SymExpr::Constant(step)] => Self::from_expr(start)?
                    .plus(&Self::term(LinearTerm::Iv(*loop_id)).scaled(*step)?),
                _ => Some(Self::term(LinearTerm::Opaque(expr.clone()))),
            },
        }
    }

    fn plus(mut self, other: &Self) -> Option<Self> {
        self.constant = self.constant.checked_add(other.constant)?;
        for (term, coeff) in &other.terms {
            let entry = self.terms.entry(term.clone()).or_insert(0);
            *entry = entry.checked_add(*coeff)?;
        }
        self.terms.retain(|_, c| *c != 0);
        Some(self)
    }

    fn scaled(mut self, factor: i64) -> Option<Self> {
        if factor == 0 {
            return Some(Self::default());
        }
        self.constant = self.constant.checked_mul(factor)?;
        for coeff in self.terms.values_mut() {
            *coeff = coeff.checked_mul(factor)?;
        }
        Some(self)
    }

    /// `self - other`.
    pub(crate) fn minus(self, other: &Self) -> Option<Self> {
        self.plus(&other.clone().scaled(-1)?)
    }

    /// The strongest sign provable for the form.
    pub(crate) fn sign(&self) -> Sign {
        let all_iv = |positive: bool| {
            self.terms.iter().all(|(term, coeff)| {
                matches!(term, LinearTerm::Iv(_))
                    && (if positive { *coeff > 0 } else { *coeff < 0 })
            })
        };
        if self.terms.is_empty() {
            return match self.constant {
                0 => Sign::Zero,
                c if c > 0 => Sign::Positive,
                _ => Sign::Negative,
            };
        }
        if all_iv(true) {
            return if self.constant > 0 {
                Sign::Positive
            } else if self.constant == 0 {
                Sign::NonNegative
            } else {
                Sign::Unknown
            };
        }
        if all_iv(false) {
            return if self.constant < 0 {
                Sign::Negative
            } else if self.constant == 0 {
                Sign::NonPositive
            } else {
                Sign::Unknown
            };
        }
        Sign::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: usize) -> SymExpr {
        SymExpr::Unknown(ValueId::new(n))
    }

    #[test]
    fn test_iv_terms_are_non_negative() {
        let l = LoopId::new(0);
        let wide = SymExpr::affine(v(0), SymExpr::constant(8), l);
        let narrow = SymExpr::affine(v(0), SymExpr::constant(4), l);
        let diff = LinearForm::from_expr(&wide)
            .unwrap()
            .minus(&LinearForm::from_expr(&narrow).unwrap())
            .unwrap();
        assert_eq!(diff.sign(), Sign::NonNegative);
    }

    #[test]
    fn test_symbols_block_proofs() {
        let diff = LinearForm::from_expr(&v(0))
            .unwrap()
            .minus(&LinearForm::from_expr(&v(1)).unwrap())
            .unwrap();
        assert_eq!(diff.sign(), Sign::Unknown);

        let same = LinearForm::from_expr(&v(3))
            .unwrap()
            .minus(&LinearForm::from_expr(&v(3)).unwrap())
            .unwrap();
        assert_eq!(same.sign(), Sign::Zero);
    }

    #[test]
    fn test_overflow_is_not_proved() {
        let big = SymExpr::Mul(vec![SymExpr::Constant(i64::MAX), v(0)]);
        assert!(LinearForm::from_expr(&big)
            .and_then(|f| f.scaled(2))
            .is_none());
    }
}
