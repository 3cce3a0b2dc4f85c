//! Operations carried by IR instructions.
//!
//! The operation set is deliberately small. Loop fusion only needs to know
//! which instructions touch memory (and how), which may throw, which compute
//! guard conditions, and where the terminators lead. Arithmetic exists so that
//! tests can express induction variables and address computations.

use std::fmt;

use bitflags::bitflags;

use crate::{
    analysis::ssa::{Operand, ValueId},
    utils::graph::NodeId,
};

bitflags! {
    /// Side effects of a call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryEffects: u8 {
        /// The call may read memory.
        const READ = 0b001;
        /// The call may write memory.
        const WRITE = 0b010;
        /// The call may unwind.
        const THROW = 0b100;
    }
}

/// Integer binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `left + right`
    Add,
    /// `left - right`
    Sub,
    /// `left * right`
    Mul,
    /// `left & right`
    And,
    /// `left | right`
    Or,
    /// `left ^ right`
    Xor,
    /// `left << right`
    Shl,
}

/// Signed integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPredicate {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// signed `<`
    Slt,
    /// signed `<=`
    Sle,
    /// signed `>`
    Sgt,
    /// signed `>=`
    Sge,
}

/// An IR operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `dest = value`
    Const {
        /// Result value.
        dest: ValueId,
        /// Immediate.
        value: i64,
    },
    /// `dest = left <op> right`
    Binary {
        /// Result value.
        dest: ValueId,
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Operand,
        /// Right operand.
        right: Operand,
    },
    /// `dest = left <predicate> right`
    Compare {
        /// Result value.
        dest: ValueId,
        /// Comparison predicate.
        predicate: CmpPredicate,
        /// Left operand.
        left: Operand,
        /// Right operand.
        right: Operand,
    },
    /// `dest = *address`
    Load {
        /// Result value.
        dest: ValueId,
        /// Address operand.
        address: Operand,
        /// Volatile accesses must not be reordered.
        volatile: bool,
    },
    /// `*address = value`
    Store {
        /// Address operand.
        address: Operand,
        /// Stored value.
        value: Operand,
        /// Volatile accesses must not be reordered.
        volatile: bool,
    },
    /// Call to an external function with declared effects.
    Call {
        /// Result value, if the callee returns one.
        dest: Option<ValueId>,
        /// Callee name.
        callee: String,
        /// Arguments.
        args: Vec<Operand>,
        /// Declared side effects.
        effects: MemoryEffects,
    },
    /// Unconditional branch.
    Jump {
        /// Branch target.
        target: NodeId,
    },
    /// Two-way conditional branch.
    Branch {
        /// Condition operand.
        condition: Operand,
        /// Successor taken when the condition is true (successor 0).
        true_target: NodeId,
        /// Successor taken when the condition is false (successor 1).
        false_target: NodeId,
    },
    /// Function return.
    Return {
        /// Returned value, if any.
        value: Option<Operand>,
    },
    /// Control never reaches this point.
    Unreachable,
}

impl Op {
    /// Returns the value defined by this operation.
    #[must_use]
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Op::Const { dest, .. }
            | Op::Binary { dest, .. }
            | Op::Compare { dest, .. }
            | Op::Load { dest, .. } => Some(*dest),
            Op::Call { dest, .. } => *dest,
            _ => None,
        }
    }

    /// Returns all operands read by this operation, in order.
    #[must_use]
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Op::Const { .. } | Op::Jump { .. } | Op::Unreachable => Vec::new(),
            Op::Binary { left, right, .. } | Op::Compare { left, right, .. } => {
                vec![*left, *right]
            }
            Op::Load { address, .. } => vec![*address],
            Op::Store { address, value, .. } => vec![*address, *value],
            Op::Call { args, .. } => args.clone(),
            Op::Branch { condition, .. } => vec![*condition],
            Op::Return { value } => value.iter().copied().collect(),
        }
    }

    /// Returns true for block terminators.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Jump { .. } | Op::Branch { .. } | Op::Return { .. } | Op::Unreachable
        )
    }

    /// Returns the successor blocks of a terminator, in successor-index order.
    ///
    /// A branch whose two targets coincide yields the target twice.
    #[must_use]
    pub fn successors(&self) -> Vec<NodeId> {
        match self {
            Op::Jump { target } => vec![*target],
            Op::Branch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            _ => Vec::new(),
        }
    }

    /// Rewrites every successor equal to `old` into `new`.
    ///
    /// Returns the number of rewritten targets.
    pub fn replace_successor(&mut self, old: NodeId, new: NodeId) -> usize {
        let mut replaced = 0;
        let mut rewrite = |target: &mut NodeId| {
            if *target == old {
                *target = new;
                replaced += 1;
            }
        };
        match self {
            Op::Jump { target } => rewrite(target),
            Op::Branch {
                true_target,
                false_target,
                ..
            } => {
                rewrite(true_target);
                rewrite(false_target);
            }
            _ => {}
        }
        replaced
    }

    /// Returns the address operand of a load or store.
    #[must_use]
    pub fn pointer_operand(&self) -> Option<Operand> {
        match self {
            Op::Load { address, .. } | Op::Store { address, .. } => Some(*address),
            _ => None,
        }
    }

    /// Returns true if the operation may read memory.
    #[must_use]
    pub fn may_read_memory(&self) -> bool {
        match self {
            Op::Load { .. } => true,
            Op::Store { volatile, .. } => *volatile,
            Op::Call { effects, .. } => effects.contains(MemoryEffects::READ),
            _ => false,
        }
    }

    /// Returns true if the operation may write memory.
    #[must_use]
    pub fn may_write_memory(&self) -> bool {
        match self {
            Op::Store { .. } => true,
            Op::Load { volatile, .. } => *volatile,
            Op::Call { effects, .. } => effects.contains(MemoryEffects::WRITE),
            _ => false,
        }
    }

    /// Returns true if the operation may unwind.
    #[must_use]
    pub fn may_throw(&self) -> bool {
        matches!(self, Op::Call { effects, .. } if effects.contains(MemoryEffects::THROW))
    }

    /// Returns true for volatile loads and stores.
    #[must_use]
    pub fn is_volatile(&self) -> bool {
        matches!(
            self,
            Op::Load { volatile: true, .. } | Op::Store { volatile: true, .. }
        )
    }

    /// Structural identity ignoring the defined value.
    ///
    /// Two operations are identical when they have the same kind, the same
    /// flags and the same operands in the same order.
    #[must_use]
    pub fn is_identical_to(&self, other: &Op) -> bool {
        match (self, other) {
            (Op::Const { value: a, .. }, Op::Const { value: b, .. }) => a == b,
            (
                Op::Binary {
                    op: a,
                    left: al,
                    right: ar,
                    ..
                },
                Op::Binary {
                    op: b,
                    left: bl,
                    right: br,
                    ..
                },
            ) => a == b && al == bl && ar == br,
            (
                Op::Compare {
                    predicate: a,
                    left: al,
                    right: ar,
                    ..
                },
                Op::Compare {
                    predicate: b,
                    left: bl,
                    right: br,
                    ..
                },
            ) => a == b && al == bl && ar == br,
            (
                Op::Load {
                    address: a,
                    volatile: av,
                    ..
                },
                Op::Load {
                    address: b,
                    volatile: bv,
                    ..
                },
            ) => a == b && av == bv,
            (
                Op::Call {
                    callee: a,
                    args: aa,
                    effects: ae,
                    ..
                },
                Op::Call {
                    callee: b,
                    args: ba,
                    effects: be,
                    ..
                },
            ) => a == b && aa == ba && ae == be,
            _ => self == other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
        };
        f.write_str(name)
    }
}

impl fmt::Display for CmpPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CmpPredicate::Eq => "eq",
            CmpPredicate::Ne => "ne",
            CmpPredicate::Slt => "slt",
            CmpPredicate::Sle => "sle",
            CmpPredicate::Sgt => "sgt",
            CmpPredicate::Sge => "sge",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Const { dest, value } => write!(f, "{dest} = const {value}"),
            Op::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "{dest} = {op} {left}, {right}"),
            Op::Compare {
                dest,
                predicate,
                left,
                right,
            } => write!(f, "{dest} = cmp {predicate} {left}, {right}"),
            Op::Load {
                dest,
                address,
                volatile,
            } => {
                let kind = if *volatile { "load volatile" } else { "load" };
                write!(f, "{dest} = {kind} {address}")
            }
            Op::Store {
                address,
                value,
                volatile,
            } => {
                let kind = if *volatile { "store volatile" } else { "store" };
                write!(f, "{kind} {address}, {value}")
            }
            Op::Call {
                dest, callee, args, ..
            } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Op::Jump { target } => write!(f, "br {target}"),
            Op::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "br {condition}, {true_target}, {false_target}"),
            Op::Return { value: Some(value) } => write!(f, "ret {value}"),
            Op::Return { value: None } => f.write_str("ret"),
            Op::Unreachable => f.write_str("unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_classification() {
        let load = Op::Load {
            dest: ValueId::new(1),
            address: Operand::Value(ValueId::new(0)),
            volatile: false,
        };
        assert!(load.may_read_memory());
        assert!(!load.may_write_memory());
        assert!(!load.is_volatile());

        let call = Op::Call {
            dest: None,
            callee: "log".into(),
            args: vec![],
            effects: MemoryEffects::WRITE | MemoryEffects::THROW,
        };
        assert!(call.may_write_memory());
        assert!(!call.may_read_memory());
        assert!(call.may_throw());
    }

    #[test]
    fn test_replace_successor_counts_both_edges() {
        let mut branch = Op::Branch {
            condition: Operand::Value(ValueId::new(0)),
            true_target: NodeId::new(1),
            false_target: NodeId::new(1),
        };
        assert_eq!(branch.replace_successor(NodeId::new(1), NodeId::new(4)), 2);
        assert_eq!(branch.successors(), vec![NodeId::new(4), NodeId::new(4)]);
        assert_eq!(branch.replace_successor(NodeId::new(9), NodeId::new(2)), 0);
    }

    #[test]
    fn test_identical_compare_ignores_dest() {
        let a = Op::Compare {
            dest: ValueId::new(3),
            predicate: CmpPredicate::Slt,
            left: Operand::Const(0),
            right: Operand::Value(ValueId::new(0)),
        };
        let b = Op::Compare {
            dest: ValueId::new(7),
            predicate: CmpPredicate::Slt,
            left: Operand::Const(0),
            right: Operand::Value(ValueId::new(0)),
        };
        let c = Op::Compare {
            dest: ValueId::new(8),
            predicate: CmpPredicate::Sle,
            left: Operand::Const(0),
            right: Operand::Value(ValueId::new(0)),
        };
        assert!(a.is_identical_to(&b));
        assert!(!a.is_identical_to(&c));
    }
}
