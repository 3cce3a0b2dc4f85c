//! Phi nodes: the merge points of SSA form.
//!
//! A phi at the top of a block selects one incoming value per predecessor.
//! Loop headers use them for loop-carried values (induction variables,
//! reductions); fusion moves them between headers and re-keys their incoming
//! edges when predecessor blocks change.

use std::fmt;

use crate::{
    analysis::ssa::{Operand, ValueId},
    utils::graph::NodeId,
};

/// One incoming (value, predecessor) pair of a phi node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiOperand {
    value: Operand,
    predecessor: NodeId,
}

impl PhiOperand {
    /// Creates an incoming pair.
    #[must_use]
    pub fn new(value: Operand, predecessor: NodeId) -> Self {
        Self { value, predecessor }
    }

    /// The incoming value.
    #[must_use]
    pub fn value(&self) -> Operand {
        self.value
    }

    /// The predecessor block the value arrives from.
    #[must_use]
    pub fn predecessor(&self) -> NodeId {
        self.predecessor
    }
}

/// A phi node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    result: ValueId,
    operands: Vec<PhiOperand>,
}

impl PhiNode {
    /// Creates a phi defining `result` with no incoming values.
    #[must_use]
    pub fn new(result: ValueId) -> Self {
        Self {
            result,
            operands: Vec::new(),
        }
    }

    /// The value defined by this phi.
    #[must_use]
    pub fn result(&self) -> ValueId {
        self.result
    }

    /// All incoming pairs.
    #[must_use]
    pub fn operands(&self) -> &[PhiOperand] {
        &self.operands
    }

    /// Appends an incoming pair.
    pub fn add_operand(&mut self, operand: PhiOperand) {
        self.operands.push(operand);
    }

    /// Index of the pair arriving from `pred`.
    #[must_use]
    pub fn incoming_index(&self, pred: NodeId) -> Option<usize> {
        self.operands.iter().position(|op| op.predecessor == pred)
    }

    /// Value arriving from `pred`.
    #[must_use]
    pub fn incoming_value(&self, pred: NodeId) -> Option<Operand> {
        self.incoming_index(pred).map(|i| self.operands[i].value)
    }

    /// Replaces the value of the pair at `index`.
    pub fn set_incoming_value(&mut self, index: usize, value: Operand) {
        if let Some(operand) = self.operands.get_mut(index) {
            operand.value = value;
        }
    }

    /// Re-keys every pair arriving from `old` to arrive from `new`.
    pub fn replace_predecessor(&mut self, old: NodeId, new: NodeId) {
        for operand in &mut self.operands {
            if operand.predecessor == old {
                operand.predecessor = new;
            }
        }
    }

    /// Returns true if any incoming value is `value`.
    #[must_use]
    pub fn uses(&self, value: ValueId) -> bool {
        self.operands
            .iter()
            .any(|op| op.value == Operand::Value(value))
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi ", self.result)?;
        for (i, op) in self.operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "[{}, {}]", op.value, op.predecessor)?;
        }
        Ok(())
    }
}
