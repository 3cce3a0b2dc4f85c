//! Pairwise memory dependence testing.
//!
//! Loop fusion consults a [`DependenceOracle`] when its symbolic access
//! comparison cannot decide a pair of memory instructions. The oracle answers
//! the classic dependence-analysis question: can `src` and `dst` touch the same
//! location, with at least one of them writing?
//!
//! [`BaseDisjointDependence`] is the reference oracle. It traces each address
//! back to its base pointers and reports independence only when both addresses
//! derive from a single, distinct pointer argument. Distinct pointer arguments
//! are assumed not to alias.

use std::{collections::BTreeSet, fmt};

use crate::analysis::ssa::{BinaryOp, Definition, Function, InstId, Op, Operand, ValueId};

/// Direction of a memory dependence between two instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependenceKind {
    /// Read after write.
    Flow,
    /// Write after read.
    Anti,
    /// Write after write.
    Output,
}

/// A possible dependence from `src` to `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependence {
    /// The earlier instruction.
    pub src: InstId,
    /// The later instruction.
    pub dst: InstId,
    /// Dependence direction.
    pub kind: DependenceKind,
}

impl fmt::Display for Dependence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DependenceKind::Flow => "flow",
            DependenceKind::Anti => "anti",
            DependenceKind::Output => "output",
        };
        write!(f, "{kind} dependence {} -> {}", self.src, self.dst)
    }
}

/// A general pairwise dependence test.
///
/// Implementations must be conservative: returning `None` asserts that the
/// two instructions never access the same location in a conflicting way.
pub trait DependenceOracle {
    /// Tests `src` against `dst`; `None` means provably independent.
    fn depends(&self, func: &Function, src: InstId, dst: InstId) -> Option<Dependence>;
}

/// Independence from distinct base pointers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseDisjointDependence;

impl BaseDisjointDependence {
    /// Creates the oracle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Base pointers `operand` is derived from; `None` if untraceable.
    fn roots(func: &Function, operand: Operand) -> Option<BTreeSet<ValueId>> {
        let mut roots = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut worklist = vec![operand];

        while let Some(operand) = worklist.pop() {
            let value = match operand {
                Operand::Const(_) => continue,
                Operand::Undef => return None,
                Operand::Value(value) => value,
            };
            if !visited.insert(value) {
                continue;
            }
            match func.definition(value)? {
                Definition::Argument => {
                    roots.insert(value);
                }
                Definition::Phi { block } => {
                    let phi = func
                        .block(block)?
                        .phi_nodes()
                        .iter()
                        .find(|phi| phi.result() == value)?;
                    worklist.extend(phi.operands().iter().map(|op| op.value()));
                }
                Definition::Instruction { inst, .. } => {
                    let (_, inst) = func.instruction(inst)?;
                    match inst.op() {
                        Op::Binary {
                            op: BinaryOp::Add,
                            left,
                            right,
                            ..
                        } => worklist.extend([*left, *right]),
                        Op::Binary {
                            op: BinaryOp::Sub,
                            left,
                            ..
                        } => worklist.push(*left),
                        Op::Const { .. } | Op::Binary { op: BinaryOp::Mul, .. } => {}
                        _ => {
                            roots.insert(value);
                        }
                    }
                }
            }
        }
        Some(roots)
    }
}

impl DependenceOracle for BaseDisjointDependence {
    fn depends(&self, func: &Function, src: InstId, dst: InstId) -> Option<Dependence> {
        let (_, src_inst) = func.instruction(src)?;
        let (_, dst_inst) = func.instruction(dst)?;
        let (src_op, dst_op) = (src_inst.op(), dst_inst.op());

        let kind = if src_op.may_write_memory() && dst_op.may_write_memory() {
            DependenceKind::Output
        } else if src_op.may_write_memory() && dst_op.may_read_memory() {
            DependenceKind::Flow
        } else if src_op.may_read_memory() && dst_op.may_write_memory() {
            DependenceKind::Anti
        } else {
            return None;
        };
        let dependence = Some(Dependence { src, dst, kind });

        let (Some(src_addr), Some(dst_addr)) = (src_op.pointer_operand(), dst_op.pointer_operand())
        else {
            return dependence;
        };
        let (Some(src_roots), Some(dst_roots)) =
            (Self::roots(func, src_addr), Self::roots(func, dst_addr))
        else {
            return dependence;
        };

        match (src_roots.len(), dst_roots.len()) {
            (1, 1) if src_roots != dst_roots => {
                let is_argument = |roots: &BTreeSet<ValueId>| {
                    roots
                        .iter()
                        .all(|v| func.definition(*v) == Some(Definition::Argument))
                };
                if is_argument(&src_roots) && is_argument(&dst_roots) {
                    None
                } else {
                    dependence
                }
            }
            _ => dependence,
        }
    }
}
