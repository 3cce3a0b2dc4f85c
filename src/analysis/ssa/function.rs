//! Functions: the unit the fusion pass operates on.
//!
//! A [`Function`] owns its blocks and implements the graph traits directly on
//! their terminators, so every analysis observes edits the moment they are
//! made. Block ids are stable: erasing a block leaves a tombstone in its slot.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use crate::{
    analysis::ssa::{Block, InstId, Instruction, Op, Operand, PhiNode, ValueId},
    utils::graph::{
        algorithms::compute_dominators, GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
    Error, Result,
};

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Definition {
    /// Function argument; defined before the entry block.
    Argument,
    /// Phi node at the top of `block`.
    Phi {
        /// Defining block.
        block: NodeId,
    },
    /// Instruction at `index` within `block`.
    Instruction {
        /// Defining block.
        block: NodeId,
        /// Position among the block's instructions.
        index: usize,
        /// Defining instruction.
        inst: InstId,
    },
}

impl Definition {
    /// Defining block, `None` for arguments.
    #[must_use]
    pub fn block(&self) -> Option<NodeId> {
        match self {
            Definition::Argument => None,
            Definition::Phi { block } | Definition::Instruction { block, .. } => Some(*block),
        }
    }
}

/// An SSA function.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    blocks: Vec<Block>,
    arguments: Vec<ValueId>,
    value_names: HashMap<ValueId, String>,
    next_value: usize,
    next_inst: usize,
}

impl Function {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            arguments: Vec::new(),
            value_names: HashMap::new(),
            next_value: 0,
            next_inst: 0,
        }
    }

    /// Function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the live block `id`.
    #[must_use]
    pub fn block(&self, id: NodeId) -> Option<&Block> {
        self.blocks.get(id.index()).filter(|b| !b.is_erased())
    }

    pub(crate) fn block_mut(&mut self, id: NodeId) -> Result<&mut Block> {
        self.blocks
            .get_mut(id.index())
            .filter(|b| !b.is_erased())
            .ok_or(Error::InvalidBlock(id))
    }

    /// Returns the live block `id` or [`Error::InvalidBlock`].
    pub fn block_checked(&self, id: NodeId) -> Result<&Block> {
        self.block(id).ok_or(Error::InvalidBlock(id))
    }

    /// Iterates over live blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| !b.is_erased())
    }

    /// Number of live blocks.
    #[must_use]
    pub fn live_block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Name of block `id`, or its id when unknown.
    #[must_use]
    pub fn block_name(&self, id: NodeId) -> String {
        self.blocks
            .get(id.index())
            .map_or_else(|| id.to_string(), |b| b.name().to_string())
    }

    /// Function arguments.
    #[must_use]
    pub fn arguments(&self) -> &[ValueId] {
        &self.arguments
    }

    pub(crate) fn add_argument(&mut self, value: ValueId) {
        self.arguments.push(value);
    }

    pub(crate) fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Allocates a fresh value id.
    pub fn new_value(&mut self) -> ValueId {
        let value = ValueId::new(self.next_value);
        self.next_value += 1;
        value
    }

    pub(crate) fn reserve_values(&mut self, count: usize) {
        self.next_value = self.next_value.max(count);
    }

    pub(crate) fn new_inst_id(&mut self) -> InstId {
        let id = InstId::new(self.next_inst);
        self.next_inst += 1;
        id
    }

    /// Human-readable name of `value`.
    #[must_use]
    pub fn value_name(&self, value: ValueId) -> String {
        self.value_names
            .get(&value)
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    /// Attaches a name to `value`.
    pub fn set_value_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.value_names.insert(value, name.into());
    }

    /// Looks up an instruction by id.
    #[must_use]
    pub fn instruction(&self, id: InstId) -> Option<(NodeId, &Instruction)> {
        self.blocks().find_map(|block| {
            block
                .instructions()
                .iter()
                .find(|inst| inst.id() == id)
                .map(|inst| (block.id(), inst))
        })
    }

    /// Finds where `value` is defined.
    #[must_use]
    pub fn definition(&self, value: ValueId) -> Option<Definition> {
        if self.arguments.contains(&value) {
            return Some(Definition::Argument);
        }
        for block in self.blocks() {
            if block.phi_nodes().iter().any(|phi| phi.result() == value) {
                return Some(Definition::Phi { block: block.id() });
            }
            for (index, inst) in block.instructions().iter().enumerate() {
                if inst.op().dest() == Some(value) {
                    return Some(Definition::Instruction {
                        block: block.id(),
                        index,
                        inst: inst.id(),
                    });
                }
            }
        }
        None
    }

    /// Returns the instruction defining `operand`, if it is an instruction
    /// result.
    #[must_use]
    pub fn defining_instruction(&self, operand: Operand) -> Option<(NodeId, &Instruction)> {
        match self.definition(operand.as_value()?)? {
            Definition::Instruction { inst, .. } => self.instruction(inst),
            _ => None,
        }
    }

    /// Returns true if any phi or instruction reads `value`.
    #[must_use]
    pub fn has_uses(&self, value: ValueId) -> bool {
        let operand = Operand::Value(value);
        self.blocks().any(|block| {
            block.phi_nodes().iter().any(|phi| phi.uses(value))
                || block
                    .instructions()
                    .iter()
                    .any(|inst| inst.op().operands().contains(&operand))
        })
    }

    /// Distinct predecessors of `block`, in id order.
    #[must_use]
    pub fn predecessors_of(&self, block: NodeId) -> Vec<NodeId> {
        self.blocks()
            .filter(|b| b.successors().contains(&block))
            .map(Block::id)
            .collect()
    }

    /// The unique predecessor of `block`, if it has exactly one.
    #[must_use]
    pub fn single_predecessor(&self, block: NodeId) -> Option<NodeId> {
        match self.predecessors_of(block).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Rewrites the terminator of `block` so that edges to `old` go to `new`.
    ///
    /// Returns the number of rewritten successor slots.
    pub fn replace_successor(&mut self, block: NodeId, old: NodeId, new: NodeId) -> Result<usize> {
        let term = self
            .block_mut(block)?
            .terminator_mut()
            .ok_or_else(|| malformed_error!("block {} has no terminator", block))?;
        Ok(term.op_mut().replace_successor(old, new))
    }

    /// Replaces the terminator of `block` with `unreachable`.
    pub fn make_unreachable(&mut self, block: NodeId) -> Result<()> {
        let id = self.new_inst_id();
        let target = self.block_mut(block)?;
        let loc = target.terminator().and_then(Instruction::loc);
        let instructions = target.instructions_mut();
        if instructions.last().is_some_and(|i| i.op().is_terminator()) {
            instructions.pop();
        }
        instructions.push(Instruction::new(id, Op::Unreachable, loc));
        Ok(())
    }

    /// For every successor of `block`, re-keys phi operands arriving from
    /// `block` to arrive from `new_pred` instead.
    pub fn replace_successors_phi_uses_with(
        &mut self,
        block: NodeId,
        new_pred: NodeId,
    ) -> Result<()> {
        let successors = self.block_checked(block)?.successors();
        for succ in successors {
            self.replace_phi_predecessor(succ, block, new_pred)?;
        }
        Ok(())
    }

    /// Re-keys phi operands of `block` arriving from `old` to `new`.
    pub fn replace_phi_predecessor(
        &mut self,
        block: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<()> {
        for phi in self.block_mut(block)?.phi_nodes_mut() {
            phi.replace_predecessor(old, new);
        }
        Ok(())
    }

    /// Removes and returns all phi nodes of `block`.
    pub fn take_phis(&mut self, block: NodeId) -> Result<Vec<PhiNode>> {
        Ok(std::mem::take(self.block_mut(block)?.phi_nodes_mut()))
    }

    /// Inserts phi nodes at the top of `block`, before existing ones.
    pub fn prepend_phis(&mut self, block: NodeId, phis: Vec<PhiNode>) -> Result<()> {
        let existing = self.block_mut(block)?.phi_nodes_mut();
        let tail = std::mem::replace(existing, phis);
        existing.extend(tail);
        Ok(())
    }

    /// Mutable access to the phi defining `result` in `block`.
    pub fn phi_mut(&mut self, block: NodeId, result: ValueId) -> Result<&mut PhiNode> {
        self.block_mut(block)?
            .phi_nodes_mut()
            .iter_mut()
            .find(|phi| phi.result() == result)
            .ok_or_else(|| malformed_error!("no phi {} in block {}", result, block))
    }

    /// Deletes `block` from the function.
    ///
    /// The block must already be unreachable and must have no successors left;
    /// it is turned into a tombstone so that its id is never reused.
    pub fn erase_block(&mut self, block: NodeId) -> Result<()> {
        if block == self.entry() {
            return Err(malformed_error!("cannot erase the entry block {}", block));
        }
        if !self.predecessors_of(block).is_empty() {
            return Err(malformed_error!("block {} still has predecessors", block));
        }
        self.block_mut(block)?.erase();
        Ok(())
    }

    /// Checks structural well-formedness of the function.
    ///
    /// Verified properties:
    /// - every live block ends in exactly one terminator and branches only to
    ///   live blocks
    /// - every value is defined at most once, and every used value is defined
    /// - phi nodes have exactly one incoming pair per predecessor
    /// - definitions dominate their uses (phi uses: the incoming edge)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] describing the first violation found.
    pub fn verify(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Verification(format!("{}: {msg}", self.name)));

        if self.block(self.entry()).is_none() {
            return fail("missing entry block".into());
        }

        let mut defs: HashMap<ValueId, Definition> = HashMap::new();
        for &arg in &self.arguments {
            defs.insert(arg, Definition::Argument);
        }

        for block in self.blocks() {
            let count = block.instructions().len();
            if count == 0 || block.terminator().is_none() {
                return fail(format!("block {} has no terminator", block.name()));
            }
            for (index, inst) in block.instructions().iter().enumerate() {
                if inst.op().is_terminator() && index + 1 != count {
                    return fail(format!("terminator in the middle of {}", block.name()));
                }
                if let Some(dest) = inst.op().dest() {
                    let def = Definition::Instruction {
                        block: block.id(),
                        index,
                        inst: inst.id(),
                    };
                    if defs.insert(dest, def).is_some() {
                        return fail(format!("{} defined twice", self.value_name(dest)));
                    }
                }
            }
            for succ in block.successors() {
                if self.block(succ).is_none() {
                    return fail(format!("{} branches to dead block {succ}", block.name()));
                }
            }
            for phi in block.phi_nodes() {
                if defs
                    .insert(phi.result(), Definition::Phi { block: block.id() })
                    .is_some()
                {
                    return fail(format!("{} defined twice", self.value_name(phi.result())));
                }
            }
        }

        let dom = compute_dominators(self, self.entry());
        let defined_before = |value: ValueId, user: NodeId, position: Option<usize>| -> bool {
            match defs.get(&value) {
                None => false,
                Some(Definition::Argument) => true,
                Some(Definition::Phi { block }) => {
                    dom.dominates(*block, user) || !dom.is_reachable(user)
                }
                Some(Definition::Instruction { block, index, .. }) => {
                    if !dom.is_reachable(user) {
                        true
                    } else if *block == user {
                        position.is_none_or(|pos| *index < pos)
                    } else {
                        dom.dominates(*block, user)
                    }
                }
            }
        };

        for block in self.blocks() {
            let preds: HashSet<NodeId> = self.predecessors_of(block.id()).into_iter().collect();
            for phi in block.phi_nodes() {
                let incoming: Vec<NodeId> =
                    phi.operands().iter().map(|op| op.predecessor()).collect();
                let unique: HashSet<NodeId> = incoming.iter().copied().collect();
                if unique.len() != incoming.len() || unique != preds {
                    return fail(format!(
                        "phi {} in {} does not match the block's predecessors",
                        self.value_name(phi.result()),
                        block.name()
                    ));
                }
                for op in phi.operands() {
                    if let Some(value) = op.value().as_value() {
                        if !defined_before(value, op.predecessor(), None) {
                            return fail(format!(
                                "{} does not dominate its use in phi {}",
                                self.value_name(value),
                                self.value_name(phi.result())
                            ));
                        }
                    }
                }
            }
            for (index, inst) in block.instructions().iter().enumerate() {
                for operand in inst.op().operands() {
                    if let Some(value) = operand.as_value() {
                        if !defined_before(value, block.id(), Some(index)) {
                            return fail(format!(
                                "{} does not dominate its use in {}",
                                self.value_name(value),
                                block.name()
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl GraphBase for Function {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.blocks().map(Block::id)
    }
}

impl Successors for Function {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.block(node)
            .map(Block::successors)
            .unwrap_or_default()
            .into_iter()
    }
}

impl Predecessors for Function {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors_of(node).into_iter()
    }
}

impl RootedGraph for Function {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {}:", self.name)?;
        for block in self.blocks() {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::{CmpPredicate, FunctionBuilder, Operand};
    use crate::utils::graph::{NodeId, Predecessors, Successors};

    #[test]
    fn test_predecessors_and_successors() {
        let func = FunctionBuilder::new("f")
            .build_with(|f| {
                let n = f.arg("n");
                f.block(0, |b| {
                    let c = b.cmp(CmpPredicate::Sgt, n, 0);
                    b.branch(c, 1, 2);
                });
                f.block(1, |b| b.jump(2));
                f.block(2, |b| b.ret());
            })
            .unwrap();

        let preds: Vec<_> = func.predecessors(NodeId::new(2)).collect();
        assert_eq!(preds, vec![NodeId::new(0), NodeId::new(1)]);
        let succs: Vec<_> = func.successors(NodeId::new(0)).collect();
        assert_eq!(succs, vec![NodeId::new(1), NodeId::new(2)]);
        assert!(func.verify().is_ok());
    }

    #[test]
    fn test_replace_successor_and_erase() {
        let mut func = FunctionBuilder::new("f")
            .build_with(|f| {
                f.block(0, |b| b.jump(1));
                f.block(1, |b| b.jump(2));
                f.block(2, |b| b.ret());
            })
            .unwrap();

        assert_eq!(
            func.replace_successor(NodeId::new(0), NodeId::new(1), NodeId::new(2))
                .unwrap(),
            1
        );
        func.erase_block(NodeId::new(1)).unwrap();
        assert!(func.block(NodeId::new(1)).is_none());
        assert_eq!(func.live_block_count(), 2);
        assert!(func.verify().is_ok());
    }

    #[test]
    fn test_erase_rejects_reachable_block() {
        let mut func = FunctionBuilder::new("f")
            .build_with(|f| {
                f.block(0, |b| b.jump(1));
                f.block(1, |b| b.ret());
            })
            .unwrap();
        assert!(func.erase_block(NodeId::new(1)).is_err());
        assert!(func.erase_block(NodeId::new(0)).is_err());
    }

    #[test]
    fn test_verify_rejects_use_before_def() {
        let func = FunctionBuilder::new("f")
            .build_with(|f| {
                let late = f.value();
                f.block(0, |b| {
                    b.store(late, 1);
                    b.jump(1);
                });
                f.block(1, |b| {
                    b.add_into(late, 1, 2);
                    b.ret();
                });
            })
            .unwrap();
        assert!(func.verify().is_err());
    }

    #[test]
    fn test_verify_rejects_phi_missing_predecessor() {
        let func = FunctionBuilder::new("f")
            .build_with(|f| {
                let n = f.arg("n");
                f.block(0, |b| {
                    let c = b.cmp(CmpPredicate::Sgt, n, 0);
                    b.branch(c, 1, 2);
                });
                f.block(1, |b| b.jump(2));
                f.block(2, |b| {
                    let _ = b.phi(&[(0, Operand::Const(1))]);
                    b.ret();
                });
            })
            .unwrap();
        assert!(func.verify().is_err());
    }

    #[test]
    fn test_definition_lookup() {
        let func = FunctionBuilder::new("f")
            .build_with(|f| {
                let n = f.arg("n");
                f.block(0, |b| {
                    let c = b.cmp(CmpPredicate::Sgt, n, 0);
                    b.branch(c, 1, 1);
                });
                f.block(1, |b| b.ret());
            })
            .unwrap();

        let cmp = func.block(NodeId::new(0)).unwrap().instructions()[0].op().dest().unwrap();
        let def = func.definition(cmp).unwrap();
        assert_eq!(def.block(), Some(NodeId::new(0)));
        assert!(func.defining_instruction(Operand::Value(cmp)).is_some());
        assert!(func.has_uses(cmp));
        assert_eq!(func.definition(func.arguments()[0]), Some(super::Definition::Argument));
    }
}
