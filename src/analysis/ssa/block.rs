//! Basic blocks.

use std::fmt;

use crate::{
    analysis::ssa::{Instruction, Op, PhiNode, SourceLoc},
    utils::graph::NodeId,
};

/// A basic block: phi nodes followed by instructions, the last of which is the
/// terminator.
#[derive(Debug, Clone)]
pub struct Block {
    id: NodeId,
    name: String,
    loc: Option<SourceLoc>,
    address_taken: bool,
    phis: Vec<PhiNode>,
    instructions: Vec<Instruction>,
    erased: bool,
}

impl Block {
    pub(crate) fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            loc: None,
            address_taken: false,
            phis: Vec::new(),
            instructions: Vec::new(),
            erased: false,
        }
    }

    pub(crate) fn tombstone(id: NodeId) -> Self {
        let mut block = Self::new(id, format!("{id}"));
        block.erased = true;
        block
    }

    /// Block id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Block label used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Debug location of the block, if known.
    #[must_use]
    pub fn loc(&self) -> Option<SourceLoc> {
        self.loc
    }

    pub(crate) fn set_loc(&mut self, loc: SourceLoc) {
        self.loc = Some(loc);
    }

    /// Returns true if the block's address escapes (it is the target of an
    /// indirect branch), which pins its position in the CFG.
    #[must_use]
    pub fn has_address_taken(&self) -> bool {
        self.address_taken
    }

    pub(crate) fn set_address_taken(&mut self, taken: bool) {
        self.address_taken = taken;
    }

    /// Returns true once the block has been deleted from its function.
    #[must_use]
    pub fn is_erased(&self) -> bool {
        self.erased
    }

    /// Phi nodes at the top of the block.
    #[must_use]
    pub fn phi_nodes(&self) -> &[PhiNode] {
        &self.phis
    }

    pub(crate) fn phi_nodes_mut(&mut self) -> &mut Vec<PhiNode> {
        &mut self.phis
    }

    /// Non-phi instructions, terminator last.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Number of entries (phi nodes plus instructions).
    #[must_use]
    pub fn len(&self) -> usize {
        self.phis.len() + self.instructions.len()
    }

    /// Returns true if the block holds nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The terminator instruction, if the block is well formed.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.op().is_terminator())
    }

    pub(crate) fn terminator_mut(&mut self) -> Option<&mut Instruction> {
        self.instructions
            .last_mut()
            .filter(|i| i.op().is_terminator())
    }

    /// Distinct successor blocks in successor-index order.
    #[must_use]
    pub fn successors(&self) -> Vec<NodeId> {
        let mut succs = Vec::with_capacity(2);
        if let Some(term) = self.terminator() {
            for succ in term.op().successors() {
                if !succs.contains(&succ) {
                    succs.push(succ);
                }
            }
        }
        succs
    }

    /// Successor at `index` of the terminator, duplicates included.
    #[must_use]
    pub fn successor(&self, index: usize) -> Option<NodeId> {
        self.terminator()
            .and_then(|term| term.op().successors().get(index).copied())
    }

    /// Returns the single successor if the block has exactly one.
    #[must_use]
    pub fn single_successor(&self) -> Option<NodeId> {
        match self.successors().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Returns true if the terminator is a conditional branch.
    #[must_use]
    pub fn ends_in_conditional_branch(&self) -> bool {
        matches!(
            self.terminator().map(Instruction::op),
            Some(Op::Branch { .. })
        )
    }

    /// Drops every phi and instruction and marks the block erased.
    pub(crate) fn erase(&mut self) {
        self.phis.clear();
        self.instructions.clear();
        self.address_taken = false;
        self.erased = true;
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", self.name, self.id)?;
        for phi in &self.phis {
            writeln!(f, "  {phi}")?;
        }
        for inst in &self.instructions {
            writeln!(f, "  {inst}")?;
        }
        Ok(())
    }
}
