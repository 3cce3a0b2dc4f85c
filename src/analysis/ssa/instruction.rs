//! Instructions: an operation plus its identity and debug location.

use std::fmt;

use crate::analysis::ssa::Op;

/// Stable instruction identity.
///
/// Ids are assigned by the owning [`Function`](crate::analysis::Function) and
/// survive moves between blocks, so memory-access lists collected before a
/// fusion remain meaningful afterwards.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstId(pub(crate) usize);

impl InstId {
    /// Creates an instruction id from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        InstId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstId({})", self.0)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source position attached to blocks and instructions for remarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLoc {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl SourceLoc {
    /// Creates a location.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    id: InstId,
    op: Op,
    loc: Option<SourceLoc>,
}

impl Instruction {
    pub(crate) fn new(id: InstId, op: Op, loc: Option<SourceLoc>) -> Self {
        Self { id, op, loc }
    }

    /// Stable id of this instruction.
    #[must_use]
    pub fn id(&self) -> InstId {
        self.id
    }

    /// The operation.
    #[must_use]
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub(crate) fn op_mut(&mut self) -> &mut Op {
        &mut self.op
    }

    /// Debug location, if known.
    #[must_use]
    pub fn loc(&self) -> Option<SourceLoc> {
        self.loc
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)
    }
}
