//! SSA values and instruction operands.

use std::fmt;

/// Identifier of an SSA value.
///
/// A value is defined at most once: by an instruction, by a phi node, or not
/// at all when it is a function argument.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub(crate) usize);

impl ValueId {
    /// Creates a value identifier from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        ValueId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueId({})", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An instruction or phi operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Reference to an SSA value.
    Value(ValueId),
    /// Immediate integer.
    Const(i64),
    /// Undefined placeholder; any value may be assumed.
    Undef,
}

impl Operand {
    /// Returns the referenced value, if any.
    #[must_use]
    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns true for [`Operand::Undef`].
    #[must_use]
    pub fn is_undef(&self) -> bool {
        matches!(self, Operand::Undef)
    }
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Operand::Value(value)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Const(value)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Const(i64::from(value))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(value) => write!(f, "{value}"),
            Operand::Const(value) => write!(f, "{value}"),
            Operand::Undef => f.write_str("undef"),
        }
    }
}
