//! Shared function fixtures for unit tests.
//!
//! Every fixture is a small, verified function whose loops are in simplified
//! form and count a unit-stride induction variable from zero up to `n`.
//! Blocks are laid out in program order so loop ids follow source order.

mod guards;
mod loops;

pub use guards::*;
pub use loops::*;

use crate::analysis::{BlockBuilder, CmpPredicate, Operand, ValueId};

/// `iv = phi [0, preheader], [next, latch]`
pub(crate) fn induction(
    b: &mut BlockBuilder<'_>,
    preheader: usize,
    latch: usize,
    next: ValueId,
) -> ValueId {
    b.phi(&[(preheader, Operand::Const(0)), (latch, next.into())])
}

/// `next = iv + 1; br (next < bound), header, exit`
pub(crate) fn step_and_branch(
    b: &mut BlockBuilder<'_>,
    iv: ValueId,
    next: ValueId,
    bound: impl Into<Operand>,
    header: usize,
    exit: usize,
) {
    b.add_into(next, iv, 1);
    let c = b.cmp(CmpPredicate::Slt, next, bound);
    b.branch(c, header, exit);
}

/// `base[index] = value`
pub(crate) fn store_at(
    b: &mut BlockBuilder<'_>,
    base: ValueId,
    index: impl Into<Operand>,
    value: impl Into<Operand>,
) {
    let p = b.add(base, index);
    b.store(p, value);
}

/// `base[index]`
pub(crate) fn load_at(
    b: &mut BlockBuilder<'_>,
    base: ValueId,
    index: impl Into<Operand>,
) -> ValueId {
    let p = b.add(base, index);
    b.load(p)
}
