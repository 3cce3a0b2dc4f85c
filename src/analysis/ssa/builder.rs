//! Builder for programmatic construction of SSA functions.
//!
//! The builder uses a closure-based API where all blocks are defined within a
//! single expression, so the CFG shape reads straight off the source:
//!
//! ```rust
//! use loopfuse::analysis::{CmpPredicate, FunctionBuilder, Operand};
//!
//! let func = FunctionBuilder::new("count").build_with(|f| {
//!     let n = f.arg("n");
//!     let next = f.value();
//!     f.block(0, |b| b.jump(1));
//!     f.block(1, |b| {
//!         let i = b.phi(&[(0, Operand::Const(0)), (1, next.into())]);
//!         b.add_into(next, i, 1);
//!         let c = b.cmp(CmpPredicate::Slt, next, n);
//!         b.branch(c, 1, 2);
//!     });
//!     f.block(2, |b| b.ret());
//! })?;
//! assert!(func.verify().is_ok());
//! # Ok::<(), loopfuse::Error>(())
//! ```
//!
//! Block ids may have gaps; missing ids become erased blocks. Values needed
//! before their definition (loop-carried phis) are reserved with
//! [`FunctionContext::value`] and defined later with the `_into` variants.

use std::collections::BTreeMap;

use crate::{
    analysis::ssa::{
        BinaryOp, Block, CmpPredicate, Function, Instruction, MemoryEffects, Op, Operand, PhiNode,
        PhiOperand, SourceLoc, ValueId,
    },
    utils::graph::NodeId,
    Error, Result,
};

/// Builder for constructing functions programmatically.
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
    blocks: BTreeMap<usize, Block>,
}

impl FunctionBuilder {
    /// Creates a builder for a function called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            func: Function::new(name),
            blocks: BTreeMap::new(),
        }
    }

    /// Builds the function using a closure that defines its blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if a terminator targets a block that was
    /// never defined, or [`Error::Malformed`] if a defined block has no
    /// terminator.
    pub fn build_with<F>(mut self, f: F) -> Result<Function>
    where
        F: FnOnce(&mut FunctionContext<'_>),
    {
        let mut ctx = FunctionContext { builder: &mut self };
        f(&mut ctx);
        self.build()
    }

    fn build(mut self) -> Result<Function> {
        let max = self.blocks.keys().next_back().copied().unwrap_or(0);
        for id in 0..=max {
            match self.blocks.remove(&id) {
                Some(block) => {
                    if block.terminator().is_none() {
                        return Err(malformed_error!("block {} has no terminator", block.name()));
                    }
                    self.func.add_block(block);
                }
                None => self.func.add_block(Block::tombstone(NodeId::new(id))),
            }
        }

        for block in self.func.blocks() {
            if let Some(term) = block.terminator() {
                for succ in term.op().successors() {
                    if self.func.block(succ).is_none() {
                        return Err(Error::InvalidBlock(succ));
                    }
                }
            }
        }

        Ok(self.func)
    }
}

/// Context passed to the build closure for defining blocks and values.
pub struct FunctionContext<'a> {
    builder: &'a mut FunctionBuilder,
}

impl FunctionContext<'_> {
    /// Declares a named function argument.
    pub fn arg(&mut self, name: &str) -> ValueId {
        let value = self.builder.func.new_value();
        self.builder.func.set_value_name(value, name);
        self.builder.func.add_argument(value);
        value
    }

    /// Reserves a fresh value to be defined later.
    #[must_use]
    pub fn value(&mut self) -> ValueId {
        self.builder.func.new_value()
    }

    /// Reserves a fresh value carrying a name.
    pub fn named_value(&mut self, name: &str) -> ValueId {
        let value = self.builder.func.new_value();
        self.builder.func.set_value_name(value, name);
        value
    }

    /// Defines block `id` using a closure.
    pub fn block<F>(&mut self, id: usize, f: F)
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        self.named_block(id, &format!("bb{id}"), f);
    }

    /// Defines block `id` with an explicit label.
    pub fn named_block<F>(&mut self, id: usize, name: &str, f: F)
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        let mut block = Block::new(NodeId::new(id), name);
        let mut block_builder = BlockBuilder {
            func: &mut self.builder.func,
            block: &mut block,
            loc: None,
        };
        f(&mut block_builder);
        self.builder.blocks.insert(id, block);
    }
}

/// Builder for the contents of one block.
///
/// Value-producing operations return the defined [`ValueId`]; the `_into`
/// variants define a value reserved earlier.
pub struct BlockBuilder<'a> {
    func: &'a mut Function,
    block: &'a mut Block,
    loc: Option<SourceLoc>,
}

impl BlockBuilder<'_> {
    fn push(&mut self, op: Op) {
        let id = self.func.new_inst_id();
        self.block
            .instructions_mut()
            .push(Instruction::new(id, op, self.loc));
    }

    /// Renames the block.
    pub fn name(&mut self, name: &str) {
        self.block.set_name(name);
    }

    /// Sets the debug location of the block and of every following
    /// instruction.
    pub fn loc(&mut self, line: u32, column: u32) {
        let loc = SourceLoc::new(line, column);
        self.block.set_loc(loc);
        self.loc = Some(loc);
    }

    /// Marks the block as address-taken.
    pub fn address_taken(&mut self) {
        self.block.set_address_taken(true);
    }

    /// Adds a phi node; `operands` pairs predecessor block ids with values.
    pub fn phi(&mut self, operands: &[(usize, Operand)]) -> ValueId {
        let dest = self.func.new_value();
        self.phi_into(dest, operands);
        dest
    }

    /// Adds a phi node defining the reserved value `dest`.
    pub fn phi_into(&mut self, dest: ValueId, operands: &[(usize, Operand)]) {
        let mut phi = PhiNode::new(dest);
        for &(pred, value) in operands {
            phi.add_operand(PhiOperand::new(value, NodeId::new(pred)));
        }
        self.block.phi_nodes_mut().push(phi);
    }

    /// Adds: dest = value
    pub fn constant(&mut self, value: i64) -> ValueId {
        let dest = self.func.new_value();
        self.push(Op::Const { dest, value });
        dest
    }

    fn binary(&mut self, dest: ValueId, op: BinaryOp, left: Operand, right: Operand) {
        self.push(Op::Binary {
            dest,
            op,
            left,
            right,
        });
    }

    /// Adds: dest = left + right
    pub fn add(&mut self, left: impl Into<Operand>, right: impl Into<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.binary(dest, BinaryOp::Add, left.into(), right.into());
        dest
    }

    /// Adds: dest = left + right, defining a reserved value.
    pub fn add_into(&mut self, dest: ValueId, left: impl Into<Operand>, right: impl Into<Operand>) {
        self.binary(dest, BinaryOp::Add, left.into(), right.into());
    }

    /// Adds: dest = left - right
    pub fn sub(&mut self, left: impl Into<Operand>, right: impl Into<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.binary(dest, BinaryOp::Sub, left.into(), right.into());
        dest
    }

    /// Adds: dest = left * right
    pub fn mul(&mut self, left: impl Into<Operand>, right: impl Into<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.binary(dest, BinaryOp::Mul, left.into(), right.into());
        dest
    }

    /// Adds: dest = left * right, defining a reserved value.
    pub fn mul_into(&mut self, dest: ValueId, left: impl Into<Operand>, right: impl Into<Operand>) {
        self.binary(dest, BinaryOp::Mul, left.into(), right.into());
    }

    /// Adds a bitwise or shift operation.
    pub fn binop(
        &mut self,
        op: BinaryOp,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> ValueId {
        let dest = self.func.new_value();
        self.binary(dest, op, left.into(), right.into());
        dest
    }

    /// Adds: dest = left <predicate> right
    pub fn cmp(
        &mut self,
        predicate: CmpPredicate,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> ValueId {
        let dest = self.func.new_value();
        self.push(Op::Compare {
            dest,
            predicate,
            left: left.into(),
            right: right.into(),
        });
        dest
    }

    /// Adds: dest = *address
    pub fn load(&mut self, address: impl Into<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.push(Op::Load {
            dest,
            address: address.into(),
            volatile: false,
        });
        dest
    }

    /// Adds a volatile load.
    pub fn load_volatile(&mut self, address: impl Into<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.push(Op::Load {
            dest,
            address: address.into(),
            volatile: true,
        });
        dest
    }

    /// Adds: *address = value
    pub fn store(&mut self, address: impl Into<Operand>, value: impl Into<Operand>) {
        self.push(Op::Store {
            address: address.into(),
            value: value.into(),
            volatile: false,
        });
    }

    /// Adds a volatile store.
    pub fn store_volatile(&mut self, address: impl Into<Operand>, value: impl Into<Operand>) {
        self.push(Op::Store {
            address: address.into(),
            value: value.into(),
            volatile: true,
        });
    }

    /// Adds a call returning a value.
    pub fn call(&mut self, callee: &str, args: &[Operand], effects: MemoryEffects) -> ValueId {
        let dest = self.func.new_value();
        self.push(Op::Call {
            dest: Some(dest),
            callee: callee.to_string(),
            args: args.to_vec(),
            effects,
        });
        dest
    }

    /// Adds a call without a result.
    pub fn call_void(&mut self, callee: &str, args: &[Operand], effects: MemoryEffects) {
        self.push(Op::Call {
            dest: None,
            callee: callee.to_string(),
            args: args.to_vec(),
            effects,
        });
    }

    /// Terminates with an unconditional branch.
    pub fn jump(&mut self, target: usize) {
        self.push(Op::Jump {
            target: NodeId::new(target),
        });
    }

    /// Terminates with a conditional branch.
    pub fn branch(
        &mut self,
        condition: impl Into<Operand>,
        true_target: usize,
        false_target: usize,
    ) {
        self.push(Op::Branch {
            condition: condition.into(),
            true_target: NodeId::new(true_target),
            false_target: NodeId::new(false_target),
        });
    }

    /// Terminates with a return.
    pub fn ret(&mut self) {
        self.push(Op::Return { value: None });
    }

    /// Terminates with a value return.
    pub fn ret_val(&mut self, value: impl Into<Operand>) {
        self.push(Op::Return {
            value: Some(value.into()),
        });
    }

    /// Terminates with `unreachable`.
    pub fn unreachable(&mut self) {
        self.push(Op::Unreachable);
    }
}
