//! Static Single Assignment (SSA) intermediate representation.
//!
//! The representation is intentionally compact: functions made of basic
//! blocks, each holding phi nodes followed by instructions with a single
//! terminator at the end. It carries exactly the facts loop fusion reasons
//! about:
//!
//! - control flow, through terminator successors
//! - memory effects and volatility of each instruction
//! - def-use relationships between values
//! - debug locations for remarks
//!
//! # Architecture
//!
//! - [`value`] - SSA values and operands
//! - [`ops`] - the operation set and its memory classification
//! - [`instruction`] - instructions with stable ids and debug locations
//! - [`phi`] - phi nodes
//! - [`block`] - basic blocks
//! - [`function`] - functions, in-place CFG mutation, and the verifier
//! - [`builder`] - closure-based construction API
//!
//! # Usage
//!
//! ```rust
//! use loopfuse::analysis::FunctionBuilder;
//!
//! let func = FunctionBuilder::new("straight").build_with(|f| {
//!     let p = f.arg("p");
//!     f.block(0, |b| {
//!         let v = b.load(p);
//!         b.store(p, v);
//!         b.ret();
//!     });
//! })?;
//! assert_eq!(func.live_block_count(), 1);
//! # Ok::<(), loopfuse::Error>(())
//! ```

mod block;
mod builder;
mod function;
mod instruction;
mod ops;
mod phi;
mod value;

pub use block::Block;
pub use builder::{BlockBuilder, FunctionBuilder, FunctionContext};
pub use function::{Definition, Function};
pub use instruction::{InstId, Instruction, SourceLoc};
pub use ops::{BinaryOp, CmpPredicate, MemoryEffects, Op};
pub use phi::{PhiNode, PhiOperand};
pub use value::{Operand, ValueId};
