//! Program analysis infrastructure for loop fusion.
//!
//! This module provides the IR and the analyses the fusion pass consults and
//! keeps up to date. It builds upon the generic graph infrastructure in
//! [`crate::utils::graph`].
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`ssa`] - SSA functions, blocks, instructions and the function builder
//! - [`cfg`] - loop forest and the batched dominance updater
//! - [`scev`] - symbolic expressions and trip counts
//! - [`dependence`] - pairwise memory dependence testing
//!
//! # Usage
//!
//! ```rust,ignore
//! use loopfuse::analysis::{AffineEvolution, DomTreeUpdater, LoopForest};
//!
//! let forest = LoopForest::analyze(&func);
//! let dtu = DomTreeUpdater::new(&func);
//! let se = AffineEvolution::analyze(&func, &forest);
//! ```

pub mod cfg;
pub mod dependence;
pub mod scev;
pub mod ssa;

pub use cfg::{detect_loops, DomTreeUpdater, DomUpdate, LoopForest, LoopId, LoopInfo};
pub use dependence::{BaseDisjointDependence, Dependence, DependenceKind, DependenceOracle};
pub use scev::{AffineEvolution, ExprRewriter, ScalarEvolution, SymExpr};
pub use ssa::{
    BinaryOp, Block, BlockBuilder, CmpPredicate, Definition, Function, FunctionBuilder,
    FunctionContext, InstId, Instruction, MemoryEffects, Op, Operand, PhiNode, PhiOperand,
    SourceLoc, ValueId,
};
