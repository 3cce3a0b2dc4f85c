//! # loopfuse Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits of the library. Import it to build a function, analyze it and
//! run the fusion pass.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all loopfuse operations
pub use crate::Error;

/// The result type used throughout loopfuse
pub use crate::Result;

// ================================================================================================
// IR
// ================================================================================================

/// Functions, blocks and their contents
pub use crate::analysis::{
    Block, CmpPredicate, Function, InstId, Instruction, MemoryEffects, Op, Operand, PhiNode,
    SourceLoc, ValueId,
};

/// Closure-based construction of functions
pub use crate::analysis::{BlockBuilder, FunctionBuilder};

/// Block identifiers
pub use crate::utils::graph::NodeId;

// ================================================================================================
// Analyses
// ================================================================================================

/// Loop forest and dominance maintenance
pub use crate::analysis::{DomTreeUpdater, DomUpdate, LoopForest, LoopId, LoopInfo};

/// Scalar evolution
pub use crate::analysis::{AffineEvolution, ScalarEvolution, SymExpr};

/// Memory dependence testing
pub use crate::analysis::{BaseDisjointDependence, DependenceOracle};

// ================================================================================================
// Loop Fusion
// ================================================================================================

/// Pass infrastructure
pub use crate::compiler::{FunctionPass, FusionContext, PreservedAnalyses};

/// The fusion driver and its configuration
pub use crate::compiler::{
    DependenceAnalysis, FusionCandidate, FusionConfig, FusionOutcome, FusionReason, LoopFuser,
    LoopFusionPass,
};

/// Diagnostics
pub use crate::compiler::{Event, EventKind, EventLog, FusionStats};
