//! Transformation passes.
//!
//! - [`fusion`] - merges adjacent sibling loops with identical trip counts

pub mod fusion;

pub use fusion::{
    DependenceAnalysis, FusionCandidate, FusionConfig, FusionOutcome, FusionReason,
    LoopDepthTree, LoopFuser, LoopFusionPass,
};
