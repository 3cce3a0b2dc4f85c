//! Pass infrastructure and the loop fusion pass.
//!
//! This module sits on top of [`crate::analysis`]:
//!
//! - [`crate::analysis`] - IR, loop forest, dominance, scalar evolution
//! - [`compiler`](self) - the fusion pass and the state it threads through
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Fusion Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  FusionContext               Exclusive borrow of one function    │
//! │    ├─ Function                (blocks, phis, instructions)       │
//! │    ├─ LoopForest              (updated by merge_loops)           │
//! │    ├─ DomTreeUpdater          (batched edge edits + flush)       │
//! │    ├─ ScalarEvolution         (trip counts, access functions)    │
//! │    ├─ DependenceOracle        (fallback dependence test)         │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  LoopFuser                   Depth-by-depth sweep                │
//! │    ├─ LoopDepthTree           (sibling groups per depth)         │
//! │    ├─ Grouping                (control-flow-equivalent sets)     │
//! │    ├─ Legality                (trip count, adjacency, guards,    │
//! │    │                           emptiness, dependences)           │
//! │    └─ Transform               (splice, then reinsert)            │
//! │                                                                  │
//! │  FunctionPass trait          Host-facing interface               │
//! │  EventLog / FusionStats      Remarks and derived statistics      │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod context;
mod events;
mod pass;
pub mod passes;

pub use context::FusionContext;
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter, FusionStats};
pub use pass::{FunctionPass, PreservedAnalyses};
pub use passes::{
    DependenceAnalysis, FusionCandidate, FusionConfig, FusionOutcome, FusionReason,
    LoopDepthTree, LoopFuser, LoopFusionPass,
};
