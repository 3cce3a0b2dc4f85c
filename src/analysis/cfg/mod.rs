//! Control-flow structure of a function: loops and dominance.
//!
//! The CFG itself is the [`Function`](crate::analysis::Function); this module
//! layers the analyses loop fusion consults and keeps up to date.
//!
//! # Key Components
//!
//! - [`LoopForest`] / [`LoopInfo`] - natural loops, nesting, and structural
//!   queries (preheader, latch, exiting and exit blocks, guard branch)
//! - [`DomTreeUpdater`] - owns the dominator and post-dominator trees and
//!   applies edge edits in batches
//!
//! # Examples
//!
//! ```rust,ignore
//! use loopfuse::analysis::{DomTreeUpdater, LoopForest};
//!
//! let forest = LoopForest::analyze(&func);
//! let dtu = DomTreeUpdater::new(&func);
//! for id in forest.top_level() {
//!     let header = forest.get(id).unwrap().header;
//!     assert!(dtu.dominates(func.entry(), header));
//! }
//! ```

mod loops;
mod updater;

pub use loops::{detect_loops, LoopForest, LoopId, LoopInfo};
pub use updater::{DomTreeUpdater, DomUpdate};
