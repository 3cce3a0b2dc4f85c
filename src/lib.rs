// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![deny(unsafe_code)]

//! # loopfuse
//!
//! A loop fusion engine over a small SSA intermediate representation.
//!
//! `loopfuse` finds adjacent sibling loops that run the same number of
//! iterations, proves that merging them cannot reverse a memory or value
//! dependence, and splices them into a single loop while keeping the
//! dominator tree, the post-dominator tree, the loop forest and the scalar
//! evolution tables valid.
//!
//! ## Features
//!
//! - **🧱 SSA IR** - Functions, blocks, phi nodes and a closure-based builder
//! - **🌳 Loop forest** - Natural loop detection with preheader, latch, exit and guard queries
//! - **🧭 Dominance** - Dominator and post-dominator trees with batched edge updates
//! - **📐 Scalar evolution** - Affine recurrences, trip counts and predicate proofs
//! - **🔗 Dependence testing** - Symbolic access comparison plus a pluggable oracle
//! - **📝 Remarks** - Every fusion and every rejection recorded with its reason
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loopfuse::prelude::*;
//!
//! fn fuse(func: &mut Function) -> loopfuse::Result<FusionStats> {
//!     let mut forest = LoopForest::analyze(func);
//!     let mut dtu = DomTreeUpdater::new(func);
//!     let mut se = AffineEvolution::analyze(func, &forest);
//!     let oracle = BaseDisjointDependence::new();
//!     let events = EventLog::new();
//!
//!     let mut ctx = FusionContext::new(func, &mut forest, &mut dtu, &mut se, &oracle, &events);
//!     let outcome = LoopFuser::new(FusionConfig::default()).run(&mut ctx)?;
//!     println!("fused {} pairs", outcome.fused);
//!
//!     Ok(FusionStats::from_log(&events))
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`analysis`] - IR, loop forest, dominance updater, scalar evolution, dependence oracles
//! - [`compiler`] - pass trait, fusion context, event log and the loop fusion pass
//! - [`utils`] - generic graph traits and dominator algorithms
//! - [`prelude`] - the commonly used types in one import
//!
//! ## Error Handling
//!
//! Operations that can fail return [`Result<T>`]. Loops that cannot be fused
//! are not errors: the reason is recorded in the [`compiler::EventLog`] and the
//! sweep continues. An [`Error`] means the IR handed in was malformed, or the
//! transform broke one of its own invariants.

#[macro_use]
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use loopfuse::prelude::*;
///
/// let config = FusionConfig::default();
/// assert_eq!(config.dependence_analysis, DependenceAnalysis::All);
/// ```
pub mod prelude;

/// Program analyses consulted and maintained by loop fusion.
pub mod analysis;

/// Pass infrastructure and the loop fusion pass.
pub mod compiler;

/// Generic graph infrastructure.
pub mod utils;

/// `loopfuse` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is
/// always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `loopfuse` Error type.
///
/// See the [`Error`] documentation for the full list of variants.
pub use error::Error;
