//! Directed-graph infrastructure for control-flow analysis.
//!
//! Analyses are written against small capability traits ([`GraphBase`],
//! [`Successors`], [`Predecessors`], [`RootedGraph`]) rather than a concrete
//! graph type. The IR's [`Function`](crate::analysis::Function) implements them
//! directly over its block terminators, so no separate CFG object has to be
//! kept in sync while fusion rewrites edges.
//!
//! # Components
//!
//! - [`NodeId`]: strongly-typed block index
//! - [`Reversed`]: edge-reversed view with a virtual exit, used for post-dominance
//! - [`algorithms`]: dominator and post-dominator trees

mod node;
mod reversed;
pub(crate) mod traits;

pub mod algorithms;

pub use node::NodeId;
pub use reversed::Reversed;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
