//! Graph algorithms used by the loop analyses.
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | Dominators | O(V α(V)) | loop detection, candidate ordering |
//! | Post-dominators | O(V α(V)) | control-flow equivalence |

mod dominators;

pub use dominators::{
    compute_dominators, compute_dominators_rooted, compute_post_dominators, has_unique_root,
    DominatorIterator, DominatorTree, PostDominatorTree,
};
