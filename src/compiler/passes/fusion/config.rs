//! Configuration for the loop fusion pass.

/// Strategy used to decide whether a pair of memory accesses blocks fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependenceAnalysis {
    /// Symbolic comparison of the access functions only.
    Scev,
    /// The general dependence oracle only.
    Da,
    /// Accept the pair if either test finds no violation.
    #[default]
    All,
}

/// Configuration for [`LoopFuser`](crate::compiler::LoopFuser).
///
/// # Examples
///
/// ```rust
/// use loopfuse::compiler::{DependenceAnalysis, FusionConfig};
///
/// let config = FusionConfig::scev_only();
/// assert_eq!(config.dependence_analysis, DependenceAnalysis::Scev);
/// assert!(FusionConfig::verbose().verbose);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionConfig {
    /// Dependence test used by the legality checks.
    pub dependence_analysis: DependenceAnalysis,

    /// Re-verify the function, the dominance trees and the loop forest after
    /// every fusion (default: on in debug builds)
    pub verify: bool,

    /// Trace every dependence query (default: false)
    pub verbose: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            dependence_analysis: DependenceAnalysis::All,
            verify: cfg!(debug_assertions),
            verbose: false,
        }
    }
}

impl FusionConfig {
    /// Uses only the symbolic access comparison.
    #[must_use]
    pub fn scev_only() -> Self {
        Self {
            dependence_analysis: DependenceAnalysis::Scev,
            ..Self::default()
        }
    }

    /// Uses only the general dependence oracle.
    #[must_use]
    pub fn da_only() -> Self {
        Self {
            dependence_analysis: DependenceAnalysis::Da,
            ..Self::default()
        }
    }

    /// Default strategy with dependence tracing enabled.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            ..Self::default()
        }
    }

    /// Returns a copy with `verify` set.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}
