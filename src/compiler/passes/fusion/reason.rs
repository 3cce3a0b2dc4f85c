//! Why a loop or a pair of loops was not fused.

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

/// A negative fusion outcome.
///
/// The first group is reported for a single loop, either while its candidate
/// is built or when its eligibility is checked. The second group is reported
/// for an ordered pair of candidates by the legality checks, which run in the
/// order the variants are declared.
///
/// These are expected results, never errors: the sweep records the reason and
/// moves on to the next candidate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, EnumIter, EnumCount, IntoStaticStr)]
pub enum FusionReason {
    /// The loop has no preheader.
    InvalidPreheader,
    /// The loop has no header.
    InvalidHeader,
    /// The loop has no unique exiting block.
    InvalidExitingBlock,
    /// The loop has no unique exit block.
    InvalidExitBlock,
    /// The loop has no unique latch.
    InvalidLatch,
    /// The loop was erased from the forest.
    InvalidLoop,
    /// A block of the loop has its address taken.
    AddressTakenBlock,
    /// An instruction of the loop may unwind.
    MayThrowException,
    /// The loop contains a volatile load or store.
    ContainsVolatileAccess,
    /// The loop is not in simplified form.
    NotSimplifiedForm,
    /// The loop has no loop-invariant backedge-taken count.
    UnknownTripCount,

    /// One of the trip counts cannot be computed.
    UncomputableTripCount,
    /// The trip counts differ.
    NonEqualTripCount,
    /// The second loop does not start where the first one ends.
    NonAdjacent,
    /// The guard branches compute different conditions.
    NonIdenticalGuards,
    /// The second loop's preheader holds more than its terminator.
    NonEmptyPreheader,
    /// The first loop's exit block holds more than its terminator.
    NonEmptyExitBlock,
    /// The second loop's guard block holds more than its condition and branch.
    NonEmptyGuardBlock,
    /// A memory or value dependence would be reversed.
    InvalidDependencies,
    /// The profitability check declined the pair.
    FusionNotBeneficial,
}

impl FusionReason {
    /// Human-readable description, used in remarks.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidPreheader => "Loop has invalid preheader",
            Self::InvalidHeader => "Loop has invalid header",
            Self::InvalidExitingBlock => "Loop has invalid exiting blocks",
            Self::InvalidExitBlock => "Loop has invalid exit block",
            Self::InvalidLatch => "Loop has invalid latch",
            Self::InvalidLoop => "Loop is invalid",
            Self::AddressTakenBlock => "Basic block has address taken",
            Self::MayThrowException => "Loop may throw an exception",
            Self::ContainsVolatileAccess => "Loop contains a volatile access",
            Self::NotSimplifiedForm => "Loop is not in simplified form",
            Self::UnknownTripCount => "Loop has unknown trip count",
            Self::UncomputableTripCount => "Trip count of loop cannot be computed",
            Self::NonEqualTripCount => "Loop trip counts are not the same",
            Self::NonAdjacent => "Loops are not adjacent",
            Self::NonIdenticalGuards => "Candidates have different guards",
            Self::NonEmptyPreheader => "Loop has a non-empty preheader",
            Self::NonEmptyExitBlock => "Candidate has a non-empty exit block",
            Self::NonEmptyGuardBlock => "Candidate has a non-empty guard block",
            Self::InvalidDependencies => "Dependencies prevent fusion",
            Self::FusionNotBeneficial => "Fusion is not beneficial",
        }
    }

    /// Returns true for reasons found while building or checking one loop.
    #[must_use]
    pub fn is_candidate_reason(&self) -> bool {
        matches!(
            self,
            Self::InvalidPreheader
                | Self::InvalidHeader
                | Self::InvalidExitingBlock
                | Self::InvalidExitBlock
                | Self::InvalidLatch
                | Self::InvalidLoop
                | Self::AddressTakenBlock
                | Self::MayThrowException
                | Self::ContainsVolatileAccess
                | Self::NotSimplifiedForm
                | Self::UnknownTripCount
        )
    }
}

impl fmt::Display for FusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Outcome of a single legality check.
pub(crate) type Legality = std::result::Result<(), FusionReason>;

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_descriptions_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for reason in FusionReason::iter() {
            assert!(seen.insert(reason.description()), "{reason:?}");
        }
        assert_eq!(seen.len(), FusionReason::COUNT);
    }

    #[test]
    fn test_candidate_partition() {
        let pair: Vec<_> = FusionReason::iter()
            .filter(|r| !r.is_candidate_reason())
            .collect();
        assert_eq!(pair.first(), Some(&FusionReason::UncomputableTripCount));
        assert_eq!(pair.last(), Some(&FusionReason::FusionNotBeneficial));
        let name: &'static str = FusionReason::NonAdjacent.into();
        assert_eq!(name, "NonAdjacent");
    }
}
