//! One loop as a fusion participant.

use std::fmt;

use log::debug;

use crate::{
    analysis::{
        DomTreeUpdater, Function, InstId, LoopForest, LoopId, Operand, ScalarEvolution,
        SourceLoc,
    },
    compiler::{EventKind, EventLog, FusionReason},
    utils::graph::NodeId,
    Result,
};

/// A loop together with the structural anchors fusion works with.
///
/// The anchors and memory-access lists are captured once, when the candidate
/// is built, and never change afterwards. Fusing two candidates produces a new
/// candidate for the surviving loop instead of updating either of them, so the
/// dominance-ordered sets they live in never hold stale positions.
///
/// A candidate is *valid* when all anchors exist, the loop is still live in
/// the forest, and construction found nothing that rules the loop out
/// (an address-taken block, an instruction that may throw, or a volatile
/// access).
#[derive(Debug, Clone)]
pub struct FusionCandidate {
    loop_id: LoopId,
    preheader: Option<NodeId>,
    header: Option<NodeId>,
    exiting_block: Option<NodeId>,
    exit_block: Option<NodeId>,
    latch: Option<NodeId>,
    guard: Option<NodeId>,
    non_loop: Option<NodeId>,
    reads: Vec<InstId>,
    writes: Vec<InstId>,
    location: Option<SourceLoc>,
    loop_live: bool,
    valid: bool,
}

impl FusionCandidate {
    /// Builds the candidate for `loop_id`.
    ///
    /// Walks every block of the loop once. The first address-taken block,
    /// throwing instruction or volatile access invalidates the candidate and
    /// is reported to `events`; otherwise every instruction that may write or
    /// read memory is collected.
    #[must_use]
    pub fn new(loop_id: LoopId, func: &Function, forest: &LoopForest, events: &EventLog) -> Self {
        let info = forest.get(loop_id);
        let header = info.map(|l| l.header);
        let latch = info.and_then(|l| l.latch(func));

        let mut candidate = Self {
            loop_id,
            preheader: info.and_then(|l| l.preheader(func)),
            header,
            exiting_block: info.and_then(|l| l.exiting_block(func)),
            exit_block: info.and_then(|l| l.exit_block(func)),
            latch,
            guard: None,
            non_loop: None,
            reads: Vec::new(),
            writes: Vec::new(),
            location: header.and_then(|h| func.block(h)).and_then(|b| b.loc()),
            loop_live: info.is_some(),
            valid: true,
        };

        let Some(info) = info else {
            return candidate;
        };

        if info.is_rotated(func) {
            candidate.guard = info.guard_block(func);
            candidate.non_loop = candidate.guard.and_then(|guard| {
                let block = func.block(guard)?;
                let (first, second) = (block.successor(0)?, block.successor(1)?);
                Some(if Some(first) == candidate.preheader {
                    second
                } else {
                    first
                })
            });
        }

        for block in info.body.iter().filter_map(|&id| func.block(id)) {
            if block.has_address_taken() {
                candidate.invalidate(func, events, FusionReason::AddressTakenBlock);
                return candidate;
            }
            for inst in block.instructions() {
                let op = inst.op();
                if op.may_throw() {
                    candidate.invalidate(func, events, FusionReason::MayThrowException);
                    return candidate;
                }
                if op.is_volatile() {
                    candidate.invalidate(func, events, FusionReason::ContainsVolatileAccess);
                    return candidate;
                }
                if op.may_write_memory() {
                    candidate.writes.push(inst.id());
                }
                if op.may_read_memory() {
                    candidate.reads.push(inst.id());
                }
            }
        }

        candidate
    }

    fn invalidate(&mut self, func: &Function, events: &EventLog, reason: FusionReason) {
        self.reads.clear();
        self.writes.clear();
        self.valid = false;
        self.report_invalid(func, events, reason);
    }

    fn report_invalid(&self, func: &Function, events: &EventLog, reason: FusionReason) {
        debug!(
            "{}: {} is not a fusion candidate: {}",
            func.name(),
            self.loop_id,
            reason
        );
        events
            .record(EventKind::CandidateRejected)
            .function(func.name())
            .block(self.name(func))
            .at(self.location)
            .reason(reason)
            .message(format!(
                "Loop is not a candidate for fusion: {}",
                reason.description()
            ));
    }

    /// Name used for the candidate in remarks: its preheader, or its header
    /// when there is no preheader.
    #[must_use]
    pub fn name(&self, func: &Function) -> String {
        self.preheader
            .or(self.header)
            .map_or_else(|| self.loop_id.to_string(), |b| func.block_name(b))
    }

    /// Returns true if every anchor exists and nothing ruled the loop out.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.preheader.is_some()
            && self.header.is_some()
            && self.exiting_block.is_some()
            && self.exit_block.is_some()
            && self.latch.is_some()
            && self.loop_live
            && self.valid
    }

    /// Returns true if this single loop could take part in a fusion.
    ///
    /// Besides validity, the loop needs a loop-invariant backedge-taken count
    /// and must be in simplified form. Every failure is reported to `events`;
    /// an invalid candidate reports each missing anchor separately.
    #[must_use]
    pub fn is_eligible_for_fusion(
        &self,
        func: &Function,
        forest: &LoopForest,
        scev: &dyn ScalarEvolution,
        events: &EventLog,
    ) -> bool {
        if !self.is_valid() {
            let missing = [
                (self.preheader.is_none(), FusionReason::InvalidPreheader),
                (self.header.is_none(), FusionReason::InvalidHeader),
                (self.exiting_block.is_none(), FusionReason::InvalidExitingBlock),
                (self.exit_block.is_none(), FusionReason::InvalidExitBlock),
                (self.latch.is_none(), FusionReason::InvalidLatch),
                (!self.loop_live, FusionReason::InvalidLoop),
            ];
            for (_, reason) in missing.iter().filter(|(missing, _)| *missing) {
                self.report_invalid(func, events, *reason);
            }
            return false;
        }

        if !scev.has_loop_invariant_backedge_taken_count(self.loop_id) {
            self.report_invalid(func, events, FusionReason::UnknownTripCount);
            return false;
        }

        if !forest.get(self.loop_id).is_some_and(|l| l.is_simplified(func)) {
            self.report_invalid(func, events, FusionReason::NotSimplifiedForm);
            return false;
        }

        true
    }

    /// Checks that the cached anchors still describe the loop and that the
    /// entry block dominates the header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`](crate::Error::Invariant) on the first
    /// mismatch.
    pub fn verify(&self, func: &Function, forest: &LoopForest, dtu: &DomTreeUpdater) -> Result<()> {
        if !self.is_valid() {
            return Err(invariant_error!("candidate for {} is not valid", self.loop_id));
        }
        let info = forest.loop_checked(self.loop_id)?;
        let anchors = [
            ("preheader", self.preheader, info.preheader(func)),
            ("header", self.header, Some(info.header)),
            ("exiting block", self.exiting_block, info.exiting_block(func)),
            ("exit block", self.exit_block, info.exit_block(func)),
            ("latch", self.latch, info.latch(func)),
        ];
        for (what, cached, actual) in anchors {
            if cached != actual {
                return Err(invariant_error!(
                    "{} of {} is out of sync: cached {:?}, actual {:?}",
                    what,
                    self.loop_id,
                    cached,
                    actual
                ));
            }
        }
        if let (Some(entry), Some(header)) = (self.entry_block(), self.header) {
            if !dtu.dominates(entry, header) {
                return Err(invariant_error!(
                    "entry {} of {} does not dominate its header",
                    entry,
                    self.loop_id
                ));
            }
        }
        Ok(())
    }

    /// The loop this candidate stands for.
    #[must_use]
    pub fn loop_id(&self) -> LoopId {
        self.loop_id
    }

    /// The preheader.
    #[must_use]
    pub fn preheader(&self) -> Option<NodeId> {
        self.preheader
    }

    /// The header.
    #[must_use]
    pub fn header(&self) -> Option<NodeId> {
        self.header
    }

    /// The single exiting block.
    #[must_use]
    pub fn exiting_block(&self) -> Option<NodeId> {
        self.exiting_block
    }

    /// The single exit block.
    #[must_use]
    pub fn exit_block(&self) -> Option<NodeId> {
        self.exit_block
    }

    /// The single latch.
    #[must_use]
    pub fn latch(&self) -> Option<NodeId> {
        self.latch
    }

    /// The block ending in the guard branch, for guarded loops.
    #[must_use]
    pub fn guard_block(&self) -> Option<NodeId> {
        self.guard
    }

    /// Returns true if the loop is guarded.
    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    /// The guard block if guarded, else the preheader.
    #[must_use]
    pub fn entry_block(&self) -> Option<NodeId> {
        self.guard.or(self.preheader)
    }

    /// For a guarded loop, the guard successor that skips the loop.
    #[must_use]
    pub fn non_loop_block(&self) -> Option<NodeId> {
        self.non_loop
    }

    /// The condition of the guard branch.
    #[must_use]
    pub fn guard_condition(&self, func: &Function) -> Option<Operand> {
        match func.block(self.guard?)?.terminator()?.op() {
            crate::analysis::Op::Branch { condition, .. } => Some(*condition),
            _ => None,
        }
    }

    /// Returns true if the latch is also the exiting block.
    #[must_use]
    pub fn is_rotated(&self) -> bool {
        self.latch.is_some() && self.latch == self.exiting_block
    }

    /// Instructions that may read memory, in block order.
    #[must_use]
    pub fn reads(&self) -> &[InstId] {
        &self.reads
    }

    /// Instructions that may write memory, in block order.
    #[must_use]
    pub fn writes(&self) -> &[InstId] {
        &self.writes
    }

    /// Source location of the loop header.
    #[must_use]
    pub fn location(&self) -> Option<SourceLoc> {
        self.location
    }
}

impl fmt::Display for FusionCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show =
            |block: Option<NodeId>| block.map_or_else(|| "none".to_string(), |b| b.to_string());
        write!(
            f,
            "{} [header: {}, entry: {}, preheader: {}, exiting: {}, exit: {}, latch: {}, guard: {}]",
            self.loop_id,
            show(self.header),
            show(self.entry_block()),
            show(self.preheader),
            show(self.exiting_block),
            show(self.exit_block),
            show(self.latch),
            show(self.guard),
        )?;
        if !self.is_valid() {
            f.write_str(" (invalid)")?;
        }
        Ok(())
    }
}
