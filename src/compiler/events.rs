//! Event logging for the loop fusion pass.
//!
//! Every decision the pass takes is recorded as an [`Event`]: candidates
//! collected or rejected, pairs that could not be fused and why, fusions and
//! the blocks they removed. The log is purely observational; nothing in the
//! pass reads it back to make a decision.
//!
//! # Architecture
//!
//! - [`Event`] - a single recorded event
//! - [`EventLog`] - append-only collection with query and summary helpers
//! - [`EventBuilder`] - fluent API for creating events
//! - [`FusionStats`] - statistics derived from a log
//!
//! # Example
//!
//! ```rust
//! use loopfuse::compiler::{EventKind, EventLog, FusionReason, FusionStats};
//!
//! let log = EventLog::new();
//! log.record(EventKind::FusionMissed)
//!     .function("kernel")
//!     .blocks("bb1", "bb4")
//!     .reason(FusionReason::NonAdjacent);
//! log.info("sweep finished");
//!
//! let stats = FusionStats::from_log(&log);
//! assert_eq!(stats.missed, 1);
//! assert_eq!(log.remarks(), vec!["kernel: bb1 and bb4: Loops are not adjacent"]);
//! ```

use std::{collections::HashMap, fmt};

use crate::{analysis::SourceLoc, compiler::FusionReason};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A loop became a fusion candidate.
    CandidateCollected,
    /// A loop was rejected as a fusion candidate.
    CandidateRejected,
    /// A pair of candidates was not fused.
    FusionMissed,
    /// Two loops were fused.
    LoopsFused,
    /// A block was deleted by a fusion.
    BlockRemoved,

    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::CandidateCollected => "candidate collected",
            Self::CandidateRejected => "candidate rejected",
            Self::FusionMissed => "fusion missed",
            Self::LoopsFused => "loops fused",
            Self::BlockRemoved => "block removed",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a change to the function.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(self, Self::LoopsFused | Self::BlockRemoved)
    }

    /// Returns true if this event carries a user-facing optimization remark.
    #[must_use]
    pub fn is_remark(&self) -> bool {
        matches!(
            self,
            Self::CandidateRejected | Self::FusionMissed | Self::LoopsFused
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Why a candidate or pair was rejected.
    pub reason: Option<FusionReason>,
    /// The function the event belongs to.
    pub function: Option<String>,
    /// Source location of the loop concerned.
    pub location: Option<SourceLoc>,
    /// Names of the blocks involved, usually the preheaders.
    pub blocks: Vec<String>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason: None,
            function: None,
            location: None,
            blocks: Vec::new(),
            message: message.into(),
            pass: None,
        }
    }

    /// The remark text: `"<function>: <block> and <block>: <message>"`.
    #[must_use]
    pub fn remark(&self) -> String {
        let mut text = String::new();
        if let Some(function) = &self.function {
            text.push_str(function);
            text.push_str(": ");
        }
        if !self.blocks.is_empty() {
            text.push_str(&self.blocks.join(" and "));
            text.push_str(": ");
        }
        text.push_str(&self.message);
        text
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.remark())?;
        if let Some(location) = self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the
/// builder is dropped. Without an explicit message, the reason's description
/// is used, falling back to the kind's description.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Event,
    message: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            event: Event::new(kind, String::new()),
            message: None,
        }
    }

    /// Sets the function the event belongs to.
    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.event.function = Some(name.into());
        self
    }

    /// Sets the source location, if known.
    pub fn at(mut self, location: Option<SourceLoc>) -> Self {
        self.event.location = location;
        self
    }

    /// Names a single block involved in the event.
    pub fn block(mut self, name: impl Into<String>) -> Self {
        self.event.blocks.push(name.into());
        self
    }

    /// Names the two blocks of a candidate pair.
    pub fn blocks(self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.block(first).block(second)
    }

    /// Sets the rejection reason.
    pub fn reason(mut self, reason: FusionReason) -> Self {
        self.event.reason = Some(reason);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.event.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let mut event = std::mem::replace(&mut self.event, Event::new(EventKind::Info, ""));
        event.message = self.message.take().unwrap_or_else(|| {
            event.reason.map_or_else(
                || event.kind.description().to_string(),
                |reason| reason.description().to_string(),
            )
        });
        self.log.events.push(event);
    }
}

/// Collection of events from a fusion sweep.
///
/// Statistics are derived from the events rather than tracked separately.
/// Events can be appended through a shared reference, so a log can be
/// borrowed by diagnostics code while the function is mutably borrowed.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge_ref(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of every event in `other`.
    pub fn merge_ref(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Returns true if any event carries `reason`.
    #[must_use]
    pub fn has_reason(&self, reason: FusionReason) -> bool {
        self.events.iter().any(|(_, e)| e.reason == Some(reason))
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Counts events carrying `reason`.
    #[must_use]
    pub fn count_reason(&self, reason: FusionReason) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.reason == Some(reason))
            .count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events of one function.
    pub fn filter_function<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.function.as_deref() == Some(name))
    }

    /// Returns an iterator over warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Returns an iterator over error events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Remark texts of every rejection and fusion, in recording order.
    #[must_use]
    pub fn remarks(&self) -> Vec<String> {
        self.iter()
            .filter(|e| e.kind.is_remark())
            .map(Event::remark)
            .collect()
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Counts events grouped by rejection reason.
    #[must_use]
    pub fn count_by_reason(&self) -> HashMap<FusionReason, usize> {
        let mut counts = HashMap::new();
        for reason in self.iter().filter_map(|e| e.reason) {
            *counts.entry(reason).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| !k.is_diagnostic())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator wrapper for EventLog that yields &Event
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

/// Statistics derived from an EventLog.
#[derive(Debug, Clone, Default)]
pub struct FusionStats {
    /// Number of loops that became fusion candidates.
    pub candidates: usize,
    /// Number of loops rejected as candidates.
    pub rejected: usize,
    /// Number of candidate pairs that were not fused.
    pub missed: usize,
    /// Number of fusions performed.
    pub fused: usize,
    /// Number of blocks deleted by fusions.
    pub blocks_removed: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of errors.
    pub errors: usize,
    /// Occurrences of every rejection reason.
    pub reasons: HashMap<FusionReason, usize>,
}

impl FusionStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            candidates: get(EventKind::CandidateCollected),
            rejected: get(EventKind::CandidateRejected),
            missed: get(EventKind::FusionMissed),
            fused: get(EventKind::LoopsFused),
            blocks_removed: get(EventKind::BlockRemoved),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
            reasons: log.count_by_reason(),
        }
    }

    /// Occurrences of `reason`.
    #[must_use]
    pub fn reason(&self, reason: FusionReason) -> usize {
        self.reasons.get(&reason).copied().unwrap_or(0)
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if self.candidates > 0 {
            parts.push(format!("{} candidates", self.candidates));
        }
        if self.fused > 0 {
            parts.push(format!("{} loops fused", self.fused));
        }
        if self.missed > 0 {
            parts.push(format!("{} pairs not fused", self.missed));
        }
        if self.rejected > 0 {
            parts.push(format!("{} loops rejected", self.rejected));
        }
        if self.blocks_removed > 0 {
            parts.push(format!("{} blocks removed", self.blocks_removed));
        }
        if self.errors > 0 {
            parts.push(format!("{} errors", self.errors));
        }
        if self.warnings > 0 {
            parts.push(format!("{} warnings", self.warnings));
        }

        if parts.is_empty() {
            "no fusion activity".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl fmt::Display for FusionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(!log.has(EventKind::LoopsFused));
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_default_message_from_reason() {
        let log = EventLog::new();
        log.record(EventKind::CandidateRejected)
            .function("f")
            .block("bb3")
            .at(Some(SourceLoc::new(4, 2)))
            .reason(FusionReason::MayThrowException);

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "Loop may throw an exception");
        assert_eq!(event.location, Some(SourceLoc::new(4, 2)));
        assert_eq!(event.remark(), "f: bb3: Loop may throw an exception");
        assert_eq!(
            event.to_string(),
            "[candidate rejected] f: bb3: Loop may throw an exception (4:2)"
        );
    }

    #[test]
    fn test_default_message_from_kind() {
        let log = EventLog::new();
        log.record(EventKind::LoopsFused).blocks("bb1", "bb5");
        let event = log.iter().next().unwrap();
        assert_eq!(event.remark(), "bb1 and bb5: loops fused");
    }

    #[test]
    fn test_pass_and_custom_message() {
        let log = EventLog::new();
        log.record(EventKind::PassStarted)
            .pass("LoopFusion")
            .message("sweeping f");
        let event = log.iter().next().unwrap();
        assert_eq!(event.pass.as_deref(), Some("LoopFusion"));
        assert_eq!(event.message, "sweeping f");
    }

    #[test]
    fn test_info_warn_error() {
        let log = EventLog::new();

        log.info("informational message");
        log.warn("warning message");
        log.error("error message");

        assert_eq!(log.count_kind(EventKind::Info), 1);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.errors().count(), 1);
        assert!(log.remarks().is_empty());
    }

    #[test]
    fn test_merge_and_clone() {
        let log1 = EventLog::new();
        let log2 = EventLog::new();

        log1.record(EventKind::LoopsFused);
        log2.record(EventKind::FusionMissed)
            .reason(FusionReason::NonEqualTripCount);

        log1.merge_ref(&log2);
        let copy = log1.clone();

        assert_eq!(copy.len(), 2);
        assert!(copy.has_reason(FusionReason::NonEqualTripCount));
        assert_eq!(log2.len(), 1);
    }

    #[test]
    fn test_filter_function() {
        let log = EventLog::new();
        log.record(EventKind::LoopsFused).function("a");
        log.record(EventKind::LoopsFused).function("b");
        log.record(EventKind::BlockRemoved).function("a");

        assert_eq!(log.filter_function("a").count(), 2);
    }

    #[test]
    fn test_fusion_stats() {
        let log = EventLog::new();
        log.record(EventKind::CandidateCollected);
        log.record(EventKind::CandidateCollected);
        log.record(EventKind::CandidateCollected);
        log.record(EventKind::CandidateRejected)
            .reason(FusionReason::ContainsVolatileAccess);
        log.record(EventKind::FusionMissed)
            .reason(FusionReason::InvalidDependencies);
        log.record(EventKind::LoopsFused);
        log.record(EventKind::BlockRemoved);
        log.warn("odd");

        let stats = FusionStats::from_log(&log);
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.missed, 1);
        assert_eq!(stats.fused, 1);
        assert_eq!(stats.blocks_removed, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.reason(FusionReason::InvalidDependencies), 1);
        assert_eq!(stats.reason(FusionReason::NonAdjacent), 0);
        assert!(stats.to_string().contains("1 loops fused"));
    }

    #[test]
    fn test_thread_safe_append() {
        use std::sync::Arc;
        use std::thread;

        let log = Arc::new(EventLog::new());
        let mut handles = vec![];

        for i in 0..4 {
            let log_clone = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                for j in 0..50 {
                    log_clone
                        .record(EventKind::CandidateCollected)
                        .function(format!("f{i}"))
                        .message(format!("loop {j}"));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 200);
    }
}
