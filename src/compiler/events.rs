//! Transformation statistics.
//!
//! Every rewrite a pass performs is appended to an [`EventLog`] as one
//! [`Event`]. Passes never read the log back; it exists for callers, tests and
//! tooling. Since analyses that find nothing to do record nothing, an
//! unchanged log after a second pipeline run shows that the graph reached a
//! fixpoint.
//!
//! # Example
//!
//! ```rust
//! use optigraph::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .message("3 + 4 -> 7")
//!     .pass("constant_folding");
//!
//! assert_eq!(log.count_kind(EventKind::ConstantFolded), 1);
//! assert_eq!(log.summary(), "1 constant folded");
//! ```

use std::fmt;

use rustc_hash::FxHashMap;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::ir::InstrId;

/// What kind of rewrite an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum EventKind {
    /// An instruction with constant inputs was replaced by its value.
    #[strum(to_string = "constant folded")]
    ConstantFolded,
    /// An instruction was replaced because one input decides its result.
    #[strum(to_string = "absorbing input simplified")]
    AbsorbingInputSimplified,
    /// A use was replaced by the value implied by a dominating branch.
    #[strum(to_string = "branch value propagated")]
    PropagatedIfValue,
    /// Operands were swapped to group loop-invariant values.
    #[strum(to_string = "loop invariant regrouped")]
    LoopInvariantRegrouped,
    /// Two instructions were fused into a target-specific one.
    #[strum(to_string = "instruction fused")]
    ArchSimplification,
    /// A loop received a new peeling or unrolling decision.
    #[strum(to_string = "loop annotated")]
    LoopPolicyAnnotated,
    /// A store's write barrier was removed.
    #[strum(to_string = "write barrier removed")]
    RemovedWriteBarrier,
    /// Two adjacent reference reads now share one read barrier.
    #[strum(to_string = "read barrier merged")]
    ReadBarrierMerged,
}

impl EventKind {
    /// Short lowercase description, also used by `Display`.
    #[must_use]
    pub fn description(self) -> &'static str {
        self.into()
    }
}

/// Where in which method an event happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSite {
    /// Name of the method's graph.
    pub method: String,
    /// The instruction that was rewritten or that triggered the rewrite.
    pub instr: InstrId,
}

/// One recorded rewrite.
#[derive(Debug, Clone)]
pub struct Event {
    /// The kind of rewrite.
    pub kind: EventKind,
    /// Method and instruction, when known.
    pub site: Option<EventSite>,
    /// Free-form detail; defaults to the kind's description.
    pub message: String,
    /// Name of the recording pass.
    pub pass: Option<&'static str>,
}

impl Event {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            site: None,
            message: kind.description().to_string(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(site) = &self.site {
            write!(f, " ({} @ {})", site.method, site.instr)?;
        }
        Ok(())
    }
}

/// Fills in an [`Event`] and appends it to its log when dropped.
///
/// Returned by [`EventLog::record`].
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Event,
}

impl EventBuilder<'_> {
    /// Attaches the method and instruction.
    pub fn at(mut self, method: &str, instr: InstrId) -> Self {
        self.event.site = Some(EventSite {
            method: method.to_string(),
            instr,
        });
        self
    }

    /// Replaces the default message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.event.message = message.into();
        self
    }

    /// Names the recording pass.
    pub fn pass(mut self, name: &'static str) -> Self {
        self.event.pass = Some(name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let kind = self.event.kind;
        let event = std::mem::replace(&mut self.event, Event::new(kind));
        self.log.events.push(event);
    }
}

/// Receiver of per-transformation counts.
///
/// Implemented by [`EventLog`]; embedders with their own telemetry implement
/// it instead.
pub trait StatsSink: Send + Sync {
    /// Records that one transformation of `kind` happened.
    fn record_event(&self, kind: EventKind);
}

/// Iterator over the events of an [`EventLog`], in recording order.
pub type EventLogIter<'a> = std::iter::Map<boxcar::Iter<'a, Event>, fn((usize, &'a Event)) -> &'a Event>;

fn entry_event((_, event): (usize, &Event)) -> &Event {
    event
}

/// Append-only, thread-safe list of events.
///
/// Appending takes `&self`, so one log shared through an `Arc` collects the
/// events of methods compiled on different threads.
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
        self.iter().cloned().collect()
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<I: IntoIterator<Item = Event>>(events: I) -> Self {
        let log = Self::new();
        for event in events {
            log.events.push(event);
        }
        log
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts an event of `kind`; it is appended when the builder drops.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Event::new(kind),
        }
    }

    /// Iterates the events in recording order.
    #[must_use]
    pub fn iter<'a>(&'a self) -> EventLogIter<'a> {
        self.events.iter().map(entry_event as fn((usize, &'a Event)) -> &'a Event)
    }

    /// Counts the events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Iterates the events recorded by the pass named `pass`.
    pub fn filter_pass<'a>(&'a self, pass: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.pass == Some(pass))
    }

    /// Returns the non-zero counts per kind, in declaration order of [`EventKind`].
    #[must_use]
    pub fn counts(&self) -> Vec<(EventKind, usize)> {
        let mut by_kind: FxHashMap<EventKind, usize> = FxHashMap::default();
        for event in self {
            *by_kind.entry(event.kind).or_default() += 1;
        }
        EventKind::iter()
            .filter_map(|kind| by_kind.get(&kind).map(|&count| (kind, count)))
            .collect()
    }

    /// One-line summary such as `"2 constant folded, 1 read barrier merged"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .counts()
            .into_iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();
        if parts.is_empty() {
            "no events".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl StatsSink for EventLog {
    fn record_event(&self, kind: EventKind) {
        self.events.push(Event::new(kind));
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
