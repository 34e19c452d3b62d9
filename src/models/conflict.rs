//! Conflict model.
//!
//! Conflicts are derived data: they are recomputed from train and section
//! state on every evaluation and never mutated in place. Their id is a
//! pure function of kind, section and involved trains, so the same
//! situation keeps the same id across evaluations.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{TimeWindow, TrainPriority};

/// Classification of conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Two successive trains closer than the safety headway.
    HeadwayViolation,
    /// More simultaneous trains than the section allows.
    CapacityExceeded,
    /// A lower-priority train forces a higher-priority one to wait too long.
    PrecedenceViolation,
    /// A train is routed through a section that is closed or in a
    /// maintenance window.
    SectionUnavailable,
}

impl ConflictKind {
    fn severity_bonus(&self) -> u32 {
        match self {
            Self::SectionUnavailable => 40,
            Self::CapacityExceeded => 30,
            Self::HeadwayViolation => 20,
            Self::PrecedenceViolation => 10,
        }
    }

    /// Short lowercase name, used in conflict ids and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            Self::HeadwayViolation => "headway",
            Self::CapacityExceeded => "capacity",
            Self::PrecedenceViolation => "precedence",
            Self::SectionUnavailable => "unavailable",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A detected conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Deterministic identifier.
    pub id: String,
    /// Conflict type.
    pub kind: ConflictKind,
    /// Section where the conflict occurs.
    pub section_id: String,
    /// Involved trains (sorted, deduplicated).
    pub train_ids: Vec<String>,
    /// Highest declared priority among the involved trains.
    pub highest_priority: TrainPriority,
    /// Time span the conflict covers.
    pub window: TimeWindow,
    /// Impact score (higher = worse).
    pub severity: u32,
    /// Detection time (ms).
    pub detected_at_ms: i64,
}

impl Conflict {
    /// Creates a conflict from the involved trains and their priorities.
    ///
    /// # Panics
    /// Never; an empty train list yields `Maintenance` as highest priority.
    pub fn new(
        kind: ConflictKind,
        section_id: impl Into<String>,
        trains: &[(&str, TrainPriority)],
        window: TimeWindow,
        detected_at_ms: i64,
    ) -> Self {
        let section_id = section_id.into();
        let mut train_ids: Vec<String> = trains.iter().map(|(id, _)| id.to_string()).collect();
        train_ids.sort();
        train_ids.dedup();

        let highest_priority = trains
            .iter()
            .map(|(_, p)| *p)
            .min()
            .unwrap_or(TrainPriority::Maintenance);

        let severity = train_ids.len() as u32 * 10
            + (7 - highest_priority.value() as u32) * 15
            + kind.severity_bonus();

        let id = format!("{}:{}:{}", kind.label(), section_id, train_ids.join("+"));

        Self {
            id,
            kind,
            section_id,
            train_ids,
            highest_priority,
            window,
            severity,
            detected_at_ms,
        }
    }

    /// Whether a train is involved.
    pub fn involves(&self, train_id: &str) -> bool {
        self.train_ids.iter().any(|t| t == train_id)
    }

    /// Number of involved trains.
    pub fn train_count(&self) -> usize {
        self.train_ids.len()
    }
}

/// Sorts conflicts by descending severity, then by id.
pub fn sort_by_severity(conflicts: &mut [Conflict]) {
    conflicts.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
}
