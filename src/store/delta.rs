//! Change messages pushed to subscribers.
//!
//! Deltas carry only what changed plus the store version of the commit,
//! so a subscriber can discard anything older than what it has seen.

use serde::{Deserialize, Serialize};

use crate::models::{FallbackReason, Provenance, RailwaySection, SectionStatus, Train, TrainStatus};

/// Changed fields of one train.
///
/// `None` fields are unchanged. `removed` marks the train leaving the
/// active set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainDelta {
    pub version: u64,
    pub train_id: String,
    /// Section the train is in after the commit (for interest routing).
    pub section_id: Option<String>,
    pub position_km: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub delay_minutes: Option<i32>,
    pub status: Option<TrainStatus>,
    pub current_section_changed: bool,
    pub schedule_changed: bool,
    pub removed: bool,
    pub timestamp_ms: i64,
}

impl TrainDelta {
    /// Computes the minimal delta between two states of a train.
    ///
    /// Returns `None` when nothing observable changed.
    pub fn diff(
        before: Option<&Train>,
        after: Option<&Train>,
        version: u64,
        timestamp_ms: i64,
    ) -> Option<Self> {
        let (train_id, section_id) = match (before, after) {
            (_, Some(a)) => (a.id.clone(), a.current_section.clone()),
            (Some(b), None) => (b.id.clone(), b.current_section.clone()),
            (None, None) => return None,
        };

        let mut delta = Self {
            version,
            train_id,
            section_id,
            position_km: None,
            speed_kmh: None,
            delay_minutes: None,
            status: None,
            current_section_changed: false,
            schedule_changed: false,
            removed: false,
            timestamp_ms,
        };

        match (before, after) {
            (Some(_), None) => {
                delta.removed = true;
            }
            (None, Some(a)) => {
                delta.position_km = Some(a.position_km);
                delta.speed_kmh = Some(a.speed_kmh);
                delta.delay_minutes = a.delay_minutes;
                delta.status = Some(a.status);
                delta.current_section_changed = a.current_section.is_some();
                delta.schedule_changed = true;
            }
            (Some(b), Some(a)) => {
                if a.position_km != b.position_km {
                    delta.position_km = Some(a.position_km);
                }
                if a.speed_kmh != b.speed_kmh {
                    delta.speed_kmh = Some(a.speed_kmh);
                }
                if a.delay_minutes != b.delay_minutes {
                    delta.delay_minutes = a.delay_minutes;
                }
                if a.status != b.status {
                    delta.status = Some(a.status);
                }
                delta.current_section_changed = a.current_section != b.current_section;
                delta.schedule_changed = a.timetable != b.timetable || a.route != b.route;
                if !delta.has_changes() {
                    return None;
                }
            }
            (None, None) => return None,
        }
        Some(delta)
    }

    /// Whether any field changed.
    pub fn has_changes(&self) -> bool {
        self.removed
            || self.position_km.is_some()
            || self.speed_kmh.is_some()
            || self.delay_minutes.is_some()
            || self.status.is_some()
            || self.current_section_changed
            || self.schedule_changed
    }
}

/// Occupancy and conflict state of one section after a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDelta {
    pub version: u64,
    pub section_id: String,
    pub occupancy: usize,
    pub occupants: Vec<String>,
    pub status: SectionStatus,
    pub active_conflict_ids: Vec<String>,
    pub timestamp_ms: i64,
}

impl SectionDelta {
    pub fn from_section(
        section: &RailwaySection,
        conflict_ids: &[String],
        version: u64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            version,
            section_id: section.id.clone(),
            occupancy: section.occupancy(),
            occupants: section.occupants.iter().cloned().collect(),
            status: section.status,
            active_conflict_ids: conflict_ids.to_vec(),
            timestamp_ms,
        }
    }
}

/// A committed resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvent {
    pub version: u64,
    pub section_id: String,
    pub provenance: Provenance,
    pub fallback_reason: Option<FallbackReason>,
    pub conflicts_resolved: usize,
    pub trains_rescheduled: Vec<String>,
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrainPriority;

    fn train() -> Train {
        Train::new("T1", 100, TrainPriority::Express).with_slot("A", 0, 1000)
    }

    #[test]
    fn test_diff_reports_only_changes() {
        let before = train();
        let mut after = before.clone();
        after.speed_kmh = 80.0;
        let d = TrainDelta::diff(Some(&before), Some(&after), 3, 10).unwrap();
        assert_eq!(d.speed_kmh, Some(80.0));
        assert!(d.position_km.is_none());
        assert!(d.status.is_none());
        assert!(!d.schedule_changed);
        assert_eq!(d.version, 3);
    }

    #[test]
    fn test_diff_unchanged_is_none() {
        let t = train();
        assert!(TrainDelta::diff(Some(&t), Some(&t), 1, 0).is_none());
        assert!(TrainDelta::diff(None, None, 1, 0).is_none());
    }

    #[test]
    fn test_diff_insert_and_remove() {
        let t = train().in_section("A");
        let inserted = TrainDelta::diff(None, Some(&t), 1, 0).unwrap();
        assert!(inserted.schedule_changed);
        assert!(inserted.current_section_changed);
        assert_eq!(inserted.section_id.as_deref(), Some("A"));

        let removed = TrainDelta::diff(Some(&t), None, 2, 0).unwrap();
        assert!(removed.removed);
        assert_eq!(removed.train_id, "T1");
    }
}
