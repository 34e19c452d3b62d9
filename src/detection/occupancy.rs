//! Occupancy intervals.
//!
//! Turns a snapshot into the per-section interval sets the detector and
//! the fallback heuristic reason about.

use crate::config::DetectionConfig;
use crate::models::{TimeWindow, Train, TrainPriority};
use crate::store::Snapshot;

/// Where an interval comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalSource {
    /// Delay-adjusted timetable slot.
    Scheduled,
    /// Train standing in the section with no usable slot for it.
    Present,
}

/// One train's occupancy of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyInterval {
    pub train_id: String,
    pub priority: TrainPriority,
    pub window: TimeWindow,
    pub source: IntervalSource,
}

impl OccupancyInterval {
    pub fn is_scheduled(&self) -> bool {
        self.source == IntervalSource::Scheduled
    }
}

/// Live occupancy of `train` in `section_id`, if any.
///
/// A delay-adjusted slot that has not ended yet wins. A train standing in
/// the section without such a slot is assumed present for the configured
/// dwell from `now_ms`.
pub fn train_interval(
    train: &Train,
    section_id: &str,
    now_ms: i64,
    config: &DetectionConfig,
) -> Option<OccupancyInterval> {
    if !train.status.is_active() {
        return None;
    }
    if let Some(window) = train.effective_window(section_id) {
        if window.end_ms > now_ms {
            return Some(OccupancyInterval {
                train_id: train.id.clone(),
                priority: train.priority,
                window,
                source: IntervalSource::Scheduled,
            });
        }
    }
    if train.current_section.as_deref() == Some(section_id) {
        return Some(OccupancyInterval {
            train_id: train.id.clone(),
            priority: train.priority,
            window: TimeWindow::new(now_ms, now_ms + config.unscheduled_dwell_ms()),
            source: IntervalSource::Present,
        });
    }
    None
}

/// Live intervals of every train in a section, sorted by start then id.
pub fn section_intervals(
    snapshot: &Snapshot,
    section_id: &str,
    config: &DetectionConfig,
) -> Vec<OccupancyInterval> {
    let now = snapshot.taken_at_ms();
    let mut intervals: Vec<OccupancyInterval> = snapshot
        .trains_in_section(section_id)
        .filter_map(|t| train_interval(t, section_id, now, config))
        .collect();
    intervals.sort_by(|a, b| {
        a.window
            .start_ms
            .cmp(&b.window.start_ms)
            .then_with(|| a.train_id.cmp(&b.train_id))
    });
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RailwaySection, TrainStatus, MINUTE_MS};

    #[test]
    fn test_intervals_skip_past_and_retired() {
        let now = 30 * MINUTE_MS;
        let snap = Snapshot::from_parts(
            vec![
                Train::new("PAST", 1, TrainPriority::Passenger).with_slot("S", 0, 10 * MINUTE_MS),
                Train::new("LIVE", 2, TrainPriority::Passenger)
                    .with_slot("S", 25 * MINUTE_MS, 35 * MINUTE_MS),
                Train::new("GONE", 3, TrainPriority::Passenger)
                    .with_slot("S", 40 * MINUTE_MS, 50 * MINUTE_MS)
                    .with_status(TrainStatus::Terminated),
            ],
            vec![RailwaySection::new("S", 1)],
            vec![],
            now,
        );
        let intervals = section_intervals(&snap, "S", &DetectionConfig::default());
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].train_id, "LIVE");
        assert!(intervals[0].is_scheduled());
    }

    #[test]
    fn test_unscheduled_occupant_is_present() {
        let now = 5 * MINUTE_MS;
        let train = Train::new("U", 1, TrainPriority::Freight)
            .unscheduled()
            .with_status(TrainStatus::Running)
            .in_section("S");
        let config = DetectionConfig::default();
        let interval = train_interval(&train, "S", now, &config).unwrap();
        assert_eq!(interval.source, IntervalSource::Present);
        assert_eq!(interval.window, TimeWindow::new(now, now + 10 * MINUTE_MS));

        // Routed through but not there yet: nothing to evaluate
        let pending = Train::new("P", 2, TrainPriority::Freight)
            .unscheduled()
            .with_route(vec!["S".into()]);
        assert!(train_interval(&pending, "S", now, &config).is_none());
    }

    #[test]
    fn test_overrun_slot_becomes_present() {
        let now = 20 * MINUTE_MS;
        let train = Train::new("LATE", 1, TrainPriority::Express)
            .with_slot("S", 0, 10 * MINUTE_MS)
            .with_status(TrainStatus::Running)
            .in_section("S");
        let interval = train_interval(&train, "S", now, &DetectionConfig::default()).unwrap();
        assert_eq!(interval.source, IntervalSource::Present);
        assert_eq!(interval.window.start_ms, now);
    }
}
