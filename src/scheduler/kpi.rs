//! Operational performance indicators.
//!
//! Computes punctuality, delay, throughput and occupancy figures from a
//! snapshot over a reporting period.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Punctuality | Fraction of scheduled trains at most 5 minutes late |
//! | Average Delay | Mean live delay of scheduled trains (minutes) |
//! | Maximum Delay | Largest live delay (minutes) |
//! | Throughput | Trains entering a section in the period, per hour |
//! | Utilization | Occupied time / (capacity × period), per section |
//!
//! # Reference
//! UIC Code 406 (2013), "Capacity"

use std::collections::{BTreeSet, HashMap};

use crate::error::{CoreError, CoreResult};
use crate::models::{RailwaySection, TimeWindow, Train};
use crate::store::Snapshot;

/// Largest delay still counted as on time (minutes).
pub const ON_TIME_THRESHOLD_MINUTES: i32 = 5;

const HOUR_MS: f64 = 3_600_000.0;

/// Performance indicators over one period.
#[derive(Debug, Clone)]
pub struct ScheduleKpi {
    /// Scheduled, active trains considered.
    pub trains_counted: usize,
    /// Fraction of counted trains on time (0.0..1.0).
    pub punctuality: f64,
    /// Mean live delay (minutes).
    pub avg_delay_minutes: f64,
    /// Largest live delay (minutes).
    pub max_delay_minutes: i32,
    /// Distinct trains entering a considered section per hour.
    pub throughput_per_hour: f64,
    /// Mean section utilization (0.0..1.0).
    pub avg_utilization: f64,
    /// Per-section utilization.
    pub utilization_by_section: HashMap<String, f64>,
}

impl ScheduleKpi {
    /// Network-wide indicators for `period`.
    pub fn calculate(snapshot: &Snapshot, period: TimeWindow) -> Self {
        let sections: Vec<&RailwaySection> = snapshot.sections().collect();
        Self::compute(snapshot, &sections, period)
    }

    /// Indicators restricted to one section.
    pub fn for_section(snapshot: &Snapshot, section_id: &str, period: TimeWindow) -> CoreResult<Self> {
        let section = snapshot
            .section(section_id)
            .ok_or_else(|| CoreError::section_not_found(section_id))?;
        Ok(Self::compute(snapshot, &[section], period))
    }

    fn compute(snapshot: &Snapshot, sections: &[&RailwaySection], period: TimeWindow) -> Self {
        let in_scope = |t: &Train| {
            t.status.is_active()
                && t.is_scheduled()
                && sections.iter().any(|s| t.routes_through(&s.id))
        };
        let trains: Vec<&Train> = snapshot.trains().filter(|t| in_scope(t)).collect();

        let delays: Vec<i32> = trains.iter().filter_map(|t| t.delay_minutes).collect();
        let on_time = delays
            .iter()
            .filter(|d| **d <= ON_TIME_THRESHOLD_MINUTES)
            .count();
        let punctuality = if delays.is_empty() {
            1.0
        } else {
            on_time as f64 / delays.len() as f64
        };
        let avg_delay_minutes = if delays.is_empty() {
            0.0
        } else {
            delays.iter().map(|d| *d as f64).sum::<f64>() / delays.len() as f64
        };
        let max_delay_minutes = delays.iter().copied().max().unwrap_or(0).max(0);

        let period_ms = period.duration_ms().max(1) as f64;
        let mut entering: BTreeSet<&str> = BTreeSet::new();
        let mut utilization_by_section = HashMap::new();

        for section in sections {
            let mut occupied_ms = 0i64;
            for train in &trains {
                let Some(window) = train.effective_window(&section.id) else {
                    continue;
                };
                if period.contains(window.start_ms) {
                    entering.insert(train.id.as_str());
                }
                let start = window.start_ms.max(period.start_ms);
                let end = window.end_ms.min(period.end_ms);
                occupied_ms += (end - start).max(0);
            }
            let available = section.capacity.max(1) as f64 * period_ms;
            let utilization = (occupied_ms as f64 / available).min(1.0);
            utilization_by_section.insert(section.id.clone(), utilization);
        }

        let avg_utilization = if utilization_by_section.is_empty() {
            0.0
        } else {
            utilization_by_section.values().sum::<f64>() / utilization_by_section.len() as f64
        };

        Self {
            trains_counted: trains.len(),
            punctuality,
            avg_delay_minutes,
            max_delay_minutes,
            throughput_per_hour: entering.len() as f64 / (period_ms / HOUR_MS),
            avg_utilization,
            utilization_by_section,
        }
    }

    /// Whether the period meets the given quality thresholds.
    pub fn meets_thresholds(&self, min_punctuality: f64, max_avg_delay_minutes: f64) -> bool {
        self.punctuality >= min_punctuality && self.avg_delay_minutes <= max_avg_delay_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TrainPriority, TrainStatus, MINUTE_MS};

    fn at(min: i64) -> i64 {
        min * MINUTE_MS
    }

    fn snapshot() -> Snapshot {
        Snapshot::from_parts(
            vec![
                Train::new("A", 1, TrainPriority::Express).with_slot("S1", 0, at(30)),
                Train::new("B", 2, TrainPriority::Passenger)
                    .with_slot("S1", at(30), at(60))
                    .with_delay(10),
                Train::new("C", 3, TrainPriority::Freight)
                    .with_slot("S2", at(0), at(15))
                    .with_delay(2),
                Train::new("X", 4, TrainPriority::Freight)
                    .with_slot("S2", at(0), at(60))
                    .with_status(TrainStatus::Cancelled),
            ],
            vec![RailwaySection::new("S1", 1), RailwaySection::new("S2", 2)],
            vec![],
            0,
        )
    }

    #[test]
    fn test_network_kpi() {
        let kpi = ScheduleKpi::calculate(&snapshot(), TimeWindow::new(0, at(60)));
        assert_eq!(kpi.trains_counted, 3);
        // B is 10 minutes late
        assert!((kpi.punctuality - 2.0 / 3.0).abs() < 1e-10);
        assert!((kpi.avg_delay_minutes - 4.0).abs() < 1e-10);
        assert_eq!(kpi.max_delay_minutes, 10);
        // A, B (entering at 40) and C
        assert!((kpi.throughput_per_hour - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_section_utilization() {
        let kpi = ScheduleKpi::for_section(&snapshot(), "S1", TimeWindow::new(0, at(60))).unwrap();
        assert_eq!(kpi.trains_counted, 2);
        // A 0..30, B 40..60 (delayed): 50 of 60 minutes
        assert!((kpi.utilization_by_section["S1"] - 50.0 / 60.0).abs() < 1e-10);

        let s2 = ScheduleKpi::for_section(&snapshot(), "S2", TimeWindow::new(0, at(60))).unwrap();
        // C 2..17 on a two-track section
        assert!((s2.avg_utilization - 15.0 / 120.0).abs() < 1e-10);
    }

    #[test]
    fn test_thresholds_and_unknown_section() {
        let kpi = ScheduleKpi::calculate(&snapshot(), TimeWindow::new(0, at(60)));
        assert!(kpi.meets_thresholds(0.5, 5.0));
        assert!(!kpi.meets_thresholds(0.9, 5.0));
        assert!(ScheduleKpi::for_section(&snapshot(), "S9", TimeWindow::new(0, at(60))).is_err());
    }
}
