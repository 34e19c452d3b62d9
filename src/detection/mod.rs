//! Conflict detection.
//!
//! Scans the live occupancy of each section and reports every headway,
//! capacity, precedence and availability conflict. Detection is a pure
//! function of a [`Snapshot`]: the same snapshot always yields the same
//! conflicts with the same ids.
//!
//! # Algorithm
//!
//! Per section, with n live intervals and k reported pairs:
//!
//! 1. **Headway**: sort by start; for each interval, binary-search the
//!    first successor entering after it leaves and walk successors while
//!    the gap stays below the headway. O(n log n + k).
//! 2. **Capacity**: sweep start/end events (ends first at equal times);
//!    every maximal stretch above capacity is one conflict listing all
//!    trains active during it. O(n log n).
//! 3. **Precedence**: among near successors, a follower that outranks its
//!    leader and would wait longer than the tolerance. O(n log n + k).
//! 4. **Availability**: a section whose status bars entry reports every
//!    active train routed through it; maintenance windows report the
//!    trains whose occupancy overlaps them.
//!
//! # Reference
//! Pachl (2018), "Railway Operation and Control", Ch. 5 (headway and
//! blocking time)

pub mod occupancy;

pub use occupancy::{section_intervals, train_interval, IntervalSource, OccupancyInterval};

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::DetectionConfig;
use crate::dispatching::SectionRules;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    sort_by_severity, Conflict, ConflictKind, RailwaySection, TimeWindow, TrainPriority,
};
use crate::store::Snapshot;

/// Section conflict detector.
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    config: DetectionConfig,
}

impl ConflictDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Effective rules of a section in `snapshot`.
    pub fn rules_for(&self, snapshot: &Snapshot, section: &RailwaySection) -> SectionRules {
        SectionRules::resolve(section, snapshot.constraints_for(&section.id), &self.config)
    }

    /// Conflicts across every section, most severe first.
    pub fn detect(&self, snapshot: &Snapshot) -> Vec<Conflict> {
        let mut all: Vec<Conflict> = snapshot
            .sections()
            .flat_map(|s| self.evaluate(snapshot, s))
            .collect();
        sort_by_severity(&mut all);
        all
    }

    /// Conflicts in one section, most severe first.
    pub fn detect_section(&self, snapshot: &Snapshot, section_id: &str) -> CoreResult<Vec<Conflict>> {
        let section = snapshot
            .section(section_id)
            .ok_or_else(|| CoreError::section_not_found(section_id))?;
        let mut conflicts = self.evaluate(snapshot, section);
        sort_by_severity(&mut conflicts);
        debug!(
            section = section_id,
            version = snapshot.version(),
            conflicts = conflicts.len(),
            "section evaluated"
        );
        Ok(conflicts)
    }

    /// Conflicts in one section that begin within `horizon_ms` of the
    /// snapshot time.
    pub fn detect_section_within(
        &self,
        snapshot: &Snapshot,
        section_id: &str,
        horizon_ms: i64,
    ) -> CoreResult<Vec<Conflict>> {
        let cutoff = snapshot.taken_at_ms() + horizon_ms;
        let mut conflicts = self.detect_section(snapshot, section_id)?;
        conflicts.retain(|c| c.window.start_ms < cutoff);
        Ok(conflicts)
    }

    /// Conflicts that revising `revised` introduces outside `section_id`.
    ///
    /// Every other section a revised train has a slot in is evaluated in
    /// both snapshots; a conflict counts when it involves a revised train
    /// and its id is absent from `before`.
    pub fn knock_on_conflicts(
        &self,
        before: &Snapshot,
        after: &Snapshot,
        section_id: &str,
        revised: &[&str],
    ) -> CoreResult<Vec<Conflict>> {
        let others: BTreeSet<&str> = revised
            .iter()
            .filter_map(|id| after.train(id))
            .flat_map(|t| t.timetable.iter().map(|slot| slot.section_id.as_str()))
            .filter(|s| *s != section_id && after.section(s).is_some())
            .collect();

        let mut introduced = Vec::new();
        for other in others {
            let existing: BTreeSet<String> = match before.section(other) {
                Some(_) => self
                    .detect_section(before, other)?
                    .into_iter()
                    .map(|c| c.id)
                    .collect(),
                None => BTreeSet::new(),
            };
            introduced.extend(
                self.detect_section(after, other)?
                    .into_iter()
                    .filter(|c| revised.iter().any(|id| c.involves(id)))
                    .filter(|c| !existing.contains(&c.id)),
            );
        }
        Ok(introduced)
    }

    fn evaluate(&self, snapshot: &Snapshot, section: &RailwaySection) -> Vec<Conflict> {
        let rules = self.rules_for(snapshot, section);
        let intervals = section_intervals(snapshot, &section.id, &self.config);
        let now = snapshot.taken_at_ms();
        let mut found = Found::new(&section.id, now);

        if rules.available {
            maintenance_conflicts(&rules, &intervals, &mut found);
        } else {
            self.status_conflict(snapshot, section, &intervals, &mut found);
        }

        let scheduled: Vec<&OccupancyInterval> =
            intervals.iter().filter(|i| i.is_scheduled()).collect();
        headway_conflicts(&rules, &scheduled, &mut found);
        precedence_conflicts(&rules, &scheduled, &mut found);
        capacity_conflicts(&rules, &intervals, &mut found);

        found.into_vec()
    }

    /// One conflict covering every active train due in an unavailable section.
    fn status_conflict(
        &self,
        snapshot: &Snapshot,
        section: &RailwaySection,
        intervals: &[OccupancyInterval],
        found: &mut Found,
    ) {
        let now = snapshot.taken_at_ms();
        let mut involved: Vec<(&str, TrainPriority)> = intervals
            .iter()
            .map(|i| (i.train_id.as_str(), i.priority))
            .collect();
        let mut window = intervals
            .iter()
            .map(|i| i.window)
            .reduce(|a, b| a.union(&b));

        // Routed trains with no slot here have not reached the section yet
        for train in snapshot.trains_in_section(&section.id) {
            if train.effective_window(&section.id).is_none()
                && !intervals.iter().any(|i| i.train_id == train.id)
            {
                involved.push((train.id.as_str(), train.priority));
                let pending = TimeWindow::new(now, now + self.config.unscheduled_dwell_ms());
                window = Some(window.map_or(pending, |w| w.union(&pending)));
            }
        }

        if let Some(window) = window {
            found.push(ConflictKind::SectionUnavailable, &involved, window);
        }
    }
}

/// Conflicts of one section keyed by id; repeated ids widen the window.
struct Found {
    section_id: String,
    detected_at_ms: i64,
    by_id: BTreeMap<String, Conflict>,
}

impl Found {
    fn new(section_id: &str, detected_at_ms: i64) -> Self {
        Self {
            section_id: section_id.to_string(),
            detected_at_ms,
            by_id: BTreeMap::new(),
        }
    }

    fn push(&mut self, kind: ConflictKind, trains: &[(&str, TrainPriority)], window: TimeWindow) {
        let conflict = Conflict::new(
            kind,
            self.section_id.clone(),
            trains,
            window,
            self.detected_at_ms,
        );
        self.by_id
            .entry(conflict.id.clone())
            .and_modify(|c| c.window = c.window.union(&window))
            .or_insert(conflict);
    }

    fn into_vec(self) -> Vec<Conflict> {
        self.by_id.into_values().collect()
    }
}

fn maintenance_conflicts(rules: &SectionRules, intervals: &[OccupancyInterval], found: &mut Found) {
    for closed in &rules.maintenance {
        let hit: Vec<&OccupancyInterval> = intervals
            .iter()
            .filter(|i| i.window.overlaps(closed))
            .collect();
        if hit.is_empty() {
            continue;
        }
        let start = hit.iter().map(|i| i.window.start_ms).min().unwrap_or(closed.start_ms);
        let end = hit.iter().map(|i| i.window.end_ms).max().unwrap_or(closed.end_ms);
        let window = TimeWindow::new(start.max(closed.start_ms), end.min(closed.end_ms));
        let trains: Vec<(&str, TrainPriority)> =
            hit.iter().map(|i| (i.train_id.as_str(), i.priority)).collect();
        found.push(ConflictKind::SectionUnavailable, &trains, window);
    }
}

/// Index of the first interval entering at or after `end_ms`.
fn first_after(starts: &[i64], end_ms: i64) -> usize {
    starts.partition_point(|s| *s < end_ms)
}

fn headway_conflicts(rules: &SectionRules, scheduled: &[&OccupancyInterval], found: &mut Found) {
    let h = rules.headway_ms;
    if h <= 0 {
        return;
    }
    let starts: Vec<i64> = scheduled.iter().map(|i| i.window.start_ms).collect();

    for (i, leader) in scheduled.iter().enumerate() {
        let end = leader.window.end_ms;
        let mut j = first_after(&starts, end).max(i + 1);
        while j < scheduled.len() && starts[j] < end + h {
            let follower = scheduled[j];
            found.push(
                ConflictKind::HeadwayViolation,
                &[
                    (leader.train_id.as_str(), leader.priority),
                    (follower.train_id.as_str(), follower.priority),
                ],
                leader.window.union(&follower.window),
            );
            j += 1;
        }
    }
}

fn precedence_conflicts(rules: &SectionRules, scheduled: &[&OccupancyInterval], found: &mut Found) {
    let h = rules.headway_ms.max(0);
    let starts: Vec<i64> = scheduled.iter().map(|i| i.window.start_ms).collect();

    for (i, leader) in scheduled.iter().enumerate() {
        let end = leader.window.end_ms;
        // Overlapping successors only block on single-track sections
        let mut j = if rules.capacity <= 1 {
            i + 1
        } else {
            first_after(&starts, end).max(i + 1)
        };
        while j < scheduled.len() && starts[j] < end + h {
            let follower = scheduled[j];
            j += 1;
            if follower.window.start_ms <= leader.window.start_ms
                || !follower.priority.outranks(leader.priority)
            {
                continue;
            }
            let wait = rules.forced_wait_ms(&leader.window, &follower.window);
            if wait > rules.precedence_tolerance_ms {
                found.push(
                    ConflictKind::PrecedenceViolation,
                    &[
                        (leader.train_id.as_str(), leader.priority),
                        (follower.train_id.as_str(), follower.priority),
                    ],
                    TimeWindow::new(follower.window.start_ms, follower.window.start_ms + wait),
                );
            }
        }
    }
}

fn capacity_conflicts(rules: &SectionRules, intervals: &[OccupancyInterval], found: &mut Found) {
    let capacity = rules.capacity as usize;
    // (time, 0 = end / 1 = start, index): ends sort first
    let mut events: Vec<(i64, u8, usize)> = Vec::with_capacity(intervals.len() * 2);
    for (idx, interval) in intervals.iter().enumerate() {
        if interval.window.end_ms > interval.window.start_ms {
            events.push((interval.window.start_ms, 1, idx));
            events.push((interval.window.end_ms, 0, idx));
        }
    }
    events.sort_unstable();

    let mut active: BTreeSet<usize> = BTreeSet::new();
    let mut episode: Option<(i64, BTreeSet<usize>)> = None;

    for (time, kind, idx) in events {
        if kind == 0 {
            active.remove(&idx);
            if active.len() <= capacity {
                if let Some((start, members)) = episode.take() {
                    emit_capacity(intervals, start, time, &members, found);
                }
            }
        } else {
            active.insert(idx);
            if active.len() > capacity {
                match episode.as_mut() {
                    Some((_, members)) => {
                        members.insert(idx);
                    }
                    None => episode = Some((time, active.clone())),
                }
            }
        }
    }
}

fn emit_capacity(
    intervals: &[OccupancyInterval],
    start: i64,
    end: i64,
    members: &BTreeSet<usize>,
    found: &mut Found,
) {
    let trains: Vec<(&str, TrainPriority)> = members
        .iter()
        .map(|&i| (intervals[i].train_id.as_str(), intervals[i].priority))
        .collect();
    found.push(
        ConflictKind::CapacityExceeded,
        &trains,
        TimeWindow::new(start, end),
    );
}
