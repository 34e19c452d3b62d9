//! Safety and capacity rule evaluation for one section.
//!
//! [`SectionRules`] folds the section's own limits and every applicable
//! constraint into effective values (headway, capacity, maintenance
//! windows, speed and crossing limits), then evaluates any
//! [`ConstraintRule`] against a [`CandidateSchedule`].
//!
//! # Precedence
//! Section-scoped SafetyDistance overrides network-wide SafetyDistance,
//! which overrides the configured default. Capacity is the minimum of the
//! section capacity and every applicable PlatformCapacity.
//!
//! # Complexity
//! Headway and capacity checks sort the intervals once and then sweep:
//! O(n log n) per section.

use crate::config::DetectionConfig;
use crate::models::{
    Constraint, ConstraintRule, RailwaySection, SpeedProfilePoint, TimeWindow, TrainPriority,
};

/// How an entry takes part in evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    /// Revised by the current pass; all rules apply.
    Movable,
    /// Scheduled and left as is; per-train limits are not re-checked.
    Fixed,
    /// In the section without a slot for it; counts for capacity only.
    Present,
}

/// One train's occupancy in a candidate schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntry {
    pub train_id: String,
    pub priority: TrainPriority,
    pub window: TimeWindow,
    pub speed_profile: Vec<SpeedProfilePoint>,
    pub role: EntryRole,
}

impl CandidateEntry {
    pub fn new(
        train_id: impl Into<String>,
        priority: TrainPriority,
        window: TimeWindow,
        role: EntryRole,
    ) -> Self {
        Self {
            train_id: train_id.into(),
            priority,
            window,
            speed_profile: Vec::new(),
            role,
        }
    }

    pub fn with_profile(mut self, profile: Vec<SpeedProfilePoint>) -> Self {
        self.speed_profile = profile;
        self
    }

    fn is_scheduled(&self) -> bool {
        self.role != EntryRole::Present
    }
}

/// A proposed occupancy of one section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSchedule {
    pub section_id: String,
    pub entries: Vec<CandidateEntry>,
}

impl CandidateSchedule {
    pub fn new(section_id: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: CandidateEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Entries taking part in headway and precedence, sorted by start.
    fn scheduled_by_start(&self) -> Vec<&CandidateEntry> {
        let mut entries: Vec<&CandidateEntry> =
            self.entries.iter().filter(|e| e.is_scheduled()).collect();
        entries.sort_by(|a, b| {
            a.window
                .start_ms
                .cmp(&b.window.start_ms)
                .then_with(|| a.train_id.cmp(&b.train_id))
        });
        entries
    }
}

/// Maximum number of simultaneously open windows.
///
/// Ends are processed before starts at equal times, so back-to-back
/// windows do not overlap.
pub fn max_concurrency<'a>(windows: impl IntoIterator<Item = &'a TimeWindow>) -> usize {
    let mut events: Vec<(i64, i32)> = Vec::new();
    for w in windows {
        if w.end_ms > w.start_ms {
            events.push((w.start_ms, 1));
            events.push((w.end_ms, -1));
        }
    }
    events.sort_unstable();

    let mut open = 0i32;
    let mut peak = 0i32;
    for (_, delta) in events {
        open += delta;
        peak = peak.max(open);
    }
    peak as usize
}

/// Wait imposed on `follower` by `leader` (ms), or 0 if none.
///
/// The follower must wait when it enters less than one headway after the
/// leader leaves, or while the leader is still inside a single-track
/// section.
pub fn forced_wait_ms(
    leader: &TimeWindow,
    follower: &TimeWindow,
    headway_ms: i64,
    capacity: u32,
) -> i64 {
    if follower.start_ms < leader.start_ms {
        return 0;
    }
    let gap = follower.start_ms - leader.end_ms;
    let blocked = if gap >= 0 {
        gap < headway_ms
    } else {
        capacity <= 1
    };
    if !blocked {
        return 0;
    }
    leader.end_ms + headway_ms - follower.start_ms
}

/// Effective operating rules of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRules {
    pub section_id: String,
    /// Whether the section status admits trains.
    pub available: bool,
    /// Effective capacity.
    pub capacity: u32,
    /// Effective headway (ms).
    pub headway_ms: i64,
    /// Wait a higher-priority train may absorb (ms).
    pub precedence_tolerance_ms: i64,
    /// Maintenance windows in force.
    pub maintenance: Vec<TimeWindow>,
    /// Effective speed ceiling (km/h).
    pub max_speed_kmh: f64,
    /// Section length (km).
    pub length_km: f64,
    /// Precedence pairs (higher, lower).
    pub priority_rules: Vec<(TrainPriority, TrainPriority)>,
    hard: Vec<ConstraintRule>,
}

impl SectionRules {
    /// Resolves the effective rules for a section.
    pub fn resolve<'a>(
        section: &RailwaySection,
        constraints: impl IntoIterator<Item = &'a Constraint>,
        detection: &DetectionConfig,
    ) -> Self {
        let mut scoped_headway: Option<i64> = None;
        let mut global_headway: Option<i64> = None;
        let mut capacity = section.capacity;
        let mut maintenance = Vec::new();
        let mut max_speed_kmh = section.max_speed_kmh;
        let mut priority_rules = Vec::new();
        let mut extra_hard = Vec::new();

        for c in constraints {
            if !c.applies_to(&section.id) {
                continue;
            }
            match &c.rule {
                ConstraintRule::SafetyDistance { min_headway_ms } => {
                    let slot = if c.section_id.is_some() {
                        &mut scoped_headway
                    } else {
                        &mut global_headway
                    };
                    *slot = Some(slot.map_or(*min_headway_ms, |h| h.max(*min_headway_ms)));
                }
                ConstraintRule::PlatformCapacity { capacity: cap } => {
                    capacity = capacity.min(*cap);
                }
                ConstraintRule::MaintenanceWindow { start_ms, end_ms } => {
                    maintenance.push(TimeWindow::new(*start_ms, *end_ms));
                }
                ConstraintRule::SpeedLimit { max_speed_kmh: limit } => {
                    max_speed_kmh = max_speed_kmh.min(*limit);
                    if c.is_hard() {
                        extra_hard.push(c.rule.clone());
                    }
                }
                ConstraintRule::CrossingTime { .. } => {
                    if c.is_hard() {
                        extra_hard.push(c.rule.clone());
                    }
                }
                ConstraintRule::TrainPriority { higher, lower } => {
                    priority_rules.push((*higher, *lower));
                    if c.is_hard() {
                        extra_hard.push(c.rule.clone());
                    }
                }
            }
        }
        maintenance.sort_by_key(|w| w.start_ms);

        let headway_ms = scoped_headway
            .or(global_headway)
            .unwrap_or_else(|| detection.default_headway_ms());

        let mut hard = vec![
            ConstraintRule::SafetyDistance {
                min_headway_ms: headway_ms,
            },
            ConstraintRule::PlatformCapacity { capacity },
        ];
        hard.extend(maintenance.iter().map(|w| ConstraintRule::MaintenanceWindow {
            start_ms: w.start_ms,
            end_ms: w.end_ms,
        }));
        hard.extend(extra_hard);

        Self {
            section_id: section.id.clone(),
            available: section.is_available(),
            capacity,
            headway_ms,
            precedence_tolerance_ms: detection.precedence_tolerance_ms(),
            maintenance,
            max_speed_kmh,
            length_km: section.length_km,
            priority_rules,
            hard,
        }
    }

    /// Rules a committed schedule must never break.
    pub fn hard_rules(&self) -> &[ConstraintRule] {
        &self.hard
    }

    /// First maintenance window overlapping `window`.
    pub fn maintenance_overlap(&self, window: &TimeWindow) -> Option<&TimeWindow> {
        self.maintenance.iter().find(|m| m.overlaps(window))
    }

    /// Wait `follower` would absorb behind `leader` under this section's
    /// headway and capacity.
    pub fn forced_wait_ms(&self, leader: &TimeWindow, follower: &TimeWindow) -> i64 {
        forced_wait_ms(leader, follower, self.headway_ms, self.capacity)
    }

    /// Whether `candidate` breaks `rule`.
    pub fn violates(&self, rule: &ConstraintRule, candidate: &CandidateSchedule) -> bool {
        match rule {
            ConstraintRule::SafetyDistance { min_headway_ms } => {
                headway_breach(candidate, *min_headway_ms)
            }
            ConstraintRule::PlatformCapacity { capacity } => {
                max_concurrency(candidate.entries.iter().map(|e| &e.window)) > *capacity as usize
            }
            ConstraintRule::TrainPriority { higher, lower } => {
                let entries = candidate.scheduled_by_start();
                entries.iter().enumerate().any(|(i, leader)| {
                    leader.priority == *lower
                        && entries[i + 1..].iter().any(|follower| {
                            follower.priority == *higher
                                && follower.window.start_ms > leader.window.start_ms
                                && self.forced_wait_ms(&leader.window, &follower.window)
                                    > self.precedence_tolerance_ms
                        })
                })
            }
            ConstraintRule::MaintenanceWindow { start_ms, end_ms } => {
                let closed = TimeWindow::new(*start_ms, *end_ms);
                candidate.entries.iter().any(|e| e.window.overlaps(&closed))
            }
            ConstraintRule::SpeedLimit { max_speed_kmh } => candidate
                .entries
                .iter()
                .filter(|e| e.role == EntryRole::Movable)
                .flat_map(|e| e.speed_profile.iter())
                .any(|p| p.speed_kmh > *max_speed_kmh + 1e-9),
            ConstraintRule::CrossingTime { min_crossing_ms } => candidate
                .entries
                .iter()
                .filter(|e| e.role == EntryRole::Movable)
                .any(|e| e.window.duration_ms() < *min_crossing_ms),
        }
    }

    /// First hard rule `candidate` breaks.
    pub fn first_hard_violation(&self, candidate: &CandidateSchedule) -> Option<&ConstraintRule> {
        self.hard.iter().find(|r| self.violates(r, candidate))
    }
}

/// Whether two successive non-overlapping windows are closer than `headway_ms`.
fn headway_breach(candidate: &CandidateSchedule, headway_ms: i64) -> bool {
    if headway_ms <= 0 {
        return false;
    }
    let entries = candidate.scheduled_by_start();
    let starts: Vec<i64> = entries.iter().map(|e| e.window.start_ms).collect();

    entries.iter().enumerate().any(|(i, e)| {
        // First window starting at or after this one ends
        let mut j = starts.partition_point(|s| *s < e.window.end_ms);
        if j == i {
            j += 1;
        }
        j < starts.len() && starts[j] - e.window.end_ms < headway_ms
    })
}
