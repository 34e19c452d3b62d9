//! Train model.
//!
//! A train is a movement through an ordered route of sections. It carries
//! a declared priority, a timetable of planned section slots, and the live
//! state reported by ingestion (position, speed, delay, status).
//!
//! # Time Representation
//! Slot times are planned times in milliseconds since the Unix epoch.
//! The effective occupancy of a slot is the planned window shifted by the
//! live delay.
//!
//! # Reference
//! Hansen & Pachl (2014), "Railway Timetabling & Operations", Ch. 2

use serde::{Deserialize, Serialize};

use super::{TimeWindow, MINUTE_MS};

/// Declared train priority.
///
/// Lower value = higher precedence. The derived `Ord` follows the numeric
/// value, so `Emergency < Freight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrainPriority {
    Emergency = 1,
    Mail = 2,
    Express = 3,
    Passenger = 4,
    Freight = 5,
    Maintenance = 6,
}

impl TrainPriority {
    /// Numeric value (1 = highest precedence).
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Parses a numeric priority value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Emergency),
            2 => Some(Self::Mail),
            3 => Some(Self::Express),
            4 => Some(Self::Passenger),
            5 => Some(Self::Freight),
            6 => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// Whether `self` takes precedence over `other`.
    pub fn outranks(&self, other: TrainPriority) -> bool {
        self.value() < other.value()
    }
}

/// Train lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainStatus {
    Scheduled,
    Running,
    Delayed,
    AtStation,
    Terminated,
    Cancelled,
}

impl TrainStatus {
    /// Terminated and Cancelled accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Cancelled)
    }

    /// Whether the train takes part in occupancy evaluation.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses in which `current_section` must lie on the route.
    pub fn requires_position(&self) -> bool {
        matches!(self, Self::Running | Self::Delayed | Self::AtStation)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Re-asserting the current status is always allowed for live states.
    pub fn can_transition_to(&self, next: TrainStatus) -> bool {
        use TrainStatus::*;
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        match (self, next) {
            (_, Terminated) | (_, Cancelled) => true,
            (Scheduled, Running) => true,
            (Running, Delayed) | (Running, AtStation) => true,
            (Delayed, Running) | (Delayed, AtStation) => true,
            (AtStation, Running) | (AtStation, Delayed) => true,
            _ => false,
        }
    }
}

/// A planned passage through one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSlot {
    /// Section the slot belongs to.
    pub section_id: String,
    /// Planned entry time (ms).
    pub entry_ms: i64,
    /// Planned exit time (ms).
    pub exit_ms: i64,
    /// Assigned platform, if the section ends at a station.
    pub platform: Option<String>,
}

impl SectionSlot {
    /// Creates a slot without platform assignment.
    pub fn new(section_id: impl Into<String>, entry_ms: i64, exit_ms: i64) -> Self {
        Self {
            section_id: section_id.into(),
            entry_ms,
            exit_ms,
            platform: None,
        }
    }

    /// Planned window (without delay).
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.entry_ms, self.exit_ms)
    }
}

/// A train tracked by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    /// Stable identifier.
    pub id: String,
    /// Human-facing train number.
    pub train_number: u32,
    /// Human-readable name.
    pub name: String,
    /// Declared priority.
    pub priority: TrainPriority,
    /// Ordered section ids the train runs through.
    pub route: Vec<String>,
    /// Planned section slots.
    pub timetable: Vec<SectionSlot>,
    /// Section the train currently occupies.
    pub current_section: Option<String>,
    /// Position along the current section (km from its start).
    pub position_km: f64,
    /// Current speed (km/h).
    pub speed_kmh: f64,
    /// Live delay in minutes (positive = behind schedule).
    /// `None` = no declared schedule.
    pub delay_minutes: Option<i32>,
    /// Lifecycle status.
    pub status: TrainStatus,
    /// Last update time (ms).
    pub updated_at_ms: i64,
    /// Time the train reached a terminal status (ms).
    pub retired_at_ms: Option<i64>,
}

impl Train {
    /// Creates a scheduled train with an empty route.
    pub fn new(id: impl Into<String>, train_number: u32, priority: TrainPriority) -> Self {
        Self {
            id: id.into(),
            train_number,
            name: String::new(),
            priority,
            route: Vec::new(),
            timetable: Vec::new(),
            current_section: None,
            position_km: 0.0,
            speed_kmh: 0.0,
            delay_minutes: Some(0),
            status: TrainStatus::Scheduled,
            updated_at_ms: 0,
            retired_at_ms: None,
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the route.
    pub fn with_route(mut self, route: Vec<String>) -> Self {
        self.route = route;
        self
    }

    /// Adds a planned slot. The section is appended to the route if missing.
    pub fn with_slot(mut self, section_id: impl Into<String>, entry_ms: i64, exit_ms: i64) -> Self {
        let slot = SectionSlot::new(section_id, entry_ms, exit_ms);
        if !self.route.contains(&slot.section_id) {
            self.route.push(slot.section_id.clone());
        }
        self.timetable.push(slot);
        self
    }

    /// Sets the live delay.
    pub fn with_delay(mut self, minutes: i32) -> Self {
        self.delay_minutes = Some(minutes);
        self
    }

    /// Marks the train as having no declared schedule.
    pub fn unscheduled(mut self) -> Self {
        self.delay_minutes = None;
        self.timetable.clear();
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: TrainStatus) -> Self {
        self.status = status;
        self
    }

    /// Places the train in a section. The section is appended to the route if missing.
    pub fn in_section(mut self, section_id: impl Into<String>) -> Self {
        let section_id = section_id.into();
        if !self.route.contains(&section_id) {
            self.route.push(section_id.clone());
        }
        self.current_section = Some(section_id);
        self
    }

    /// Whether the train has a declared schedule.
    pub fn is_scheduled(&self) -> bool {
        self.delay_minutes.is_some()
    }

    /// Whether the train runs behind schedule.
    pub fn is_delayed(&self) -> bool {
        self.delay_minutes.unwrap_or(0) > 0
    }

    /// Live delay in milliseconds (0 when unscheduled).
    pub fn delay_ms(&self) -> i64 {
        self.delay_minutes.unwrap_or(0) as i64 * MINUTE_MS
    }

    /// Whether the route passes through `section_id`.
    pub fn routes_through(&self, section_id: &str) -> bool {
        self.route.iter().any(|s| s == section_id)
    }

    /// Planned slot for a section.
    pub fn slot_for(&self, section_id: &str) -> Option<&SectionSlot> {
        self.timetable.iter().find(|s| s.section_id == section_id)
    }

    /// Effective (delay-adjusted) occupancy window for a section.
    ///
    /// Returns `None` for unscheduled trains or sections without a slot.
    pub fn effective_window(&self, section_id: &str) -> Option<TimeWindow> {
        if !self.is_scheduled() {
            return None;
        }
        self.slot_for(section_id)
            .map(|slot| slot.window().shifted(self.delay_ms()))
    }

    /// Earliest effective entry time across the timetable.
    ///
    /// `None` for unscheduled trains; used as the second precedence key.
    pub fn earliest_scheduled_ms(&self) -> Option<i64> {
        if !self.is_scheduled() {
            return None;
        }
        let delay = self.delay_ms();
        self.timetable.iter().map(|s| s.entry_ms + delay).min()
    }

    /// Checks the route/position invariant.
    ///
    /// While Running, Delayed or AtStation, `current_section` must be set
    /// and be an element of the route.
    pub fn position_is_consistent(&self) -> bool {
        if !self.status.requires_position() {
            return true;
        }
        match &self.current_section {
            Some(section) => self.routes_through(section),
            None => false,
        }
    }
}

/// Partial update reported by ingestion.
///
/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainPatch {
    pub position_km: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub delay_minutes: Option<i32>,
    pub status: Option<TrainStatus>,
    pub current_section: Option<String>,
}

impl TrainPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets position and speed.
    pub fn with_position(mut self, position_km: f64, speed_kmh: f64) -> Self {
        self.position_km = Some(position_km);
        self.speed_kmh = Some(speed_kmh);
        self
    }

    /// Sets the delay.
    pub fn with_delay(mut self, minutes: i32) -> Self {
        self.delay_minutes = Some(minutes);
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: TrainStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the current section.
    pub fn with_section(mut self, section_id: impl Into<String>) -> Self {
        self.current_section = Some(section_id.into());
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TrainPriority::Emergency < TrainPriority::Mail);
        assert!(TrainPriority::Express < TrainPriority::Freight);
        assert!(TrainPriority::Express.outranks(TrainPriority::Freight));
        assert!(!TrainPriority::Freight.outranks(TrainPriority::Freight));
        assert_eq!(TrainPriority::Express.value(), 3);
        assert_eq!(TrainPriority::from_value(5), Some(TrainPriority::Freight));
        assert_eq!(TrainPriority::from_value(9), None);
    }

    #[test]
    fn test_status_transitions() {
        use TrainStatus::*;
        assert!(Scheduled.can_transition_to(Running));
        assert!(!Scheduled.can_transition_to(AtStation));
        assert!(Running.can_transition_to(Delayed));
        assert!(Delayed.can_transition_to(AtStation));
        assert!(AtStation.can_transition_to(Terminated));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_effective_window_applies_delay() {
        let train = Train::new("T1", 12001, TrainPriority::Express)
            .with_slot("SEC01", 0, 10 * MINUTE_MS)
            .with_delay(3);
        let w = train.effective_window("SEC01").unwrap();
        assert_eq!(w.start_ms, 3 * MINUTE_MS);
        assert_eq!(w.end_ms, 13 * MINUTE_MS);
        assert!(train.effective_window("SEC02").is_none());
        assert_eq!(train.route, vec!["SEC01".to_string()]);
    }

    #[test]
    fn test_unscheduled_train_has_no_window() {
        let train = Train::new("T2", 1, TrainPriority::Freight)
            .with_slot("SEC01", 0, 1000)
            .unscheduled()
            .in_section("SEC01");
        assert!(!train.is_scheduled());
        assert!(train.effective_window("SEC01").is_none());
        assert!(train.earliest_scheduled_ms().is_none());
        assert_eq!(train.current_section.as_deref(), Some("SEC01"));
    }

    #[test]
    fn test_earliest_scheduled() {
        let train = Train::new("T3", 3, TrainPriority::Mail)
            .with_slot("A", 5000, 6000)
            .with_slot("B", 1000, 2000)
            .with_delay(1);
        assert_eq!(train.earliest_scheduled_ms(), Some(1000 + MINUTE_MS));
    }

    #[test]
    fn test_position_invariant() {
        let train = Train::new("T4", 4, TrainPriority::Passenger)
            .with_route(vec!["A".into(), "B".into()])
            .with_status(TrainStatus::Running);
        assert!(!train.position_is_consistent());

        let mut placed = train.clone();
        placed.current_section = Some("B".into());
        assert!(placed.position_is_consistent());

        placed.current_section = Some("Z".into());
        assert!(!placed.position_is_consistent());

        let scheduled = Train::new("T5", 5, TrainPriority::Passenger);
        assert!(scheduled.position_is_consistent());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(TrainPatch::new().is_empty());
        assert!(!TrainPatch::new().with_delay(2).is_empty());
    }
}
