//! Operating constraints.
//!
//! Defines the rules a committed schedule must satisfy: safety headway,
//! section capacity, train precedence, maintenance windows, speed limits
//! and minimum crossing times.
//!
//! Each rule is a typed variant. The untyped key/value form only exists
//! at the solver wire boundary (see `gateway::wire`).
//!
//! # Reference
//! Pachl (2018), "Railway Operation and Control", Ch. 3 (headway)

use serde::{Deserialize, Serialize};

use super::{TimeWindow, TrainPriority, MINUTE_MS};

/// Weights at or below this value are hard constraints.
pub const HARD_WEIGHT: u8 = 2;

/// Constraint category, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    SafetyDistance,
    PlatformCapacity,
    TrainPriority,
    MaintenanceWindow,
    SpeedLimit,
    CrossingTime,
}

/// A typed operating rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintRule {
    /// Minimum time between one train leaving and the next entering.
    SafetyDistance { min_headway_ms: i64 },

    /// Maximum simultaneous trains (tightens the section's own capacity).
    PlatformCapacity { capacity: u32 },

    /// Trains of class `higher` go ahead of trains of class `lower`.
    TrainPriority {
        higher: TrainPriority,
        lower: TrainPriority,
    },

    /// No train may occupy the section during [start_ms, end_ms).
    MaintenanceWindow { start_ms: i64, end_ms: i64 },

    /// No speed profile sample may exceed this speed.
    SpeedLimit { max_speed_kmh: f64 },

    /// Minimum time a train needs to cross the section.
    CrossingTime { min_crossing_ms: i64 },
}

impl ConstraintRule {
    /// Category of this rule.
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::SafetyDistance { .. } => ConstraintKind::SafetyDistance,
            Self::PlatformCapacity { .. } => ConstraintKind::PlatformCapacity,
            Self::TrainPriority { .. } => ConstraintKind::TrainPriority,
            Self::MaintenanceWindow { .. } => ConstraintKind::MaintenanceWindow,
            Self::SpeedLimit { .. } => ConstraintKind::SpeedLimit,
            Self::CrossingTime { .. } => ConstraintKind::CrossingTime,
        }
    }

    /// Default weight for a rule category.
    fn default_weight(&self) -> u8 {
        match self {
            Self::SafetyDistance { .. }
            | Self::PlatformCapacity { .. }
            | Self::MaintenanceWindow { .. } => 1,
            Self::SpeedLimit { .. } | Self::CrossingTime { .. } => 2,
            Self::TrainPriority { .. } => 4,
        }
    }
}

/// An operating constraint.
///
/// `section_id = None` applies network-wide. `weight` is a hint for the
/// solver: 1 = hardest, 10 = softest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Section the rule applies to (`None` = all sections).
    pub section_id: Option<String>,
    /// Priority weight (1 = hard ... 10 = soft).
    pub weight: u8,
    /// The rule itself.
    pub rule: ConstraintRule,
}

impl Constraint {
    /// Creates a network-wide constraint with the rule's default weight.
    pub fn new(rule: ConstraintRule) -> Self {
        Self {
            section_id: None,
            weight: rule.default_weight(),
            rule,
        }
    }

    /// Creates a safety headway constraint in minutes.
    pub fn safety_distance(minutes: i64) -> Self {
        Self::new(ConstraintRule::SafetyDistance {
            min_headway_ms: minutes * MINUTE_MS,
        })
    }

    /// Creates a capacity constraint.
    pub fn platform_capacity(capacity: u32) -> Self {
        Self::new(ConstraintRule::PlatformCapacity { capacity })
    }

    /// Creates a precedence constraint between two priority classes.
    pub fn train_priority(higher: TrainPriority, lower: TrainPriority) -> Self {
        Self::new(ConstraintRule::TrainPriority { higher, lower })
    }

    /// Creates a maintenance window.
    pub fn maintenance_window(start_ms: i64, end_ms: i64) -> Self {
        Self::new(ConstraintRule::MaintenanceWindow { start_ms, end_ms })
    }

    /// Creates a speed limit.
    pub fn speed_limit(max_speed_kmh: f64) -> Self {
        Self::new(ConstraintRule::SpeedLimit { max_speed_kmh })
    }

    /// Creates a minimum crossing time in minutes.
    pub fn crossing_time(minutes: i64) -> Self {
        Self::new(ConstraintRule::CrossingTime {
            min_crossing_ms: minutes * MINUTE_MS,
        })
    }

    /// Scopes the constraint to one section.
    pub fn for_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    /// Overrides the weight (clamped to 1..=10).
    pub fn with_weight(mut self, weight: u8) -> Self {
        self.weight = weight.clamp(1, 10);
        self
    }

    /// Category of the rule.
    pub fn kind(&self) -> ConstraintKind {
        self.rule.kind()
    }

    /// Whether the heuristic must honor this constraint.
    pub fn is_hard(&self) -> bool {
        self.weight <= HARD_WEIGHT
    }

    /// Whether the constraint applies to `section_id`.
    pub fn applies_to(&self, section_id: &str) -> bool {
        match &self.section_id {
            Some(id) => id == section_id,
            None => true,
        }
    }

    /// Maintenance window covered by this constraint, if any.
    pub fn maintenance(&self) -> Option<TimeWindow> {
        match self.rule {
            ConstraintRule::MaintenanceWindow { start_ms, end_ms } => {
                Some(TimeWindow::new(start_ms, end_ms))
            }
            _ => None,
        }
    }
}
