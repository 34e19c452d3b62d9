//! Optimization request/response contract.
//!
//! These types are the orchestrator's view of a solver exchange. The wire
//! encoding used by the remote solver lives in `gateway::wire`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Conflict, Constraint, RailwaySection, ScheduleUpdate, SectionStatus, Train};

/// Optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Objective {
    MinimizeDelay,
    MaximizeThroughput,
    MinimizeEnergy,
    #[default]
    BalancedOptimal,
}

impl Objective {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinimizeDelay => "minimize_delay",
            Self::MaximizeThroughput => "maximize_throughput",
            Self::MinimizeEnergy => "minimize_energy",
            Self::BalancedOptimal => "balanced_optimal",
        }
    }

    /// Parses a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minimize_delay" => Some(Self::MinimizeDelay),
            "maximize_throughput" => Some(Self::MaximizeThroughput),
            "minimize_energy" => Some(Self::MinimizeEnergy),
            "balanced_optimal" => Some(Self::BalancedOptimal),
            _ => None,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static section data a solver needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub id: String,
    pub capacity: u32,
    pub length_km: f64,
    pub max_speed_kmh: f64,
    pub status: SectionStatus,
}

impl SectionInfo {
    /// Rebuilds an unoccupied section from the meta.
    pub fn to_section(&self) -> RailwaySection {
        RailwaySection::new(self.id.clone(), self.capacity)
            .with_length(self.length_km)
            .with_max_speed(self.max_speed_kmh)
            .with_status(self.status)
    }
}

impl From<&RailwaySection> for SectionInfo {
    fn from(section: &RailwaySection) -> Self {
        Self {
            id: section.id.clone(),
            capacity: section.capacity,
            length_km: section.length_km,
            max_speed_kmh: section.max_speed_kmh,
            status: section.status,
        }
    }
}

/// A request to resolve the conflicts of one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Correlation id (uuid v4).
    pub request_id: String,
    /// Section under resolution.
    pub section_id: String,
    /// Section meta.
    pub section: SectionInfo,
    /// Trains in the section within the horizon; conflicting trains first,
    /// in precedence order.
    pub trains: Vec<Train>,
    /// Constraints in force for the section.
    pub constraints: Vec<Constraint>,
    /// Conflicts that triggered the request.
    pub conflicts: Vec<Conflict>,
    /// Objective.
    pub objective: Objective,
    /// Look-ahead (minutes, > 0).
    pub time_horizon_minutes: u32,
    /// Snapshot time the request was built from (ms).
    pub snapshot_at_ms: i64,
}

impl OptimizationRequest {
    /// Whether the request lists `train_id`.
    pub fn contains_train(&self, train_id: &str) -> bool {
        self.trains.iter().any(|t| t.id == train_id)
    }
}

/// A solver answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptimizationResponse {
    /// Whether the solver found a schedule.
    pub success: bool,
    /// Per-train revisions.
    pub updates: Vec<ScheduleUpdate>,
    /// Objective value reached.
    pub objective_value: f64,
    /// Wall-clock compute time (ms).
    pub compute_time_ms: u64,
    /// Conflicts the solver claims to resolve.
    pub conflicts_resolved: u32,
    /// Human-readable explanation.
    pub rationale: String,
}

/// Where a committed schedule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Solver,
    Heuristic,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solver => f.write_str("solver"),
            Self::Heuristic => f.write_str("heuristic"),
        }
    }
}

/// Why the solver answer was not used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// The solver did not answer within the timeout.
    Timeout,
    /// The solver could not be reached.
    Unavailable(String),
    /// The answer failed validation.
    Rejected(String),
    /// The solver reported failure.
    SolverDeclined(String),
    /// The section changed during the solver call and the answer no longer fits.
    StaleSnapshot,
}

impl FallbackReason {
    /// Variant name without the detail text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Rejected(_) => "rejected",
            Self::SolverDeclined(_) => "declined",
            Self::StaleSnapshot => "stale_snapshot",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("solver timeout"),
            Self::Unavailable(msg) => write!(f, "solver unavailable: {msg}"),
            Self::Rejected(msg) => write!(f, "solver response rejected: {msg}"),
            Self::SolverDeclined(msg) => write!(f, "solver declined: {msg}"),
            Self::StaleSnapshot => f.write_str("stale snapshot"),
        }
    }
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Section resolved.
    pub section_id: String,
    /// Source of the schedule (`None` when nothing needed resolving).
    pub provenance: Option<Provenance>,
    /// Set when the heuristic replaced the solver.
    pub fallback_reason: Option<FallbackReason>,
    /// Updates committed to the store.
    pub updates: Vec<ScheduleUpdate>,
    /// Conflicts the pass resolved.
    pub conflicts_resolved: Vec<Conflict>,
    /// Objective value reported by the producing solver.
    pub objective_value: f64,
    /// Solver compute time (ms).
    pub compute_time_ms: u64,
    /// Explanation.
    pub rationale: String,
    /// Store version after commit.
    pub version: u64,
}

impl Resolution {
    /// A pass that found nothing to resolve.
    pub fn nothing_to_resolve(section_id: impl Into<String>, version: u64) -> Self {
        Self {
            section_id: section_id.into(),
            provenance: None,
            fallback_reason: None,
            updates: Vec::new(),
            conflicts_resolved: Vec::new(),
            objective_value: 0.0,
            compute_time_ms: 0,
            rationale: "no conflicts".into(),
            version,
        }
    }

    /// Whether the heuristic produced the schedule.
    pub fn is_fallback(&self) -> bool {
        self.provenance == Some(Provenance::Heuristic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_names() {
        for o in [
            Objective::MinimizeDelay,
            Objective::MaximizeThroughput,
            Objective::MinimizeEnergy,
            Objective::BalancedOptimal,
        ] {
            assert_eq!(Objective::parse(o.as_str()), Some(o));
        }
        assert_eq!(Objective::parse("fastest"), None);
        assert_eq!(Objective::default(), Objective::BalancedOptimal);
    }

    #[test]
    fn test_empty_resolution() {
        let r = Resolution::nothing_to_resolve("SEC01", 7);
        assert!(r.updates.is_empty());
        assert!(r.provenance.is_none());
        assert!(!r.is_fallback());
        assert_eq!(r.version, 7);
    }

    #[test]
    fn test_fallback_reason_display() {
        assert_eq!(FallbackReason::Timeout.to_string(), "solver timeout");
        assert_eq!(
            FallbackReason::Rejected("unknown train X".into()).to_string(),
            "solver response rejected: unknown train X"
        );
        assert_eq!(Provenance::Heuristic.to_string(), "heuristic");
    }
}
