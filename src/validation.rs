//! Input validation.
//!
//! Checks structural integrity of the topology, of trains entering the
//! store, and of solver responses before anything touches state. Detects:
//! - Duplicate IDs
//! - References to unknown sections or trains
//! - Out-of-range section and constraint parameters
//! - Malformed schedule revisions (reversed windows, non-monotonic profiles)
//!
//! Every check collects all problems instead of stopping at the first.

use crate::models::{
    ConstraintRule, Constraint, OptimizationRequest, OptimizationResponse, RailwaySection, Train,
    MINUTE_MS,
};
use std::collections::HashSet;

/// Largest delay change a single revision may carry (one day).
pub const MAX_DELAY_ADJUSTMENT_MINUTES: i32 = 24 * 60;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two entities share the same ID.
    DuplicateId,
    /// A reference points to a section that doesn't exist.
    InvalidSectionReference,
    /// A response references a train the request did not contain.
    InvalidTrainReference,
    /// A numeric parameter is out of range.
    OutOfRange,
    /// A timetable slot or revision ends before it starts.
    InvertedWindow,
    /// A speed profile is not strictly increasing in position.
    NonMonotonicProfile,
    /// The route/position invariant does not hold.
    InconsistentPosition,
    /// A revision's delay change does not match its revised departure.
    InconsistentDelay,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Joins error messages for a single-line report.
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates sections and constraints before a topology load.
///
/// Checks:
/// 1. No duplicate section IDs
/// 2. Capacity >= 1, length > 0, line speed > 0
/// 3. Section-scoped constraints reference existing sections
/// 4. Constraint parameters are in range
pub fn validate_topology(sections: &[RailwaySection], constraints: &[Constraint]) -> ValidationResult {
    let mut errors = Vec::new();

    let mut section_ids = HashSet::new();
    for s in sections {
        if !section_ids.insert(s.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate section ID: {}", s.id),
            ));
        }
        if s.capacity == 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::OutOfRange,
                format!("Section '{}' has zero capacity", s.id),
            ));
        }
        if !(s.length_km > 0.0) {
            errors.push(ValidationError::new(
                ValidationErrorKind::OutOfRange,
                format!("Section '{}' has non-positive length", s.id),
            ));
        }
        if !(s.max_speed_kmh > 0.0) {
            errors.push(ValidationError::new(
                ValidationErrorKind::OutOfRange,
                format!("Section '{}' has non-positive line speed", s.id),
            ));
        }
    }

    for c in constraints {
        if let Some(id) = &c.section_id {
            if !section_ids.contains(id.as_str()) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidSectionReference,
                    format!("{:?} constraint references unknown section '{}'", c.kind(), id),
                ));
            }
        }
        if let Some(message) = constraint_range_error(&c.rule) {
            errors.push(ValidationError::new(ValidationErrorKind::OutOfRange, message));
        }
    }

    finish(errors)
}

fn constraint_range_error(rule: &ConstraintRule) -> Option<String> {
    match rule {
        ConstraintRule::SafetyDistance { min_headway_ms } if *min_headway_ms < 0 => {
            Some("Safety distance must not be negative".into())
        }
        ConstraintRule::PlatformCapacity { capacity } if *capacity == 0 => {
            Some("Platform capacity must be at least 1".into())
        }
        ConstraintRule::TrainPriority { higher, lower } if !higher.outranks(*lower) => Some(format!(
            "Priority rule {higher:?} over {lower:?} is not a strict ordering"
        )),
        ConstraintRule::MaintenanceWindow { start_ms, end_ms } if end_ms <= start_ms => {
            Some("Maintenance window ends before it starts".into())
        }
        ConstraintRule::SpeedLimit { max_speed_kmh } if !(*max_speed_kmh > 0.0) => {
            Some("Speed limit must be positive".into())
        }
        ConstraintRule::CrossingTime { min_crossing_ms } if *min_crossing_ms < 0 => {
            Some("Crossing time must not be negative".into())
        }
        _ => None,
    }
}

/// Validates a train against the loaded sections.
///
/// Checks:
/// 1. Route and current section reference existing sections
/// 2. Every timetable slot lies on the route and ends after it starts
/// 3. The route/position invariant
pub fn validate_train(train: &Train, sections: &HashSet<&str>) -> ValidationResult {
    let mut errors = Vec::new();

    for section_id in train.route.iter().chain(train.current_section.iter()) {
        if !sections.contains(section_id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidSectionReference,
                format!("Train '{}' references unknown section '{}'", train.id, section_id),
            ));
        }
    }

    for slot in &train.timetable {
        if !train.routes_through(&slot.section_id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidSectionReference,
                format!(
                    "Train '{}' has a slot for '{}' which is not on its route",
                    train.id, slot.section_id
                ),
            ));
        }
        if slot.exit_ms < slot.entry_ms {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvertedWindow,
                format!(
                    "Train '{}' leaves '{}' before entering it",
                    train.id, slot.section_id
                ),
            ));
        }
    }

    if !train.position_is_consistent() {
        errors.push(ValidationError::new(
            ValidationErrorKind::InconsistentPosition,
            format!(
                "Train '{}' is {:?} but its current section is not on its route",
                train.id, train.status
            ),
        ));
    }

    finish(errors)
}

/// Validates a solver response against the request it answers.
///
/// Checks:
/// 1. Every update references a train from the request
/// 2. Every update targets the request's section
/// 3. At most one update per train
/// 4. Departure <= arrival and monotonic speed profiles
/// 5. Delay change within ±[`MAX_DELAY_ADJUSTMENT_MINUTES`], and equal
///    (to the minute) to the shift of the train's current departure
pub fn validate_response(
    request: &OptimizationRequest,
    response: &OptimizationResponse,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for update in &response.updates {
        if !request.contains_train(&update.train_id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidTrainReference,
                format!("Update references unknown train '{}'", update.train_id),
            ));
        }
        if update.section_id != request.section_id {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidSectionReference,
                format!(
                    "Update for '{}' targets section '{}' instead of '{}'",
                    update.train_id, update.section_id, request.section_id
                ),
            ));
        }
        if !seen.insert(update.train_id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate update for train '{}'", update.train_id),
            ));
        }
        if update.departure_ms > update.arrival_ms {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvertedWindow,
                format!("Update for '{}' arrives before it departs", update.train_id),
            ));
        }
        if !crate::models::is_monotonic(&update.speed_profile) {
            errors.push(ValidationError::new(
                ValidationErrorKind::NonMonotonicProfile,
                format!("Speed profile for '{}' is not monotonic", update.train_id),
            ));
        }

        let adjustment = update.delay_adjustment_minutes;
        if adjustment.unsigned_abs() > MAX_DELAY_ADJUSTMENT_MINUTES.unsigned_abs() {
            errors.push(ValidationError::new(
                ValidationErrorKind::OutOfRange,
                format!(
                    "Delay change for '{}' is {} minutes (limit {})",
                    update.train_id, adjustment, MAX_DELAY_ADJUSTMENT_MINUTES
                ),
            ));
            continue;
        }
        let current = request
            .trains
            .iter()
            .find(|t| t.id == update.train_id)
            .and_then(|t| t.effective_window(&request.section_id));
        if let (Some(window), true) = (current, update.section_id == request.section_id) {
            let expected = window.start_ms + adjustment as i64 * MINUTE_MS;
            if (update.departure_ms - expected).abs() >= MINUTE_MS {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InconsistentDelay,
                    format!(
                        "Update for '{}' departs at {} but a {} minute change implies {}",
                        update.train_id, update.departure_ms, adjustment, expected
                    ),
                ));
            }
        }
    }

    finish(errors)
}
