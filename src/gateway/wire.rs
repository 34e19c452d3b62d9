//! JSON wire format of the optimization service.
//!
//! Times are RFC 3339 timestamps; constraint parameters travel as an
//! untyped key/value map. Everything here is converted to and from the
//! typed models at the gateway boundary and nowhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::SolverError;
use crate::models::{
    Constraint, ConstraintRule, OptimizationRequest, OptimizationResponse, ScheduleUpdate,
    SpeedProfilePoint, Train,
};

/// Request body of `POST {endpoint}/optimize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub request_id: String,
    pub section_id: String,
    pub time_horizon_minutes: u32,
    pub objective: String,
    pub section: WireSection,
    pub trains: Vec<WireTrain>,
    pub constraints: Vec<WireConstraint>,
    pub conflicts: Vec<WireConflict>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSection {
    pub id: String,
    pub capacity: u32,
    pub length_km: f64,
    pub max_speed_kmh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTrain {
    pub id: String,
    pub train_number: u32,
    pub priority: u8,
    pub route_sections: Vec<String>,
    pub current_section: Option<String>,
    pub speed_kmh: f64,
    pub delay_minutes: Option<i32>,
    /// Effective entry into the request section.
    pub scheduled_departure: Option<DateTime<Utc>>,
    /// Effective exit from the request section.
    pub scheduled_arrival: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireConstraint {
    #[serde(rename = "type")]
    pub constraint_type: String,
    pub section_id: Option<String>,
    pub priority: u8,
    pub is_hard_constraint: bool,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireConflict {
    pub id: String,
    pub kind: String,
    pub train_ids: Vec<String>,
    pub severity: u32,
}

/// Solver verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unknown,
    TimeLimitExceeded,
}

impl WireStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

/// Response body of `POST {endpoint}/optimize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub request_id: String,
    pub status: WireStatus,
    #[serde(default)]
    pub optimized_schedule: Vec<WireScheduleEntry>,
    #[serde(default)]
    pub objective_value: f64,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default)]
    pub conflicts_resolved: u32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireScheduleEntry {
    pub train_id: String,
    /// Defaults to the request section.
    #[serde(default)]
    pub section_id: Option<String>,
    pub scheduled_departure: DateTime<Utc>,
    pub scheduled_arrival: DateTime<Utc>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub delay_adjustment_minutes: i32,
    #[serde(default)]
    pub speed_profile: Vec<WireSpeedPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSpeedPoint {
    pub position_km: f64,
    pub speed_kmh: f64,
    pub time_offset_minutes: f64,
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>, SolverError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| SolverError::Protocol(format!("time {ms} ms is out of range")))
}

/// Encodes a request for the wire.
pub fn encode_request(request: &OptimizationRequest) -> Result<WireRequest, SolverError> {
    let trains = request
        .trains
        .iter()
        .map(|t| encode_train(t, &request.section_id))
        .collect::<Result<Vec<_>, _>>()?;
    let constraints = request
        .constraints
        .iter()
        .map(encode_constraint)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WireRequest {
        request_id: request.request_id.clone(),
        section_id: request.section_id.clone(),
        time_horizon_minutes: request.time_horizon_minutes,
        objective: request.objective.as_str().to_string(),
        section: WireSection {
            id: request.section.id.clone(),
            capacity: request.section.capacity,
            length_km: request.section.length_km,
            max_speed_kmh: request.section.max_speed_kmh,
        },
        trains,
        constraints,
        conflicts: request
            .conflicts
            .iter()
            .map(|c| WireConflict {
                id: c.id.clone(),
                kind: c.kind.to_string(),
                train_ids: c.train_ids.clone(),
                severity: c.severity,
            })
            .collect(),
        requested_at: timestamp(request.snapshot_at_ms)?,
    })
}

fn encode_train(train: &Train, section_id: &str) -> Result<WireTrain, SolverError> {
    let window = train.effective_window(section_id);
    Ok(WireTrain {
        id: train.id.clone(),
        train_number: train.train_number,
        priority: train.priority.value(),
        route_sections: train.route.clone(),
        current_section: train.current_section.clone(),
        speed_kmh: train.speed_kmh,
        delay_minutes: train.delay_minutes,
        scheduled_departure: window.map(|w| timestamp(w.start_ms)).transpose()?,
        scheduled_arrival: window.map(|w| timestamp(w.end_ms)).transpose()?,
    })
}

/// Flattens a typed constraint into the wire's parameter map.
pub fn encode_constraint(constraint: &Constraint) -> Result<WireConstraint, SolverError> {
    let (constraint_type, parameters) = match &constraint.rule {
        ConstraintRule::SafetyDistance { min_headway_ms } => (
            "safety_distance",
            json!({ "min_headway_seconds": min_headway_ms / 1000 }),
        ),
        ConstraintRule::PlatformCapacity { capacity } => {
            ("platform_capacity", json!({ "capacity": capacity }))
        }
        ConstraintRule::TrainPriority { higher, lower } => (
            "train_priority",
            json!({ "higher_priority": higher.value(), "lower_priority": lower.value() }),
        ),
        ConstraintRule::MaintenanceWindow { start_ms, end_ms } => (
            "maintenance_window",
            json!({
                "start": timestamp(*start_ms)?.to_rfc3339(),
                "end": timestamp(*end_ms)?.to_rfc3339(),
            }),
        ),
        ConstraintRule::SpeedLimit { max_speed_kmh } => {
            ("speed_limit", json!({ "max_speed_kmh": max_speed_kmh }))
        }
        ConstraintRule::CrossingTime { min_crossing_ms } => (
            "crossing_time",
            json!({ "min_crossing_seconds": min_crossing_ms / 1000 }),
        ),
    };
    let parameters = match parameters {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Ok(WireConstraint {
        constraint_type: constraint_type.to_string(),
        section_id: constraint.section_id.clone(),
        priority: constraint.weight,
        is_hard_constraint: constraint.is_hard(),
        parameters,
    })
}

/// Decodes a wire response for `request`.
///
/// Only checks the envelope; schedule plausibility is judged by the
/// orchestrator.
pub fn decode_response(
    response: WireResponse,
    request: &OptimizationRequest,
) -> Result<OptimizationResponse, SolverError> {
    if response.request_id != request.request_id {
        return Err(SolverError::Protocol(format!(
            "response for request {} received while waiting for {}",
            response.request_id, request.request_id
        )));
    }

    let success = response.status.is_success();
    let rationale = if response.error_message.is_empty() {
        response.reasoning
    } else {
        response.error_message
    };
    let updates = response
        .optimized_schedule
        .into_iter()
        .map(|entry| {
            let mut update = ScheduleUpdate::new(
                entry.train_id,
                entry
                    .section_id
                    .unwrap_or_else(|| request.section_id.clone()),
                entry.scheduled_departure.timestamp_millis(),
                entry.scheduled_arrival.timestamp_millis(),
            )
            .with_delay_adjustment(entry.delay_adjustment_minutes)
            .with_profile(
                entry
                    .speed_profile
                    .into_iter()
                    .map(|p| SpeedProfilePoint::new(p.position_km, p.speed_kmh, p.time_offset_minutes))
                    .collect(),
            );
            update.platform = entry.platform;
            update
        })
        .collect();

    Ok(OptimizationResponse {
        success,
        updates,
        objective_value: response.objective_value,
        compute_time_ms: response.execution_time_ms,
        conflicts_resolved: response.conflicts_resolved,
        rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Objective, RailwaySection, SectionInfo, TrainPriority, MINUTE_MS,
    };

    fn request() -> OptimizationRequest {
        OptimizationRequest {
            request_id: "req-1".into(),
            section_id: "SEC01".into(),
            section: SectionInfo::from(&RailwaySection::new("SEC01", 2)),
            trains: vec![Train::new("T1", 101, TrainPriority::Express)
                .with_slot("SEC01", 0, 10 * MINUTE_MS)
                .with_delay(2)],
            constraints: vec![
                Constraint::safety_distance(5).for_section("SEC01"),
                Constraint::maintenance_window(0, 60 * MINUTE_MS),
            ],
            conflicts: vec![],
            objective: Objective::MinimizeDelay,
            time_horizon_minutes: 120,
            snapshot_at_ms: 0,
        }
    }

    #[test]
    fn test_encode_request_json_shape() {
        let wire = encode_request(&request()).unwrap();
        let value = serde_json::to_value(&wire).unwrap();

        assert_eq!(value["objective"], "minimize_delay");
        assert_eq!(value["trains"][0]["priority"], 3);
        assert_eq!(
            value["trains"][0]["scheduled_departure"],
            "1970-01-01T00:02:00Z"
        );
        assert_eq!(value["constraints"][0]["type"], "safety_distance");
        assert_eq!(value["constraints"][0]["parameters"]["min_headway_seconds"], 300);
        assert_eq!(value["constraints"][0]["is_hard_constraint"], true);
        assert_eq!(
            value["constraints"][1]["parameters"]["end"],
            "1970-01-01T01:00:00+00:00"
        );
    }

    #[test]
    fn test_decode_response() {
        let body = json!({
            "request_id": "req-1",
            "status": "feasible",
            "optimized_schedule": [{
                "train_id": "T1",
                "scheduled_departure": "1970-01-01T00:05:00Z",
                "scheduled_arrival": "1970-01-01T00:13:00Z",
                "delay_adjustment_minutes": 3,
                "speed_profile": [
                    { "position_km": 0.0, "speed_kmh": 75.0, "time_offset_minutes": 0.0 },
                    { "position_km": 10.0, "speed_kmh": 75.0, "time_offset_minutes": 8.0 }
                ]
            }],
            "objective_value": 3.0,
            "execution_time_ms": 41,
            "conflicts_resolved": 1,
            "reasoning": "held T1"
        });
        let wire: WireResponse = serde_json::from_value(body).unwrap();
        let response = decode_response(wire, &request()).unwrap();

        assert!(response.success);
        assert_eq!(response.updates[0].section_id, "SEC01");
        assert_eq!(response.updates[0].departure_ms, 5 * MINUTE_MS);
        assert_eq!(response.updates[0].speed_profile.len(), 2);
        assert_eq!(response.compute_time_ms, 41);
        assert_eq!(response.rationale, "held T1");
    }

    #[test]
    fn test_decode_infeasible_and_mismatched() {
        let infeasible: WireResponse = serde_json::from_value(json!({
            "request_id": "req-1",
            "status": "infeasible",
            "error_message": "no feasible schedule"
        }))
        .unwrap();
        let response = decode_response(infeasible.clone(), &request()).unwrap();
        assert!(!response.success);
        assert_eq!(response.rationale, "no feasible schedule");

        let mut other = infeasible;
        other.request_id = "req-2".into();
        assert!(matches!(
            decode_response(other, &request()),
            Err(SolverError::Protocol(_))
        ));
    }
}
