//! Greedy hold-back resolver.
//!
//! The fallback used whenever the external solver cannot deliver a usable
//! schedule. It never reorders trains through each other arbitrarily and
//! never speeds a train up: it only holds trains back by whole minutes.
//!
//! # Algorithm
//!
//! 1. Order conflicts by severity; every scheduled train they involve and
//!    that has not entered the section yet is a candidate for holding. All
//!    other trains keep their slot.
//! 2. Rank the candidates by precedence (declared priority, then earliest
//!    scheduled time, then id).
//! 3. Place each candidate at the earliest whole-minute hold (≥ 0) where
//!    it keeps the headway to every placed train, stays within capacity
//!    and clears every maintenance window. A hold delays the train in
//!    every section it is timetabled in, so a hold that introduces a
//!    conflict in another of its sections is skipped too. Candidate
//!    starts are the original start and the ends (plus headway) of what
//!    is already placed here and in those sections, so the search is
//!    finite.
//! 4. Re-check every held train against the section's hard rules and the
//!    other sections it runs through.
//!
//! A conflict among trains that cannot be held (unscheduled occupants) or
//! a section whose status bars entry makes the pass unsatisfiable.
//!
//! # Complexity
//! O(m² · n) for m held trains in a section with n live intervals.
//!
//! # Reference
//! Törnquist (2006), "Computer-based decision support for railway traffic
//! scheduling and dispatching: A review of models and algorithms"

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::detection::{section_intervals, train_interval, ConflictDetector, OccupancyInterval};
use crate::dispatching::{
    max_concurrency, CandidateEntry, CandidateSchedule, EntryRole, RankingContext, RuleEngine,
    SectionRules,
};
use crate::error::{CoreError, CoreResult, SolverError};
use crate::gateway::ScheduleSolver;
use crate::models::{
    ceil_minutes, linear_profile, sort_by_severity, Conflict, OptimizationRequest,
    OptimizationResponse, ScheduleUpdate, TimeWindow, Train, MINUTE_MS,
};
use crate::store::Snapshot;

/// Output of one heuristic pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeuristicPlan {
    /// Revisions for every held train.
    pub updates: Vec<ScheduleUpdate>,
    /// Sum of all holds (minutes).
    pub total_hold_minutes: i64,
    /// Conflicts the plan resolves.
    pub conflicts_resolved: Vec<Conflict>,
    /// Explanation.
    pub rationale: String,
}

impl HeuristicPlan {
    /// Converts into a solver response.
    pub fn into_response(self, compute_time_ms: u64) -> OptimizationResponse {
        OptimizationResponse {
            success: true,
            updates: self.updates,
            objective_value: self.total_hold_minutes as f64,
            compute_time_ms,
            conflicts_resolved: self.conflicts_resolved.len() as u32,
            rationale: self.rationale,
        }
    }
}

/// Greedy, priority-driven hold-back resolver.
///
/// # Example
///
/// ```
/// use u_railway::config::DetectionConfig;
/// use u_railway::detection::ConflictDetector;
/// use u_railway::models::{RailwaySection, Train, TrainPriority, MINUTE_MS};
/// use u_railway::scheduler::HeuristicResolver;
/// use u_railway::store::Snapshot;
///
/// let snapshot = Snapshot::from_parts(
///     vec![
///         Train::new("EXP", 1, TrainPriority::Express).with_slot("S1", 0, 10 * MINUTE_MS),
///         Train::new("FRT", 2, TrainPriority::Freight)
///             .with_slot("S1", 12 * MINUTE_MS, 20 * MINUTE_MS),
///     ],
///     vec![RailwaySection::new("S1", 2)],
///     vec![],
///     0,
/// );
/// let conflicts = ConflictDetector::default().detect_section(&snapshot, "S1").unwrap();
/// let plan = HeuristicResolver::new(DetectionConfig::default())
///     .resolve(&snapshot, "S1", &conflicts)
///     .unwrap();
/// assert_eq!(plan.updates.len(), 1);
/// assert_eq!(plan.updates[0].train_id, "FRT");
/// assert_eq!(plan.total_hold_minutes, 3);
/// ```
#[derive(Debug, Clone)]
pub struct HeuristicResolver {
    config: DetectionConfig,
    detector: ConflictDetector,
    rule_engine: RuleEngine,
}

impl HeuristicResolver {
    /// Creates a resolver ranking trains by [`RuleEngine::precedence`].
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            detector: ConflictDetector::new(config.clone()),
            config,
            rule_engine: RuleEngine::precedence(),
        }
    }

    /// Replaces the ranking used to decide who keeps its slot.
    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.rule_engine = engine;
        self
    }

    /// Resolves `conflicts` in `section_id` by holding trains back.
    pub fn resolve(
        &self,
        snapshot: &Snapshot,
        section_id: &str,
        conflicts: &[Conflict],
    ) -> CoreResult<HeuristicPlan> {
        let section = snapshot
            .section(section_id)
            .ok_or_else(|| CoreError::section_not_found(section_id))?;
        let rules = SectionRules::resolve(section, snapshot.constraints_for(section_id), &self.config);

        let mut ordered = conflicts.to_vec();
        sort_by_severity(&mut ordered);
        if ordered.is_empty() {
            return Ok(HeuristicPlan {
                rationale: "no conflicts".into(),
                ..HeuristicPlan::default()
            });
        }
        if !rules.available {
            return Err(CoreError::Unsatisfiable {
                section_id: section_id.to_string(),
                unresolved: ordered,
            });
        }

        let touched: HashSet<&str> = ordered
            .iter()
            .flat_map(|c| c.train_ids.iter().map(String::as_str))
            .collect();
        let intervals = section_intervals(snapshot, section_id, &self.config);
        let now = snapshot.taken_at_ms();

        let (movable, mut placed) = split_entries(&intervals, &touched, now);
        let movable_ids: HashSet<&str> = movable.iter().map(|i| i.train_id.as_str()).collect();

        let stuck: Vec<Conflict> = ordered
            .iter()
            .filter(|c| !c.train_ids.iter().any(|t| movable_ids.contains(t.as_str())))
            .cloned()
            .collect();
        if !stuck.is_empty() {
            return Err(CoreError::Unsatisfiable {
                section_id: section_id.to_string(),
                unresolved: stuck,
            });
        }

        let trains: Vec<&Train> = movable
            .iter()
            .filter_map(|i| snapshot.train(&i.train_id))
            .collect();
        let context = RankingContext::at_time(now).for_section(section_id);
        let ranked = self.rule_engine.order(&trains, &context);

        let mut updates: Vec<ScheduleUpdate> = Vec::new();
        let mut total_hold_minutes = 0i64;
        let first_movable = placed.len();

        for train in ranked {
            let Some(interval) = movable.iter().find(|i| i.train_id == train.id) else {
                continue;
            };
            let original = interval.window;
            let start = self.earliest_start(snapshot, &rules, &placed, &updates, train, &original)?;
            let hold = start - original.start_ms;
            let window = original.shifted(hold);

            if hold == 0 {
                placed.push(CandidateEntry::new(
                    train.id.clone(),
                    train.priority,
                    window,
                    EntryRole::Fixed,
                ));
                continue;
            }

            let hold_minutes = hold / MINUTE_MS;
            let update = revision(train, &rules, window, hold_minutes);
            debug!(
                train = %train.id,
                section = section_id,
                hold_minutes,
                "holding train"
            );

            total_hold_minutes += hold_minutes;
            placed.push(
                CandidateEntry::new(train.id.clone(), train.priority, window, EntryRole::Movable)
                    .with_profile(update.speed_profile.clone()),
            );
            updates.push(update);
        }

        let invariant = |detail: String| CoreError::InternalInvariant {
            section_id: section_id.to_string(),
            detail,
            conflicts: ordered.clone(),
        };
        verify(&rules, &placed, first_movable).map_err(&invariant)?;
        if let Some(knock_on) = self.knock_on(snapshot, section_id, &updates)?.first() {
            return Err(invariant(format!(
                "holds introduce {} in {}",
                knock_on.id, knock_on.section_id
            )));
        }

        let rationale = format!(
            "held {} train(s) for {} minute(s) in {}",
            updates.len(),
            total_hold_minutes,
            section_id
        );
        Ok(HeuristicPlan {
            updates,
            total_hold_minutes,
            conflicts_resolved: ordered,
            rationale,
        })
    }
}

impl HeuristicResolver {
    /// Earliest whole-minute start ≥ the original one where the train fits
    /// this section without introducing a conflict in its other sections.
    fn earliest_start(
        &self,
        snapshot: &Snapshot,
        rules: &SectionRules,
        placed: &[CandidateEntry],
        held: &[ScheduleUpdate],
        train: &Train,
        original: &TimeWindow,
    ) -> CoreResult<i64> {
        let current = snapshot.with_updates(held)?;
        let mut candidates = local_candidates(rules, placed);
        candidates.extend(self.downstream_candidates(&current, &rules.section_id, train, original));
        let starts = whole_minute_starts(original.start_ms, candidates);

        let duration = original.duration_ms();
        let mut trial = held.to_vec();
        for &start in &starts {
            let window = TimeWindow::new(start, start + duration);
            if !fits(rules, placed, &window) {
                continue;
            }
            let hold = start - original.start_ms;
            if hold == 0 {
                return Ok(start);
            }
            trial.truncate(held.len());
            trial.push(revision(train, rules, window, hold / MINUTE_MS));
            if self.knock_on(snapshot, &rules.section_id, &trial)?.is_empty() {
                return Ok(start);
            }
        }
        // The latest candidate clears everything placed; verification
        // reports it if another section still objects
        Ok(starts.last().copied().unwrap_or(original.start_ms))
    }

    /// Starts in `section_id` that line the train's windows elsewhere up
    /// behind an occupant or a maintenance window there.
    fn downstream_candidates(
        &self,
        current: &Snapshot,
        section_id: &str,
        train: &Train,
        original: &TimeWindow,
    ) -> Vec<i64> {
        let Some(train) = current.train(&train.id) else {
            return Vec::new();
        };
        let now = current.taken_at_ms();
        let mut candidates = Vec::new();
        for slot in &train.timetable {
            let other = slot.section_id.as_str();
            let Some(section) = current.section(other).filter(|_| other != section_id) else {
                continue;
            };
            let Some(own) = train_interval(train, other, now, &self.config).filter(|i| i.is_scheduled())
            else {
                continue;
            };
            let rules = SectionRules::resolve(section, current.constraints_for(other), &self.config);
            let entries: Vec<CandidateEntry> = section_intervals(current, other, &self.config)
                .into_iter()
                .filter(|i| i.train_id != train.id)
                .map(|i| {
                    let role = if i.is_scheduled() { EntryRole::Fixed } else { EntryRole::Present };
                    CandidateEntry::new(i.train_id, i.priority, i.window, role)
                })
                .collect();
            let offset = original.start_ms - own.window.start_ms;
            candidates.extend(local_candidates(&rules, &entries).into_iter().map(|c| c + offset));
        }
        candidates
    }

    /// Conflicts the revisions introduce outside `section_id`.
    fn knock_on(
        &self,
        snapshot: &Snapshot,
        section_id: &str,
        updates: &[ScheduleUpdate],
    ) -> CoreResult<Vec<Conflict>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        let after = snapshot.with_updates(updates)?;
        let revised: Vec<&str> = updates.iter().map(|u| u.train_id.as_str()).collect();
        self.detector
            .knock_on_conflicts(snapshot, &after, section_id, &revised)
    }
}

impl Default for HeuristicResolver {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

/// Splits live intervals into trains that may be held and entries that stay.
///
/// A train whose slot started before `now_ms` is already in the section
/// and keeps its slot.
fn split_entries<'a>(
    intervals: &'a [OccupancyInterval],
    touched: &HashSet<&str>,
    now_ms: i64,
) -> (Vec<&'a OccupancyInterval>, Vec<CandidateEntry>) {
    let mut movable = Vec::new();
    let mut fixed = Vec::new();
    for interval in intervals {
        let role = if !interval.is_scheduled() {
            EntryRole::Present
        } else if interval.window.start_ms >= now_ms
            && touched.contains(interval.train_id.as_str())
        {
            movable.push(interval);
            continue;
        } else {
            EntryRole::Fixed
        };
        fixed.push(CandidateEntry::new(
            interval.train_id.clone(),
            interval.priority,
            interval.window,
            role,
        ));
    }
    (movable, fixed)
}

/// Times a train could enter right behind what is placed in a section.
fn local_candidates(rules: &SectionRules, placed: &[CandidateEntry]) -> Vec<i64> {
    let mut candidates = Vec::with_capacity(placed.len() * 2 + rules.maintenance.len());
    for p in placed {
        candidates.push(p.window.end_ms);
        if p.role != EntryRole::Present {
            candidates.push(p.window.end_ms + rules.headway_ms);
        }
    }
    candidates.extend(rules.maintenance.iter().map(|m| m.end_ms));
    candidates
}

/// `start` plus every candidate at or after it, rounded up to whole
/// minutes of hold, ascending.
fn whole_minute_starts(start: i64, candidates: Vec<i64>) -> Vec<i64> {
    let mut starts: Vec<i64> = candidates
        .into_iter()
        .filter(|c| *c >= start)
        .map(|c| start + ceil_minutes(c - start) * MINUTE_MS)
        .chain(std::iter::once(start))
        .collect();
    starts.sort_unstable();
    starts.dedup();
    starts
}

/// Revision holding `train` to `window` in the rules' section.
fn revision(train: &Train, rules: &SectionRules, window: TimeWindow, hold_minutes: i64) -> ScheduleUpdate {
    let profile = linear_profile(rules.length_km, window.duration_ms(), rules.max_speed_kmh);
    let mut update = ScheduleUpdate::new(
        train.id.clone(),
        rules.section_id.as_str(),
        window.start_ms,
        window.end_ms,
    )
    .with_delay_adjustment(hold_minutes as i32)
    .with_profile(profile);
    if let Some(platform) = train
        .slot_for(&rules.section_id)
        .and_then(|s| s.platform.clone())
    {
        update = update.with_platform(platform);
    }
    update
}

/// Whether `window` keeps headway, capacity and maintenance against `placed`.
fn fits(rules: &SectionRules, placed: &[CandidateEntry], window: &TimeWindow) -> bool {
    if rules.maintenance_overlap(window).is_some() {
        return false;
    }
    let mut overlapping = vec![window];
    for p in placed {
        if p.window.overlaps(window) {
            overlapping.push(&p.window);
        } else if p.role != EntryRole::Present {
            if let Some(gap) = p.window.gap_to(window) {
                if gap < rules.headway_ms {
                    return false;
                }
            }
        }
    }
    max_concurrency(overlapping) <= rules.capacity as usize
}

/// Re-checks every train this pass placed.
fn verify(rules: &SectionRules, placed: &[CandidateEntry], first_movable: usize) -> Result<(), String> {
    for (i, entry) in placed.iter().enumerate().skip(first_movable) {
        let others: Vec<CandidateEntry> = placed
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, e)| e.clone())
            .collect();
        if !fits(rules, &others, &entry.window) {
            return Err(format!("train {} still conflicts after placement", entry.train_id));
        }
    }

    let held = CandidateSchedule {
        section_id: rules.section_id.clone(),
        entries: placed[first_movable..].to_vec(),
    };
    match rules.first_hard_violation(&held) {
        Some(rule) => Err(format!("placement breaks hard {:?} rule", rule.kind())),
        None => Ok(()),
    }
}

/// In-process solver backed by [`HeuristicResolver`].
///
/// Solves against a detached copy of the request's trains and section.
#[derive(Debug, Clone, Default)]
pub struct HeuristicSolver {
    resolver: HeuristicResolver,
}

impl HeuristicSolver {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            resolver: HeuristicResolver::new(config),
        }
    }

    pub fn with_resolver(resolver: HeuristicResolver) -> Self {
        Self { resolver }
    }

    /// Plans a request on its own detached copy, keeping the structured
    /// failure.
    pub fn plan(&self, request: &OptimizationRequest) -> CoreResult<OptimizationResponse> {
        let snapshot = Snapshot::from_parts(
            request.trains.clone(),
            vec![request.section.to_section()],
            request.constraints.clone(),
            request.snapshot_at_ms,
        );
        self.plan_on(&snapshot, request)
    }

    /// Plans a request against `snapshot`, which also supplies the other
    /// sections the request's trains run through.
    pub fn plan_on(
        &self,
        snapshot: &Snapshot,
        request: &OptimizationRequest,
    ) -> CoreResult<OptimizationResponse> {
        let started = Instant::now();
        let plan = self
            .resolver
            .resolve(snapshot, &request.section_id, &request.conflicts)?;
        Ok(plan.into_response(started.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl ScheduleSolver for HeuristicSolver {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn solve(&self, request: &OptimizationRequest) -> Result<OptimizationResponse, SolverError> {
        self.plan(request)
            .map_err(|e| SolverError::Declined(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ConflictDetector;
    use crate::models::{
        Constraint, ConflictKind, Objective, RailwaySection, SectionInfo, SectionStatus,
        TrainPriority, TrainStatus,
    };

    fn at(min: i64) -> i64 {
        min * MINUTE_MS
    }

    fn train(id: &str, p: TrainPriority, from: i64, to: i64) -> Train {
        Train::new(id, 1, p).with_slot("SEC01", at(from), at(to))
    }

    fn snapshot(capacity: u32, trains: Vec<Train>, constraints: Vec<Constraint>) -> Snapshot {
        Snapshot::from_parts(
            trains,
            vec![RailwaySection::new("SEC01", capacity)],
            constraints,
            0,
        )
    }

    fn resolve(snap: &Snapshot) -> CoreResult<HeuristicPlan> {
        let conflicts = ConflictDetector::default()
            .detect_section(snap, "SEC01")
            .unwrap();
        HeuristicResolver::default().resolve(snap, "SEC01", &conflicts)
    }

    fn assert_clean(snap: &Snapshot, plan: &HeuristicPlan) {
        let after = snap.with_updates(&plan.updates).unwrap();
        let left = ConflictDetector::default()
            .detect_section(&after, "SEC01")
            .unwrap();
        assert!(left.is_empty(), "left: {left:?}");
    }

    #[test]
    fn test_freight_held_behind_express() {
        let snap = snapshot(
            2,
            vec![
                train("EXP", TrainPriority::Express, 0, 10),
                train("FRT", TrainPriority::Freight, 12, 20),
            ],
            vec![],
        );
        let plan = resolve(&snap).unwrap();
        assert_eq!(plan.updates.len(), 1);
        let u = &plan.updates[0];
        assert_eq!(u.train_id, "FRT");
        assert_eq!(u.delay_adjustment_minutes, 3);
        assert!(u.departure_ms - at(10) >= at(5));
        assert_eq!(plan.total_hold_minutes, 3);
        assert_clean(&snap, &plan);
    }

    #[test]
    fn test_single_track_keeps_highest_priority() {
        let snap = snapshot(
            1,
            vec![
                train("PAS", TrainPriority::Passenger, 0, 10),
                train("EXP", TrainPriority::Express, 0, 10),
                train("FRT", TrainPriority::Freight, 0, 10),
            ],
            vec![],
        );
        let plan = resolve(&snap).unwrap();
        let held: Vec<&str> = plan.updates.iter().map(|u| u.train_id.as_str()).collect();
        assert_eq!(held, vec!["PAS", "FRT"]);
        assert_eq!(plan.updates[0].delay_adjustment_minutes, 15);
        assert_eq!(plan.updates[1].delay_adjustment_minutes, 30);
        assert_clean(&snap, &plan);
    }

    #[test]
    fn test_precedence_conflict_holds_the_blocker() {
        let snap = snapshot(
            1,
            vec![
                train("FRT", TrainPriority::Freight, 0, 10),
                train("EXP", TrainPriority::Express, 1, 15),
            ],
            vec![],
        );
        let plan = resolve(&snap).unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].train_id, "FRT");
        assert_eq!(plan.updates[0].departure_ms, at(20));
        assert_clean(&snap, &plan);
    }

    #[test]
    fn test_hold_clears_maintenance() {
        let snap = snapshot(
            2,
            vec![train("A", TrainPriority::Passenger, 25, 35)],
            vec![Constraint::maintenance_window(at(20), at(30)).for_section("SEC01")],
        );
        let plan = resolve(&snap).unwrap();
        assert_eq!(plan.updates[0].departure_ms, at(30));
        assert_clean(&snap, &plan);
    }

    #[test]
    fn test_untouched_trains_keep_their_slot() {
        let snap = snapshot(
            2,
            vec![
                train("A", TrainPriority::Express, 0, 10),
                train("B", TrainPriority::Freight, 12, 20),
                train("C", TrainPriority::Passenger, 60, 70),
            ],
            vec![],
        );
        let plan = resolve(&snap).unwrap();
        assert!(plan.updates.iter().all(|u| u.train_id != "C"));
        assert!(plan
            .conflicts_resolved
            .iter()
            .all(|c| c.kind == ConflictKind::HeadwayViolation));
    }

    #[test]
    fn test_unscheduled_overload_is_unsatisfiable() {
        let occupant = |id: &str| {
            Train::new(id, 1, TrainPriority::Freight)
                .unscheduled()
                .with_status(TrainStatus::Running)
                .in_section("SEC01")
        };
        let snap = snapshot(1, vec![occupant("U1"), occupant("U2")], vec![]);
        assert!(matches!(
            resolve(&snap),
            Err(CoreError::Unsatisfiable { unresolved, .. }) if unresolved.len() == 1
        ));
    }

    #[test]
    fn test_closed_section_is_unsatisfiable() {
        let snap = Snapshot::from_parts(
            vec![train("A", TrainPriority::Passenger, 5, 10)],
            vec![RailwaySection::new("SEC01", 1).with_status(SectionStatus::Closed)],
            vec![],
            0,
        );
        assert!(matches!(resolve(&snap), Err(CoreError::Unsatisfiable { .. })));
    }

    #[test]
    fn test_train_already_in_section_keeps_its_slot() {
        // FRT entered at 0; at 5 the express behind it is the one to wait
        let snap = Snapshot::from_parts(
            vec![
                train("FRT", TrainPriority::Freight, 0, 10),
                train("EXP", TrainPriority::Express, 3, 13),
            ],
            vec![RailwaySection::new("SEC01", 1)],
            vec![],
            at(5),
        );
        let plan = resolve(&snap).unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].train_id, "EXP");
        assert_eq!(plan.updates[0].departure_ms, at(15));
        assert_clean(&snap, &plan);
    }

    #[test]
    fn test_hold_respects_other_sections_of_the_train() {
        let snap = Snapshot::from_parts(
            vec![
                train("EXP", TrainPriority::Express, 0, 10),
                train("FRT", TrainPriority::Freight, 12, 20).with_slot("SEC02", at(20), at(30)),
                Train::new("PAS", 1, TrainPriority::Passenger).with_slot("SEC02", at(36), at(45)),
            ],
            vec![RailwaySection::new("SEC01", 2), RailwaySection::new("SEC02", 2)],
            vec![],
            0,
        );
        let plan = resolve(&snap).unwrap();
        assert_eq!(plan.updates.len(), 1);
        // 3 minutes would leave FRT 3 minutes ahead of PAS in SEC02
        assert_eq!(plan.updates[0].train_id, "FRT");
        assert_eq!(plan.updates[0].delay_adjustment_minutes, 30);
        assert_clean(&snap, &plan);

        let after = snap.with_updates(&plan.updates).unwrap();
        assert!(ConflictDetector::default()
            .detect_section(&after, "SEC02")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_no_conflicts_no_updates() {
        let snap = snapshot(1, vec![train("A", TrainPriority::Passenger, 0, 10)], vec![]);
        let plan = resolve(&snap).unwrap();
        assert!(plan.updates.is_empty());
        assert_eq!(plan.total_hold_minutes, 0);
    }

    #[tokio::test]
    async fn test_solver_works_on_request_copy() {
        let snap = snapshot(
            2,
            vec![
                train("EXP", TrainPriority::Express, 0, 10),
                train("FRT", TrainPriority::Freight, 12, 20),
            ],
            vec![],
        );
        let conflicts = ConflictDetector::default()
            .detect_section(&snap, "SEC01")
            .unwrap();
        let request = OptimizationRequest {
            request_id: "r1".into(),
            section_id: "SEC01".into(),
            section: SectionInfo::from(snap.section("SEC01").unwrap()),
            trains: snap.trains().cloned().collect(),
            constraints: vec![],
            conflicts,
            objective: Objective::MinimizeDelay,
            time_horizon_minutes: 120,
            snapshot_at_ms: 0,
        };
        let solver = HeuristicSolver::default();
        assert_eq!(solver.name(), "heuristic");
        let response = solver.solve(&request).await.unwrap();
        assert!(response.success);
        assert_eq!(response.conflicts_resolved, 1);
        assert!((response.objective_value - 3.0).abs() < 1e-10);
        assert_eq!(response.updates[0].train_id, "FRT");
    }
}
