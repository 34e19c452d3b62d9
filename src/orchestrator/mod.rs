//! Optimization orchestrator.
//!
//! Runs one resolution pass for a section: snapshot, detect, ask the
//! solver, validate, fall back to the heuristic when needed, commit with
//! optimistic concurrency and publish the outcome.
//!
//! # Concurrency
//! Passes on the same section are serialized by a per-section async gate;
//! passes on different sections run in parallel. The gate is not held by
//! the store, so ingestion keeps committing while a solver runs. Commits
//! are conditioned on the section version observed in the snapshot.
//!
//! # Fallback
//! The heuristic replaces the solver when the solver is not configured,
//! times out, is unreachable, declines, or returns a schedule that fails
//! validation. The committed [`Resolution`] records which one produced the
//! schedule and why.
//!
//! # Acceptance
//! A revision delays a train in every section it is timetabled in. A
//! schedule is committed only if it leaves no conflict in the target
//! section inside the horizon or involving a revised train, and adds no
//! conflict involving a revised train in any other section.
//!
//! # Stale snapshots
//! When the section moved on during the pass, a solver schedule is kept
//! only if none of its trains changed and it still passes acceptance on
//! the fresh state. Anything else is re-planned by the heuristic on the
//! fresh state.

mod monitor;

pub use monitor::{Monitor, SweepReport};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{CoreConfig, OptimizationConfig};
use crate::detection::{train_interval, ConflictDetector};
use crate::dispatching::{RankingContext, RuleEngine};
use crate::error::{ConfigError, CoreError, CoreResult, SolverError};
use crate::gateway::{RemoteSolver, ScheduleSolver};
use crate::metrics::CoreMetrics;
use crate::models::{
    Conflict, Constraint, ConstraintRule, FallbackReason, Objective, OptimizationRequest,
    OptimizationResponse, Provenance, Resolution, ScheduleUpdate, SectionInfo, Train, MINUTE_MS,
};
use crate::scheduler::HeuristicSolver;
use crate::store::{Mutation, ResolutionEvent, Snapshot, StateStore, StateUpdate};
use crate::validation::{describe, validate_response};

/// A schedule chosen for commit.
#[derive(Debug, Clone)]
struct Candidate {
    provenance: Provenance,
    fallback_reason: Option<FallbackReason>,
    response: OptimizationResponse,
}

/// Effect of a schedule on the network.
#[derive(Debug)]
struct Projection {
    /// Every conflict left in the target section.
    remaining: Vec<Conflict>,
    /// Target-section conflicts inside the horizon or involving a revised
    /// train, then conflicts the revision adds in other sections.
    blocking: Vec<Conflict>,
}

/// Section resolution coordinator.
pub struct Orchestrator {
    store: Arc<StateStore>,
    detector: ConflictDetector,
    rule_engine: RuleEngine,
    solver: Option<Arc<dyn ScheduleSolver>>,
    fallback: HeuristicSolver,
    fallback_enabled: bool,
    config: OptimizationConfig,
    metrics: Option<Arc<CoreMetrics>>,
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Orchestrator {
    /// Creates a heuristic-only orchestrator.
    pub fn new(store: Arc<StateStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            detector: ConflictDetector::new(config.detection.clone()),
            rule_engine: RuleEngine::precedence(),
            solver: None,
            fallback: HeuristicSolver::new(config.detection.clone()),
            fallback_enabled: true,
            config: config.optimization.clone(),
            metrics: None,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an orchestrator using the configured remote solver, if any,
    /// with its own metrics registry.
    pub fn from_config(store: Arc<StateStore>, config: &CoreConfig) -> Result<Self, ConfigError> {
        let orchestrator =
            Self::new(store, config).with_metrics(Arc::new(CoreMetrics::new()?));
        Ok(match RemoteSolver::from_config(&config.solver)? {
            Some(remote) => orchestrator.with_solver(Arc::new(remote)),
            None => orchestrator,
        })
    }

    /// Records passes in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<CoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the primary solver.
    pub fn with_solver(mut self, solver: Arc<dyn ScheduleSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Surfaces solver failures as `SolverUnavailable` instead of
    /// falling back.
    pub fn without_fallback(mut self) -> Self {
        self.fallback_enabled = false;
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<CoreMetrics>> {
        self.metrics.as_ref()
    }

    /// Resolves a section with the configured objective and horizon.
    pub async fn resolve_default(&self, section_id: &str) -> CoreResult<Resolution> {
        self.resolve(
            section_id,
            self.config.default_objective,
            self.config.default_time_horizon_minutes,
        )
        .await
    }

    /// Runs one resolution pass for `section_id`.
    pub async fn resolve(
        &self,
        section_id: &str,
        objective: Objective,
        horizon_minutes: u32,
    ) -> CoreResult<Resolution> {
        let started = Instant::now();
        if let Some(metrics) = &self.metrics {
            metrics.record_request();
        }
        let result = self.pass(section_id, objective, horizon_minutes).await;
        if let Some(metrics) = &self.metrics {
            let seconds = started.elapsed().as_secs_f64();
            match &result {
                Ok(Resolution {
                    provenance: Some(provenance),
                    fallback_reason,
                    conflicts_resolved,
                    ..
                }) => metrics.record_success(
                    *provenance,
                    fallback_reason.as_ref(),
                    conflicts_resolved.len(),
                    seconds,
                ),
                Ok(_) => {}
                Err(e) => metrics.record_failure(e, seconds),
            }
        }
        result
    }

    async fn pass(
        &self,
        section_id: &str,
        objective: Objective,
        horizon_minutes: u32,
    ) -> CoreResult<Resolution> {
        if horizon_minutes == 0 || horizon_minutes > self.config.max_time_horizon_minutes {
            return Err(CoreError::Validation(format!(
                "time horizon must be within 1..={} minutes, got {}",
                self.config.max_time_horizon_minutes, horizon_minutes
            )));
        }
        if self.store.read_snapshot().section(section_id).is_none() {
            return Err(CoreError::section_not_found(section_id));
        }

        let gate = self.gate(section_id);
        let _pass = gate.lock().await;

        let horizon_ms = horizon_minutes as i64 * MINUTE_MS;
        let snapshot = self.store.read_snapshot();
        let conflicts = self
            .detector
            .detect_section_within(&snapshot, section_id, horizon_ms)?;
        if conflicts.is_empty() {
            return Ok(Resolution::nothing_to_resolve(section_id, snapshot.version()));
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_detected(&conflicts);
        }

        let request = self.build_request(&snapshot, section_id, objective, horizon_minutes, &conflicts)?;
        info!(
            section = section_id,
            request_id = %request.request_id,
            conflicts = conflicts.len(),
            trains = request.trains.len(),
            "resolving section"
        );

        let candidate = match self.consult_solver(&snapshot, &request, horizon_ms).await {
            Ok(response) => Candidate {
                provenance: Provenance::Solver,
                fallback_reason: None,
                response,
            },
            Err(reason) => {
                if !self.fallback_enabled {
                    return Err(CoreError::SolverUnavailable {
                        section_id: section_id.to_string(),
                        reason: reason.to_string(),
                        conflicts,
                    });
                }
                warn!(section = section_id, reason = %reason, "falling back to heuristic");
                self.heuristic(&snapshot, &request, reason)?
            }
        };

        self.commit(snapshot, request, candidate, horizon_ms)
    }

    fn gate(&self, section_id: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(section_id.to_string()).or_default())
    }

    /// Builds the detached solver input for a section.
    fn build_request(
        &self,
        snapshot: &Snapshot,
        section_id: &str,
        objective: Objective,
        horizon_minutes: u32,
        conflicts: &[Conflict],
    ) -> CoreResult<OptimizationRequest> {
        let section = snapshot
            .section(section_id)
            .ok_or_else(|| CoreError::section_not_found(section_id))?;
        let rules = self.detector.rules_for(snapshot, section);
        let now = snapshot.taken_at_ms();

        let live: Vec<&Train> = snapshot
            .trains_in_section(section_id)
            .filter(|t| train_interval(t, section_id, now, self.detector.config()).is_some())
            .collect();
        let context = RankingContext::at_time(now).for_section(section_id);
        let (mut trains, others): (Vec<&Train>, Vec<&Train>) = self
            .rule_engine
            .order(&live, &context)
            .into_iter()
            .partition(|t| conflicts.iter().any(|c| c.involves(&t.id)));
        trains.extend(others);

        let mut constraints = vec![
            Constraint::platform_capacity(rules.capacity).for_section(section_id),
            Constraint::new(ConstraintRule::SafetyDistance {
                min_headway_ms: rules.headway_ms,
            })
            .for_section(section_id),
        ];
        constraints.extend(snapshot.constraints_for(section_id).cloned());

        Ok(OptimizationRequest {
            request_id: Uuid::new_v4().to_string(),
            section_id: section_id.to_string(),
            section: SectionInfo::from(section),
            trains: trains.into_iter().cloned().collect(),
            constraints,
            conflicts: conflicts.to_vec(),
            objective,
            time_horizon_minutes: horizon_minutes,
            snapshot_at_ms: now,
        })
    }

    /// Asks the primary solver; any unusable outcome becomes a fallback reason.
    async fn consult_solver(
        &self,
        snapshot: &Snapshot,
        request: &OptimizationRequest,
        horizon_ms: i64,
    ) -> Result<OptimizationResponse, FallbackReason> {
        let Some(solver) = &self.solver else {
            return Err(FallbackReason::Unavailable("no solver configured".into()));
        };

        let timeout = self.config.solver_timeout();
        let response = match tokio::time::timeout(timeout, solver.solve(request)).await {
            Err(_) | Ok(Err(SolverError::Timeout(_))) => return Err(FallbackReason::Timeout),
            Ok(Err(SolverError::Declined(msg))) => return Err(FallbackReason::SolverDeclined(msg)),
            Ok(Err(e)) => return Err(FallbackReason::Unavailable(e.to_string())),
            Ok(Ok(response)) => response,
        };

        if !response.success {
            return Err(FallbackReason::SolverDeclined(response.rationale));
        }
        validate_response(request, &response)
            .map_err(|errors| FallbackReason::Rejected(describe(&errors)))?;

        let projection = self
            .project(snapshot, &request.section_id, &response.updates, horizon_ms)
            .map_err(|e| FallbackReason::Rejected(e.to_string()))?;
        if let Some(left) = projection.blocking.first() {
            return Err(FallbackReason::Rejected(format!(
                "{} conflict(s) remain, first {}",
                projection.blocking.len(),
                left.id
            )));
        }
        info!(
            solver = solver.name(),
            section = %request.section_id,
            updates = response.updates.len(),
            compute_time_ms = response.compute_time_ms,
            "solver schedule accepted"
        );
        Ok(response)
    }

    fn heuristic(
        &self,
        snapshot: &Snapshot,
        request: &OptimizationRequest,
        reason: FallbackReason,
    ) -> CoreResult<Candidate> {
        let response = self.fallback.plan_on(snapshot, request).inspect_err(|e| {
            warn!(section = %request.section_id, error = %e, "heuristic could not resolve section");
        })?;
        Ok(Candidate {
            provenance: Provenance::Heuristic,
            fallback_reason: Some(reason),
            response,
        })
    }

    /// Conflicts a schedule leaves once `updates` are applied.
    fn project(
        &self,
        snapshot: &Snapshot,
        section_id: &str,
        updates: &[ScheduleUpdate],
        horizon_ms: i64,
    ) -> CoreResult<Projection> {
        let projected = snapshot.with_updates(updates)?;
        let remaining = self.detector.detect_section(&projected, section_id)?;
        let revised: Vec<&str> = updates.iter().map(|u| u.train_id.as_str()).collect();
        let cutoff = projected.taken_at_ms() + horizon_ms;
        let mut blocking: Vec<Conflict> = remaining
            .iter()
            .filter(|c| c.window.start_ms < cutoff || revised.iter().any(|t| c.involves(t)))
            .cloned()
            .collect();
        blocking.extend(
            self.detector
                .knock_on_conflicts(snapshot, &projected, section_id, &revised)?,
        );
        Ok(Projection { remaining, blocking })
    }

    /// Projection of a candidate that must pass acceptance.
    fn accepted_projection(
        &self,
        snapshot: &Snapshot,
        request: &OptimizationRequest,
        candidate: &Candidate,
        horizon_ms: i64,
    ) -> CoreResult<Projection> {
        let projection = self.project(
            snapshot,
            &request.section_id,
            &candidate.response.updates,
            horizon_ms,
        )?;
        match projection.blocking.first() {
            None => Ok(projection),
            Some(left) => Err(CoreError::InternalInvariant {
                section_id: request.section_id.clone(),
                detail: format!(
                    "{} schedule leaves {} conflict(s), first {}",
                    candidate.provenance,
                    projection.blocking.len(),
                    left.id
                ),
                conflicts: request.conflicts.clone(),
            }),
        }
    }

    /// Commits a candidate, retrying once against a fresh snapshot.
    fn commit(
        &self,
        snapshot: Snapshot,
        request: OptimizationRequest,
        candidate: Candidate,
        horizon_ms: i64,
    ) -> CoreResult<Resolution> {
        let section = request.section_id.clone();
        let section_id = section.as_str();
        let projection = self.accepted_projection(&snapshot, &request, &candidate, horizon_ms)?;
        let expected = snapshot.section_version(section_id);

        match self.try_commit(section_id, expected, &candidate, &projection) {
            Ok(version) => return Ok(self.finish(&request, candidate, &projection, version)),
            Err(CoreError::StaleState { .. }) => {}
            Err(e) => return Err(e),
        }

        info!(section = section_id, "section changed during resolution, re-checking");
        let fresh = self.store.read_snapshot();
        let fresh_expected = fresh.section_version(section_id);

        let still_fits = match candidate.provenance {
            Provenance::Solver if revised_trains_unchanged(&snapshot, &fresh, &candidate) => self
                .project(&fresh, section_id, &candidate.response.updates, horizon_ms)
                .ok()
                .filter(|p| p.blocking.is_empty()),
            _ => None,
        };

        let (candidate, projection, request) = match still_fits {
            Some(projection) => (candidate, projection, request),
            None => {
                let conflicts = self
                    .detector
                    .detect_section_within(&fresh, section_id, horizon_ms)?;
                if conflicts.is_empty() {
                    return Ok(Resolution::nothing_to_resolve(section_id, fresh.version()));
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_detected(&conflicts);
                }
                let fresh_request = self.build_request(
                    &fresh,
                    section_id,
                    request.objective,
                    request.time_horizon_minutes,
                    &conflicts,
                )?;
                let candidate =
                    self.heuristic(&fresh, &fresh_request, FallbackReason::StaleSnapshot)?;
                let projection =
                    self.accepted_projection(&fresh, &fresh_request, &candidate, horizon_ms)?;
                (candidate, projection, fresh_request)
            }
        };

        match self.try_commit(section_id, fresh_expected, &candidate, &projection) {
            Ok(version) => Ok(self.finish(&request, candidate, &projection, version)),
            Err(CoreError::StaleState { section_id, .. }) => {
                warn!(section = %section_id, "section changed again, giving up");
                Err(CoreError::StaleState {
                    section_id,
                    conflicts: request.conflicts,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn try_commit(
        &self,
        section_id: &str,
        expected: u64,
        candidate: &Candidate,
        projection: &Projection,
    ) -> CoreResult<u64> {
        let mut mutations: Vec<Mutation> = candidate
            .response
            .updates
            .iter()
            .cloned()
            .map(Mutation::ApplySchedule)
            .collect();
        mutations.push(Mutation::SetSectionConflicts {
            section_id: section_id.to_string(),
            conflict_ids: projection.remaining.iter().map(|c| c.id.clone()).collect(),
        });
        let outcome = self
            .store
            .apply(StateUpdate::new(mutations).expecting(section_id, expected))?;
        Ok(outcome.version())
    }

    fn finish(
        &self,
        request: &OptimizationRequest,
        candidate: Candidate,
        projection: &Projection,
        version: u64,
    ) -> Resolution {
        let left: HashSet<&str> = projection.remaining.iter().map(|c| c.id.as_str()).collect();
        let conflicts_resolved: Vec<Conflict> = request
            .conflicts
            .iter()
            .filter(|c| !left.contains(c.id.as_str()))
            .cloned()
            .collect();
        let response = candidate.response;

        info!(
            section = %request.section_id,
            version,
            provenance = %candidate.provenance,
            fallback = ?candidate.fallback_reason,
            updates = response.updates.len(),
            resolved = conflicts_resolved.len(),
            "resolution committed"
        );

        self.store.synchronizer().publish_resolution(ResolutionEvent {
            version,
            section_id: request.section_id.clone(),
            provenance: candidate.provenance,
            fallback_reason: candidate.fallback_reason.clone(),
            conflicts_resolved: conflicts_resolved.len(),
            trains_rescheduled: response.updates.iter().map(|u| u.train_id.clone()).collect(),
            timestamp_ms: self.store.now_ms(),
        });

        Resolution {
            section_id: request.section_id.clone(),
            provenance: Some(candidate.provenance),
            fallback_reason: candidate.fallback_reason,
            updates: response.updates,
            conflicts_resolved,
            objective_value: response.objective_value,
            compute_time_ms: response.compute_time_ms,
            rationale: response.rationale,
            version,
        }
    }
}

/// Whether every train a candidate revises is exactly as the candidate
/// saw it, and no revision starts before the train's fresh live time.
fn revised_trains_unchanged(seen: &Snapshot, fresh: &Snapshot, candidate: &Candidate) -> bool {
    candidate.response.updates.iter().all(|update| {
        let (Some(before), Some(now)) = (seen.train(&update.train_id), fresh.train(&update.train_id))
        else {
            return false;
        };
        let live_start = now.effective_window(&update.section_id).map(|w| w.start_ms);
        before.delay_minutes == now.delay_minutes
            && before.status == now.status
            && before.timetable == now.timetable
            && live_start.is_some_and(|start| update.departure_ms >= start)
    })
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("solver", &self.solver.as_ref().map(|s| s.name()))
            .field("fallback_enabled", &self.fallback_enabled)
            .field("metrics", &self.metrics.is_some())
            .field("config", &self.config)
            .finish()
    }
}
