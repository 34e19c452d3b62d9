//! State store and synchronizer.
//!
//! The single authoritative holder of train and section state. Reads take a
//! [`Snapshot`] (an `Arc` clone under a short read lock); every mutation goes
//! through [`StateStore::apply`], which commits a batch of mutations
//! atomically, advances the version counter and publishes the minimal
//! deltas.
//!
//! # Versions
//! The store version increases with every commit. Each section also
//! records the version of the last commit that changed its occupancy
//! evaluation (its status, or the schedule, status or position of a train
//! routed through it). The orchestrator uses section versions for
//! optimistic concurrency.

mod delta;
mod snapshot;
mod sync;

pub use delta::{ResolutionEvent, SectionDelta, TrainDelta};
pub use snapshot::{Snapshot, StateData};
pub use sync::{Interest, Subscription, SyncEvent, Synchronizer};

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    Constraint, RailwaySection, ScheduleUpdate, SectionStatus, Train, TrainPatch,
};
use crate::validation::{describe, validate_topology, validate_train};

/// Wall-clock source (ms since the Unix epoch).
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> i64 + Send + Sync>);

impl Clock {
    /// System UTC time.
    pub fn system() -> Self {
        Self(Arc::new(|| chrono::Utc::now().timestamp_millis()))
    }

    /// A clock frozen at `ms`.
    pub fn fixed(ms: i64) -> Self {
        Self(Arc::new(move || ms))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn now_ms(&self) -> i64 {
        (self.0)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Clock").field(&self.now_ms()).finish()
    }
}

/// One entity mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a train that is not tracked yet.
    InsertTrain(Train),
    /// Insert or replace a train.
    UpsertTrain(Train),
    /// Partial ingestion update.
    PatchTrain { train_id: String, patch: TrainPatch },
    /// Drop a train from the active set.
    RemoveTrain(String),
    /// Change a section's operational status.
    SetSectionStatus {
        section_id: String,
        status: SectionStatus,
    },
    /// Commit a revised slot.
    ApplySchedule(ScheduleUpdate),
    /// Record the conflicts currently active in a section.
    SetSectionConflicts {
        section_id: String,
        conflict_ids: Vec<String>,
    },
}

impl Mutation {
    /// Whether the mutation can change occupancy evaluation.
    fn affects_schedule(&self) -> bool {
        match self {
            Self::PatchTrain { patch, .. } => {
                patch.delay_minutes.is_some()
                    || patch.status.is_some()
                    || patch.current_section.is_some()
            }
            Self::SetSectionConflicts { .. } => false,
            _ => true,
        }
    }
}

/// A batch of mutations committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    /// Caller-assigned version. A version not newer than the store's makes
    /// the update a no-op.
    pub version: Option<u64>,
    /// Commit only if the section is still at this version.
    pub expect_section: Option<(String, u64)>,
    pub mutations: Vec<Mutation>,
}

impl StateUpdate {
    pub fn new(mutations: Vec<Mutation>) -> Self {
        Self {
            mutations,
            ..Self::default()
        }
    }

    pub fn single(mutation: Mutation) -> Self {
        Self::new(vec![mutation])
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn expecting(mut self, section_id: impl Into<String>, version: u64) -> Self {
        self.expect_section = Some((section_id.into(), version));
        self
    }
}

/// Result of `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Committed at this version.
    Committed { version: u64 },
    /// Already seen; nothing changed.
    Duplicate { version: u64 },
}

impl ApplyOutcome {
    pub fn version(&self) -> u64 {
        match self {
            Self::Committed { version } | Self::Duplicate { version } => *version,
        }
    }
}

/// Deltas produced by one commit, published after the lock is released.
struct CommitDeltas {
    trains: Vec<TrainDelta>,
    sections: Vec<SectionDelta>,
}

/// The authoritative state holder.
#[derive(Debug)]
pub struct StateStore {
    state: RwLock<Arc<StateData>>,
    sync: Synchronizer,
    clock: Clock,
    retention_ms: i64,
}

impl StateStore {
    /// Creates an empty store using the system clock.
    pub fn new(config: &CoreConfig) -> Self {
        Self::with_clock(config, Clock::system())
    }

    pub fn with_clock(config: &CoreConfig, clock: Clock) -> Self {
        Self {
            state: RwLock::new(Arc::new(StateData::default())),
            sync: Synchronizer::new(config.sync.channel_capacity),
            clock,
            retention_ms: config.store.retention_ms(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Consistent point-in-time view.
    pub fn read_snapshot(&self) -> Snapshot {
        let data = {
            let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(&guard)
        };
        Snapshot::new(data, self.now_ms())
    }

    pub fn version(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    /// Registers a delta subscriber.
    pub fn subscribe(&self, interest: Interest) -> Subscription {
        self.sync.subscribe(interest)
    }

    /// Replaces the topology. Occupants are rebuilt from train positions.
    pub fn load_topology(
        &self,
        sections: Vec<RailwaySection>,
        constraints: Vec<Constraint>,
    ) -> CoreResult<u64> {
        validate_topology(&sections, &constraints)
            .map_err(|errors| CoreError::Validation(describe(&errors)))?;

        let now = self.now_ms();
        let (version, deltas) = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut working = Arc::clone(&guard);
            let data = Arc::make_mut(&mut working);

            data.sections = sections.into_iter().map(|s| (s.id.clone(), s)).collect();
            data.constraints = constraints;
            data.section_conflicts.clear();
            data.rebuild_occupancy();
            data.version += 1;
            let version = data.version;
            data.section_versions = data
                .sections
                .keys()
                .map(|id| (id.clone(), version))
                .collect();

            let sections = data
                .sections
                .values()
                .map(|s| SectionDelta::from_section(s, &[], version, now))
                .collect();
            *guard = working;
            (
                version,
                CommitDeltas {
                    trains: Vec::new(),
                    sections,
                },
            )
        };

        tracing::info!(version, "topology loaded");
        self.publish(deltas);
        Ok(version)
    }

    /// Registers a train on first sighting.
    ///
    /// A train id that is already tracked is a `StateConflict`, decided
    /// under the write lock.
    pub fn insert_train(&self, train: Train) -> CoreResult<Train> {
        let id = train.id.clone();
        let (_, data) = self.commit(StateUpdate::single(Mutation::InsertTrain(train)))?;
        data.trains
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::train_not_found(id))
    }

    /// Ingestion update. Returns the train as this commit left it.
    pub fn update_train(&self, train_id: &str, patch: TrainPatch) -> CoreResult<Train> {
        let (_, data) = self.commit(StateUpdate::single(Mutation::PatchTrain {
            train_id: train_id.to_string(),
            patch,
        }))?;
        data.trains
            .get(train_id)
            .cloned()
            .ok_or_else(|| CoreError::train_not_found(train_id))
    }

    /// Drops retired trains whose retention window has passed.
    pub fn purge_retired(&self) -> CoreResult<Vec<String>> {
        let now = self.now_ms();
        let expired: Vec<String> = self
            .read_snapshot()
            .trains()
            .filter(|t| t.retired_at_ms.is_some_and(|r| r + self.retention_ms <= now))
            .map(|t| t.id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(expired);
        }
        self.apply(StateUpdate::new(
            expired.iter().cloned().map(Mutation::RemoveTrain).collect(),
        ))?;
        tracing::debug!(count = expired.len(), "purged retired trains");
        Ok(expired)
    }

    /// Commits a batch of mutations atomically.
    ///
    /// Either every mutation applies or the store is left unchanged.
    pub fn apply(&self, update: StateUpdate) -> CoreResult<ApplyOutcome> {
        self.commit(update).map(|(outcome, _)| outcome)
    }

    /// [`StateStore::apply`], also returning the state it left behind.
    fn commit(&self, update: StateUpdate) -> CoreResult<(ApplyOutcome, Arc<StateData>)> {
        let now = self.now_ms();
        let (outcome, committed, deltas) = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);

            if let Some(v) = update.version {
                if v <= guard.version {
                    return Ok((
                        ApplyOutcome::Duplicate {
                            version: guard.version,
                        },
                        Arc::clone(&guard),
                    ));
                }
            }
            if let Some((section_id, expected)) = &update.expect_section {
                let current = guard.section_versions.get(section_id).copied().unwrap_or(0);
                if current != *expected {
                    tracing::debug!(
                        section = %section_id,
                        expected,
                        current,
                        "section version mismatch"
                    );
                    return Err(CoreError::StaleState {
                        section_id: section_id.clone(),
                        conflicts: Vec::new(),
                    });
                }
            }

            let mut working = Arc::clone(&guard);
            let data = Arc::make_mut(&mut working);
            let version = update.version.unwrap_or(data.version + 1);

            let mut before: BTreeMap<String, Option<Train>> = BTreeMap::new();
            let mut touched_sections: BTreeSet<String> = BTreeSet::new();
            let mut versioned_sections: BTreeSet<String> = BTreeSet::new();

            for mutation in &update.mutations {
                let sections = apply_mutation(data, mutation, now, &mut before)?;
                if mutation.affects_schedule() {
                    versioned_sections.extend(sections.iter().cloned());
                }
                touched_sections.extend(sections);
            }

            data.version = version;
            for section_id in &versioned_sections {
                data.section_versions.insert(section_id.clone(), version);
            }

            let trains = before
                .iter()
                .filter_map(|(id, old)| {
                    TrainDelta::diff(old.as_ref(), data.trains.get(id), version, now)
                })
                .collect();
            let sections = touched_sections
                .iter()
                .filter_map(|id| {
                    let conflicts = data
                        .section_conflicts
                        .get(id)
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    data.sections
                        .get(id)
                        .map(|s| SectionDelta::from_section(s, conflicts, version, now))
                })
                .collect();

            let committed = Arc::clone(&working);
            *guard = working;
            (
                ApplyOutcome::Committed { version },
                committed,
                CommitDeltas { trains, sections },
            )
        };

        self.publish(deltas);
        Ok((outcome, committed))
    }

    fn publish(&self, deltas: CommitDeltas) {
        for d in deltas.trains {
            self.sync.publish_train(d);
        }
        for d in deltas.sections {
            self.sync.publish_section(d);
        }
    }
}

/// Applies one mutation to the working copy.
///
/// Records the first pre-image of every touched train in `before` and
/// returns the sections whose state may have changed.
fn apply_mutation(
    data: &mut StateData,
    mutation: &Mutation,
    now: i64,
    before: &mut BTreeMap<String, Option<Train>>,
) -> CoreResult<Vec<String>> {
    let mut record = |data: &StateData, id: &str| {
        before
            .entry(id.to_string())
            .or_insert_with(|| data.trains.get(id).cloned());
    };

    match mutation {
        Mutation::InsertTrain(train) if data.trains.contains_key(&train.id) => {
            Err(CoreError::StateConflict {
                train_id: train.id.clone(),
                reason: "train is already tracked".into(),
            })
        }

        Mutation::InsertTrain(train) | Mutation::UpsertTrain(train) => {
            let known: HashSet<&str> = data.sections.keys().map(String::as_str).collect();
            validate_train(train, &known)
                .map_err(|errors| CoreError::Validation(describe(&errors)))?;
            record(data, &train.id);
            let mut sections = affected_sections(data, &train.id);
            let mut train = train.clone();
            train.updated_at_ms = now;
            if train.status.is_terminal() && train.retired_at_ms.is_none() {
                train.retired_at_ms = Some(now);
            }
            sections.extend(StateData::sections_of(&train).cloned());
            data.trains.insert(train.id.clone(), train);
            refresh_occupancy(data, &sections);
            Ok(sections)
        }

        Mutation::PatchTrain { train_id, patch } => {
            let current = data
                .trains
                .get(train_id)
                .ok_or_else(|| CoreError::train_not_found(train_id))?;
            if current.status.is_terminal() {
                return Err(CoreError::StateConflict {
                    train_id: train_id.clone(),
                    reason: format!("train is {:?}", current.status),
                });
            }
            let mut next = current.clone();
            if let Some(status) = patch.status {
                if !next.status.can_transition_to(status) {
                    return Err(CoreError::Validation(format!(
                        "train {}: illegal transition {:?} -> {:?}",
                        train_id, next.status, status
                    )));
                }
                next.status = status;
                if status.is_terminal() {
                    next.retired_at_ms = Some(now);
                }
            }
            if let Some(section_id) = &patch.current_section {
                if !data.sections.contains_key(section_id) {
                    return Err(CoreError::section_not_found(section_id));
                }
                next.current_section = Some(section_id.clone());
            }
            if let Some(p) = patch.position_km {
                next.position_km = p;
            }
            if let Some(s) = patch.speed_kmh {
                next.speed_kmh = s;
            }
            if let Some(d) = patch.delay_minutes {
                next.delay_minutes = Some(d);
            }
            if !next.position_is_consistent() {
                return Err(CoreError::Validation(format!(
                    "train {}: current section {:?} is not on the route",
                    train_id, next.current_section
                )));
            }
            next.updated_at_ms = now;

            record(data, train_id);
            let mut sections = affected_sections(data, train_id);
            sections.extend(next.current_section.iter().cloned());
            data.trains.insert(train_id.clone(), next);
            refresh_occupancy(data, &sections);
            Ok(sections)
        }

        Mutation::RemoveTrain(train_id) => {
            if !data.trains.contains_key(train_id) {
                return Err(CoreError::train_not_found(train_id));
            }
            record(data, train_id);
            let sections = affected_sections(data, train_id);
            data.trains.remove(train_id);
            refresh_occupancy(data, &sections);
            Ok(sections)
        }

        Mutation::SetSectionStatus { section_id, status } => {
            let section = data
                .sections
                .get_mut(section_id)
                .ok_or_else(|| CoreError::section_not_found(section_id))?;
            section.status = *status;
            Ok(vec![section_id.clone()])
        }

        Mutation::ApplySchedule(update) => {
            record(data, &update.train_id);
            data.apply_schedule_update(update, now)?;
            Ok(affected_sections(data, &update.train_id))
        }

        Mutation::SetSectionConflicts {
            section_id,
            conflict_ids,
        } => {
            if !data.sections.contains_key(section_id) {
                return Err(CoreError::section_not_found(section_id));
            }
            data.section_conflicts
                .insert(section_id.clone(), conflict_ids.clone());
            Ok(vec![section_id.clone()])
        }
    }
}

fn affected_sections(data: &StateData, train_id: &str) -> Vec<String> {
    data.trains
        .get(train_id)
        .map(|t| StateData::sections_of(t).cloned().collect())
        .unwrap_or_default()
}

/// Recomputes the occupant sets of the given sections.
fn refresh_occupancy(data: &mut StateData, section_ids: &[String]) {
    for section_id in section_ids {
        let occupants: BTreeSet<String> = data
            .trains
            .values()
            .filter(|t| {
                t.status.is_active() && t.current_section.as_deref() == Some(section_id.as_str())
            })
            .map(|t| t.id.clone())
            .collect();
        if let Some(section) = data.sections.get_mut(section_id) {
            section.occupants = occupants;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::models::{TrainPriority, TrainStatus, MINUTE_MS};
    use std::sync::atomic::{AtomicI64, Ordering};

    fn store() -> StateStore {
        let store = StateStore::with_clock(&CoreConfig::default(), Clock::fixed(0));
        store
            .load_topology(
                vec![
                    RailwaySection::new("SEC01", 1),
                    RailwaySection::new("SEC02", 2),
                ],
                vec![],
            )
            .unwrap();
        store
    }

    fn express() -> Train {
        Train::new("T1", 12001, TrainPriority::Express)
            .with_slot("SEC01", 0, 10 * MINUTE_MS)
            .with_slot("SEC02", 10 * MINUTE_MS, 20 * MINUTE_MS)
    }

    #[test]
    fn test_insert_and_snapshot_isolation() {
        let store = store();
        let before = store.read_snapshot();
        store.insert_train(express()).unwrap();
        assert!(before.train("T1").is_none());
        assert!(store.read_snapshot().train("T1").is_some());
        assert!(store.read_snapshot().version() > before.version());
    }

    #[test]
    fn test_insert_twice_is_conflict() {
        let store = store();
        store.insert_train(express()).unwrap();
        assert!(matches!(
            store.insert_train(express()),
            Err(CoreError::StateConflict { .. })
        ));
    }

    #[test]
    fn test_concurrent_first_sightings_keep_one_train() {
        let store = store();
        let results: Vec<CoreResult<Train>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u32)
                .map(|n| {
                    let store = &store;
                    scope.spawn(move || {
                        let mut train = express();
                        train.train_number = 12001 + n;
                        store.insert_train(train)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<&Train> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CoreError::StateConflict { .. })));
        let kept = store.read_snapshot().train("T1").cloned().unwrap();
        assert_eq!(kept.train_number, winners[0].train_number);
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_update_returns_committed_train() {
        let store = store();
        store.insert_train(express()).unwrap();
        let patched = store
            .update_train("T1", TrainPatch::new().with_delay(3))
            .unwrap();
        store
            .update_train("T1", TrainPatch::new().with_delay(7))
            .unwrap();
        assert_eq!(patched.delay_minutes, Some(3));
        assert_eq!(
            store.read_snapshot().train("T1").unwrap().delay_minutes,
            Some(7)
        );
    }

    #[test]
    fn test_insert_unknown_section_rejected() {
        let store = store();
        let t = Train::new("T9", 9, TrainPriority::Freight).with_slot("NOPE", 0, 1);
        assert!(matches!(
            store.insert_train(t),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_update_train_moves_occupancy() {
        let store = store();
        store.insert_train(express()).unwrap();
        let t = store
            .update_train(
                "T1",
                TrainPatch::new()
                    .with_status(TrainStatus::Running)
                    .with_section("SEC01")
                    .with_position(2.5, 90.0),
            )
            .unwrap();
        assert_eq!(t.current_section.as_deref(), Some("SEC01"));
        let snap = store.read_snapshot();
        assert!(snap.section("SEC01").unwrap().occupants.contains("T1"));

        store
            .update_train("T1", TrainPatch::new().with_section("SEC02"))
            .unwrap();
        let snap = store.read_snapshot();
        assert_eq!(snap.section("SEC01").unwrap().occupancy(), 0);
        assert!(snap.section("SEC02").unwrap().occupants.contains("T1"));
    }

    #[test]
    fn test_update_train_errors() {
        let store = store();
        store.insert_train(express()).unwrap();

        assert!(matches!(
            store.update_train("T9", TrainPatch::new().with_delay(1)),
            Err(CoreError::NotFound { .. })
        ));
        // Scheduled -> AtStation is not a legal transition
        assert!(matches!(
            store.update_train("T1", TrainPatch::new().with_status(TrainStatus::AtStation)),
            Err(CoreError::Validation(_))
        ));
        // Running without a position violates the route invariant
        assert!(matches!(
            store.update_train("T1", TrainPatch::new().with_status(TrainStatus::Running)),
            Err(CoreError::Validation(_))
        ));

        store
            .update_train("T1", TrainPatch::new().with_status(TrainStatus::Cancelled))
            .unwrap();
        assert!(matches!(
            store.update_train("T1", TrainPatch::new().with_delay(2)),
            Err(CoreError::StateConflict { .. })
        ));
    }

    #[test]
    fn test_failed_batch_leaves_state_unchanged() {
        let store = store();
        store.insert_train(express()).unwrap();
        let version = store.version();
        let result = store.apply(StateUpdate::new(vec![
            Mutation::PatchTrain {
                train_id: "T1".into(),
                patch: TrainPatch::new().with_delay(7),
            },
            Mutation::RemoveTrain("GHOST".into()),
        ]));
        assert!(result.is_err());
        assert_eq!(store.version(), version);
        assert_eq!(store.read_snapshot().train("T1").unwrap().delay_minutes, Some(0));
    }

    #[test]
    fn test_apply_is_idempotent_under_version() {
        let store = store();
        store.insert_train(express()).unwrap();
        let update = StateUpdate::single(Mutation::PatchTrain {
            train_id: "T1".into(),
            patch: TrainPatch::new().with_delay(4),
        })
        .with_version(100);

        assert_eq!(
            store.apply(update.clone()).unwrap(),
            ApplyOutcome::Committed { version: 100 }
        );
        let snap = store.read_snapshot();
        assert_eq!(
            store.apply(update).unwrap(),
            ApplyOutcome::Duplicate { version: 100 }
        );
        let again = store.read_snapshot();
        assert_eq!(again.version(), snap.version());
        assert_eq!(again.train("T1").unwrap().delay_minutes, Some(4));
    }

    #[test]
    fn test_section_versions_and_expectation() {
        let store = store();
        store.insert_train(express()).unwrap();
        let snap = store.read_snapshot();
        let v = snap.section_version("SEC01");

        // Position-only updates do not invalidate schedule work
        store
            .update_train("T1", TrainPatch::new().with_position(1.0, 50.0))
            .unwrap();
        assert_eq!(store.read_snapshot().section_version("SEC01"), v);

        store
            .update_train("T1", TrainPatch::new().with_delay(2))
            .unwrap();
        assert!(store.read_snapshot().section_version("SEC01") > v);

        let stale = StateUpdate::single(Mutation::ApplySchedule(
            ScheduleUpdate::new("T1", "SEC01", 0, 10 * MINUTE_MS).with_delay_adjustment(-2),
        ))
        .expecting("SEC01", v);
        assert!(matches!(
            store.apply(stale),
            Err(CoreError::StaleState { .. })
        ));
    }

    #[test]
    fn test_schedule_update_commit() {
        let store = store();
        store.insert_train(express()).unwrap();
        let v = store.read_snapshot().section_version("SEC01");
        let update = ScheduleUpdate::new("T1", "SEC01", 3 * MINUTE_MS, 13 * MINUTE_MS)
            .with_delay_adjustment(3);
        store
            .apply(StateUpdate::single(Mutation::ApplySchedule(update)).expecting("SEC01", v))
            .unwrap();
        let t = store.read_snapshot().train("T1").cloned().unwrap();
        assert_eq!(t.delay_minutes, Some(3));
        assert_eq!(t.effective_window("SEC01").unwrap().start_ms, 3 * MINUTE_MS);
    }

    #[test]
    fn test_purge_retired_after_retention() {
        let now = Arc::new(AtomicI64::new(0));
        let clock_now = Arc::clone(&now);
        let store = StateStore::with_clock(
            &CoreConfig::default(),
            Clock::from_fn(move || clock_now.load(Ordering::SeqCst)),
        );
        store
            .load_topology(vec![RailwaySection::new("SEC01", 1)], vec![])
            .unwrap();
        store
            .insert_train(Train::new("T1", 1, TrainPriority::Freight).with_slot("SEC01", 0, 1))
            .unwrap();
        store
            .update_train("T1", TrainPatch::new().with_status(TrainStatus::Cancelled))
            .unwrap();

        now.store(30 * MINUTE_MS, Ordering::SeqCst);
        assert!(store.purge_retired().unwrap().is_empty());

        now.store(60 * MINUTE_MS, Ordering::SeqCst);
        assert_eq!(store.purge_retired().unwrap(), vec!["T1".to_string()]);
        assert!(store.read_snapshot().train("T1").is_none());
    }

    #[test]
    fn test_subscribers_receive_relevant_deltas() {
        let store = store();
        store.insert_train(express()).unwrap();
        let mut sub = store.subscribe(Interest::default().with_train("T1"));
        let mut other = store.subscribe(Interest::default().with_train("T2"));

        store
            .update_train("T1", TrainPatch::new().with_delay(6))
            .unwrap();

        match sub.try_recv().unwrap() {
            Some(SyncEvent::Train(d)) => {
                assert_eq!(d.delay_minutes, Some(6));
                assert!(d.position_km.is_none());
                assert_eq!(d.version, store.version());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(other.try_recv(), Ok(None));
    }

    #[test]
    fn test_section_conflicts_published() {
        let store = store();
        let mut sub = store.subscribe(Interest::default().with_section("SEC02"));
        let v = store.read_snapshot().section_version("SEC02");
        store
            .apply(StateUpdate::single(Mutation::SetSectionConflicts {
                section_id: "SEC02".into(),
                conflict_ids: vec!["headway:SEC02:A+B".into()],
            }))
            .unwrap();
        // Conflict bookkeeping does not advance the section version
        assert_eq!(store.read_snapshot().section_version("SEC02"), v);
        match sub.try_recv() {
            Ok(Some(SyncEvent::Section(d))) => {
                assert_eq!(d.active_conflict_ids, vec!["headway:SEC02:A+B".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_ne!(sub.try_recv(), Err(SyncError::Closed));
    }

    #[test]
    fn test_invalid_topology_rejected() {
        let store = StateStore::with_clock(&CoreConfig::default(), Clock::fixed(0));
        let result = store.load_topology(vec![RailwaySection::new("S", 0)], vec![]);
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
