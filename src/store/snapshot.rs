//! Point-in-time state.
//!
//! `StateData` is the full authoritative state. A `Snapshot` is a shared,
//! read-only handle to one version of it, taken in constant time; every
//! component other than the store works on snapshots.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Constraint, RailwaySection, ScheduleUpdate, SectionSlot, Train, MINUTE_MS,
};

/// Authoritative train and section state.
#[derive(Debug, Clone, Default)]
pub struct StateData {
    pub(crate) version: u64,
    pub(crate) trains: BTreeMap<String, Train>,
    pub(crate) sections: BTreeMap<String, RailwaySection>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) section_versions: HashMap<String, u64>,
    pub(crate) section_conflicts: HashMap<String, Vec<String>>,
}

impl StateData {
    /// Rewrites one train slot so its effective window equals the revision.
    ///
    /// The train's delay moves by the update's adjustment; the planned slot
    /// is recomputed from the revised times and the new delay.
    pub(crate) fn apply_schedule_update(
        &mut self,
        update: &ScheduleUpdate,
        now_ms: i64,
    ) -> CoreResult<()> {
        update.check_invariants().map_err(CoreError::Validation)?;
        if !self.sections.contains_key(&update.section_id) {
            return Err(CoreError::section_not_found(&update.section_id));
        }
        let train = self
            .trains
            .get_mut(&update.train_id)
            .ok_or_else(|| CoreError::train_not_found(&update.train_id))?;
        if train.status.is_terminal() {
            return Err(CoreError::StateConflict {
                train_id: train.id.clone(),
                reason: format!("cannot reschedule a {:?} train", train.status),
            });
        }
        if !train.routes_through(&update.section_id) {
            return Err(CoreError::Validation(format!(
                "train {} is not routed through section {}",
                train.id, update.section_id
            )));
        }

        let new_delay = train
            .delay_minutes
            .unwrap_or(0)
            .checked_add(update.delay_adjustment_minutes)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "train {}: delay adjustment {} overflows the live delay",
                    train.id, update.delay_adjustment_minutes
                ))
            })?;
        let delay_ms = new_delay as i64 * MINUTE_MS;
        let entry_ms = update.departure_ms - delay_ms;
        let exit_ms = update.arrival_ms - delay_ms;

        match train
            .timetable
            .iter_mut()
            .find(|s| s.section_id == update.section_id)
        {
            Some(slot) => {
                slot.entry_ms = entry_ms;
                slot.exit_ms = exit_ms;
                if update.platform.is_some() {
                    slot.platform = update.platform.clone();
                }
            }
            None => {
                let mut slot = SectionSlot::new(update.section_id.clone(), entry_ms, exit_ms);
                slot.platform = update.platform.clone();
                train.timetable.push(slot);
            }
        }
        train.delay_minutes = Some(new_delay);
        train.updated_at_ms = now_ms;
        Ok(())
    }

    /// Sections whose occupancy evaluation depends on `train`.
    pub(crate) fn sections_of(train: &Train) -> impl Iterator<Item = &String> {
        train.route.iter().chain(train.current_section.iter())
    }

    /// Rebuilds every section's occupant set from train positions.
    pub(crate) fn rebuild_occupancy(&mut self) {
        for section in self.sections.values_mut() {
            section.occupants.clear();
        }
        for train in self.trains.values() {
            if !train.status.is_active() {
                continue;
            }
            if let Some(section_id) = &train.current_section {
                if let Some(section) = self.sections.get_mut(section_id) {
                    section.add_occupant(train.id.clone());
                }
            }
        }
    }
}

/// A consistent, read-only view of the state at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    data: Arc<StateData>,
    taken_at_ms: i64,
}

impl Snapshot {
    pub(crate) fn new(data: Arc<StateData>, taken_at_ms: i64) -> Self {
        Self { data, taken_at_ms }
    }

    /// Builds a snapshot from plain collections (occupants derived from
    /// train positions).
    pub fn from_parts(
        trains: Vec<Train>,
        sections: Vec<RailwaySection>,
        constraints: Vec<Constraint>,
        taken_at_ms: i64,
    ) -> Self {
        let mut data = StateData {
            trains: trains.into_iter().map(|t| (t.id.clone(), t)).collect(),
            sections: sections.into_iter().map(|s| (s.id.clone(), s)).collect(),
            constraints,
            ..StateData::default()
        };
        data.rebuild_occupancy();
        Self::new(Arc::new(data), taken_at_ms)
    }

    /// Store version this snapshot reflects.
    pub fn version(&self) -> u64 {
        self.data.version
    }

    /// Wall-clock time the snapshot was taken (ms).
    pub fn taken_at_ms(&self) -> i64 {
        self.taken_at_ms
    }

    /// Version of the last commit that affected a section.
    pub fn section_version(&self, section_id: &str) -> u64 {
        self.data
            .section_versions
            .get(section_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn train(&self, id: &str) -> Option<&Train> {
        self.data.trains.get(id)
    }

    pub fn section(&self, id: &str) -> Option<&RailwaySection> {
        self.data.sections.get(id)
    }

    /// All trains, ordered by id.
    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.data.trains.values()
    }

    /// All sections, ordered by id.
    pub fn sections(&self) -> impl Iterator<Item = &RailwaySection> {
        self.data.sections.values()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.data.constraints
    }

    /// Constraints in force for a section.
    pub fn constraints_for<'a>(&'a self, section_id: &'a str) -> impl Iterator<Item = &'a Constraint> {
        self.data
            .constraints
            .iter()
            .filter(move |c| c.applies_to(section_id))
    }

    /// Active trains routed through or standing in a section.
    pub fn trains_in_section<'a>(&'a self, section_id: &'a str) -> impl Iterator<Item = &'a Train> {
        self.data.trains.values().filter(move |t| {
            t.status.is_active()
                && (t.routes_through(section_id)
                    || t.current_section.as_deref() == Some(section_id))
        })
    }

    /// Conflict ids last published for a section.
    pub fn section_conflict_ids(&self, section_id: &str) -> &[String] {
        self.data
            .section_conflicts
            .get(section_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The state that would result from committing `updates`.
    ///
    /// Used to check a proposed schedule before it touches the store.
    pub fn with_updates(&self, updates: &[ScheduleUpdate]) -> CoreResult<Snapshot> {
        let mut data = (*self.data).clone();
        for update in updates {
            data.apply_schedule_update(update, self.taken_at_ms)?;
        }
        Ok(Snapshot::new(Arc::new(data), self.taken_at_ms))
    }
}
