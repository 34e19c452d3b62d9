//! Periodic network sweep.
//!
//! Every tick purges retired trains, re-detects each section over the
//! default horizon and resolves the sections that have conflicts. A
//! section that cannot be resolved keeps its conflicts recorded in the
//! store so readers see the outstanding problem.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::Orchestrator;
use crate::error::CoreError;
use crate::models::{Resolution, MINUTE_MS};
use crate::store::{Mutation, StateUpdate};

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Retired trains dropped.
    pub purged: Vec<String>,
    pub sections_checked: usize,
    /// Committed resolutions.
    pub resolved: Vec<Resolution>,
    /// Sections left unresolved, with the reason.
    pub failures: Vec<(String, CoreError)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Background sweeper driving an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct Monitor {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
}

impl Monitor {
    /// Sweeps at the configured interval.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let interval = orchestrator.config().sweep_interval();
        Self {
            orchestrator,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one sweep over every section.
    pub async fn sweep(&self) -> SweepReport {
        let store = self.orchestrator.store();
        let mut report = SweepReport::default();

        match store.purge_retired() {
            Ok(purged) => report.purged = purged,
            Err(e) => warn!(error = %e, "purge of retired trains failed"),
        }

        let config = self.orchestrator.config();
        let horizon_ms = config.default_time_horizon_minutes as i64 * MINUTE_MS;
        let snapshot = store.read_snapshot();
        let mut section_ids: Vec<String> = snapshot.sections().map(|s| s.id.clone()).collect();
        section_ids.sort();

        for section_id in section_ids {
            report.sections_checked += 1;
            let detected = self
                .orchestrator
                .detector()
                .detect_section_within(&snapshot, &section_id, horizon_ms);
            match detected {
                Ok(conflicts) if conflicts.is_empty() => continue,
                Ok(_) => {}
                Err(e) => {
                    report.failures.push((section_id, e));
                    continue;
                }
            }

            match self.orchestrator.resolve_default(&section_id).await {
                Ok(resolution) if resolution.provenance.is_some() => report.resolved.push(resolution),
                Ok(_) => {}
                Err(e) => {
                    warn!(section = %section_id, error = %e, "section left unresolved");
                    self.record_outstanding(&section_id, &e);
                    report.failures.push((section_id, e));
                }
            }
        }

        debug!(
            sections = report.sections_checked,
            resolved = report.resolved.len(),
            failed = report.failures.len(),
            purged = report.purged.len(),
            "sweep complete"
        );
        report
    }

    /// Stores the conflict ids an error carries, if they changed.
    fn record_outstanding(&self, section_id: &str, err: &CoreError) {
        if err.conflicts().is_empty() {
            return;
        }
        let store = self.orchestrator.store();
        let ids: Vec<String> = err.conflicts().iter().map(|c| c.id.clone()).collect();
        if store.read_snapshot().section_conflict_ids(section_id) == ids.as_slice() {
            return;
        }
        let update = StateUpdate::single(Mutation::SetSectionConflicts {
            section_id: section_id.to_string(),
            conflict_ids: ids,
        });
        if let Err(e) = store.apply(update) {
            error!(section = section_id, error = %e, "could not record outstanding conflicts");
        }
    }

    /// Sweeps until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    if !report.resolved.is_empty() || !report.is_clean() {
                        info!(
                            resolved = report.resolved.len(),
                            failed = report.failures.len(),
                            "sweep changed the network"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("monitor stopped");
    }

    /// Spawns [`Monitor::run`]; send `true` to stop it.
    pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (tokio::spawn(self.run(rx)), tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::models::{RailwaySection, SectionStatus, Train, TrainPatch, TrainPriority, TrainStatus};
    use crate::store::{Clock, StateStore};

    fn at(min: i64) -> i64 {
        min * MINUTE_MS
    }

    fn network() -> Arc<StateStore> {
        let store = Arc::new(StateStore::with_clock(&CoreConfig::default(), Clock::fixed(0)));
        store
            .load_topology(
                vec![
                    RailwaySection::new("SEC01", 2),
                    RailwaySection::new("SEC02", 1),
                    RailwaySection::new("SEC03", 1),
                ],
                vec![],
            )
            .unwrap();
        store
            .insert_train(Train::new("EXP", 1, TrainPriority::Express).with_slot("SEC01", 0, at(10)))
            .unwrap();
        store
            .insert_train(Train::new("FRT", 2, TrainPriority::Freight).with_slot("SEC01", at(12), at(20)))
            .unwrap();
        store
            .insert_train(Train::new("LOC", 3, TrainPriority::Passenger).with_slot("SEC02", 0, at(10)))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_sweep_resolves_conflicted_sections() {
        let store = network();
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store), &CoreConfig::default()));
        let monitor = Monitor::new(Arc::clone(&orchestrator));

        let report = monitor.sweep().await;
        assert_eq!(report.sections_checked, 3);
        assert!(report.is_clean());
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(report.resolved[0].section_id, "SEC01");

        let again = monitor.sweep().await;
        assert!(again.resolved.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_records_unresolvable_section() {
        let store = network();
        store
            .insert_train(Train::new("LATE", 4, TrainPriority::Freight).with_slot("SEC02", 0, at(10)))
            .unwrap();
        store
            .apply(StateUpdate::single(Mutation::SetSectionStatus {
                section_id: "SEC02".into(),
                status: SectionStatus::Closed,
            }))
            .unwrap();
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store), &CoreConfig::default()));

        let report = Monitor::new(orchestrator).sweep().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "SEC02");
        assert!(!store.read_snapshot().section_conflict_ids("SEC02").is_empty());
    }

    #[tokio::test]
    async fn test_sweep_purges_retired_trains() {
        let mut config = CoreConfig::default();
        config.store.retention_minutes = 0;
        let store = Arc::new(StateStore::with_clock(&config, Clock::fixed(0)));
        store
            .load_topology(vec![RailwaySection::new("SEC02", 1)], vec![])
            .unwrap();
        store
            .insert_train(Train::new("LOC", 3, TrainPriority::Passenger).with_slot("SEC02", 0, at(10)))
            .unwrap();
        store
            .update_train("LOC", TrainPatch::new().with_status(TrainStatus::Cancelled))
            .unwrap();
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store), &config));

        let report = Monitor::new(orchestrator).sweep().await;
        assert_eq!(report.purged, vec!["LOC".to_string()]);
        assert!(store.read_snapshot().train("LOC").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let store = network();
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store), &CoreConfig::default()));
        let (handle, stop) = Monitor::new(orchestrator)
            .with_interval(Duration::from_secs(1))
            .spawn();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(store.read_snapshot().section_conflict_ids("SEC01").is_empty());
        assert_eq!(
            store.read_snapshot().train("FRT").unwrap().delay_minutes,
            Some(3)
        );

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
