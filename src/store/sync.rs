//! Delta fan-out to subscribers.
//!
//! One broadcast channel per entity category. Publishing never blocks and
//! never fails: with no subscribers the message is simply dropped. Each
//! `Subscription` filters by its interest set when it receives, so the
//! store never iterates subscribers.
//!
//! Delivery is best-effort with no replay. A subscriber that falls more
//! than the channel capacity behind gets `SyncError::Lagged` and must
//! re-fetch a snapshot.

use std::collections::BTreeSet;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::delta::{ResolutionEvent, SectionDelta, TrainDelta};
use crate::error::SyncError;

/// Entity ids a subscriber cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest {
    pub train_ids: BTreeSet<String>,
    pub section_ids: BTreeSet<String>,
    /// Receive everything (audit log).
    pub all: bool,
}

impl Interest {
    /// Interest in every entity.
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn with_train(mut self, train_id: impl Into<String>) -> Self {
        self.train_ids.insert(train_id.into());
        self
    }

    pub fn with_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_ids.insert(section_id.into());
        self
    }

    /// A train delta matches by train id or by the section the train is in.
    pub fn wants_train(&self, delta: &TrainDelta) -> bool {
        self.all
            || self.train_ids.contains(&delta.train_id)
            || delta
                .section_id
                .as_ref()
                .is_some_and(|s| self.section_ids.contains(s))
    }

    pub fn wants_section(&self, section_id: &str) -> bool {
        self.all || self.section_ids.contains(section_id)
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Train(TrainDelta),
    Section(SectionDelta),
    Resolution(ResolutionEvent),
}

impl SyncEvent {
    /// Store version the message belongs to.
    pub fn version(&self) -> u64 {
        match self {
            Self::Train(d) => d.version,
            Self::Section(d) => d.version,
            Self::Resolution(e) => e.version,
        }
    }
}

/// Broadcast hub owned by the state store.
#[derive(Debug)]
pub struct Synchronizer {
    trains: broadcast::Sender<TrainDelta>,
    sections: broadcast::Sender<SectionDelta>,
    resolutions: broadcast::Sender<ResolutionEvent>,
}

impl Synchronizer {
    /// Creates a hub with `capacity` buffered messages per channel.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (trains, _) = broadcast::channel(capacity);
        let (sections, _) = broadcast::channel(capacity);
        let (resolutions, _) = broadcast::channel(capacity);
        Self {
            trains,
            sections,
            resolutions,
        }
    }

    /// Registers a subscriber.
    pub fn subscribe(&self, interest: Interest) -> Subscription {
        Subscription {
            interest,
            trains: self.trains.subscribe(),
            sections: self.sections.subscribe(),
            resolutions: self.resolutions.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.trains.receiver_count()
    }

    pub fn publish_train(&self, delta: TrainDelta) {
        let _ = self.trains.send(delta);
    }

    pub fn publish_section(&self, delta: SectionDelta) {
        let _ = self.sections.send(delta);
    }

    pub fn publish_resolution(&self, event: ResolutionEvent) {
        tracing::debug!(
            section = %event.section_id,
            provenance = %event.provenance,
            version = event.version,
            "publishing resolution event"
        );
        let _ = self.resolutions.send(event);
    }
}

/// A filtered view over the three channels.
#[derive(Debug)]
pub struct Subscription {
    interest: Interest,
    trains: broadcast::Receiver<TrainDelta>,
    sections: broadcast::Receiver<SectionDelta>,
    resolutions: broadcast::Receiver<ResolutionEvent>,
}

impl Subscription {
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    /// Replaces the interest set. Takes effect for the next message.
    pub fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    /// Waits for the next message matching the interest set.
    pub async fn recv(&mut self) -> Result<SyncEvent, SyncError> {
        loop {
            let event = tokio::select! {
                r = self.trains.recv() => r.map(SyncEvent::Train),
                r = self.sections.recv() => r.map(SyncEvent::Section),
                r = self.resolutions.recv() => r.map(SyncEvent::Resolution),
            };
            match event {
                Ok(event) if self.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => return Err(SyncError::Lagged(n)),
                Err(RecvError::Closed) => return Err(SyncError::Closed),
            }
        }
    }

    /// Returns the next buffered matching message without waiting.
    ///
    /// Channels are drained in order trains, sections, resolutions.
    pub fn try_recv(&mut self) -> Result<Option<SyncEvent>, SyncError> {
        loop {
            let event = match next_buffered(&mut self.trains)? {
                Some(d) => SyncEvent::Train(d),
                None => match next_buffered(&mut self.sections)? {
                    Some(d) => SyncEvent::Section(d),
                    None => match next_buffered(&mut self.resolutions)? {
                        Some(e) => SyncEvent::Resolution(e),
                        None => return Ok(None),
                    },
                },
            };
            if self.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    fn matches(&self, event: &SyncEvent) -> bool {
        match event {
            SyncEvent::Train(d) => self.interest.wants_train(d),
            SyncEvent::Section(d) => self.interest.wants_section(&d.section_id),
            SyncEvent::Resolution(e) => self.interest.wants_section(&e.section_id),
        }
    }
}

fn next_buffered<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Result<Option<T>, SyncError> {
    match rx.try_recv() {
        Ok(v) => Ok(Some(v)),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Lagged(n)) => Err(SyncError::Lagged(n)),
        Err(TryRecvError::Closed) => Err(SyncError::Closed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Provenance, SectionStatus};

    fn train_delta(id: &str, section: Option<&str>, version: u64) -> TrainDelta {
        TrainDelta {
            version,
            train_id: id.into(),
            section_id: section.map(String::from),
            position_km: Some(1.0),
            speed_kmh: None,
            delay_minutes: None,
            status: None,
            current_section_changed: false,
            schedule_changed: false,
            removed: false,
            timestamp_ms: 0,
        }
    }

    fn section_delta(id: &str, version: u64) -> SectionDelta {
        SectionDelta {
            version,
            section_id: id.into(),
            occupancy: 0,
            occupants: vec![],
            status: SectionStatus::Active,
            active_conflict_ids: vec![],
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_interest_filtering() {
        let hub = Synchronizer::new(16);
        let mut by_train = hub.subscribe(Interest::default().with_train("T1"));
        let mut by_section = hub.subscribe(Interest::default().with_section("SEC01"));

        hub.publish_train(train_delta("T2", Some("SEC02"), 1));
        hub.publish_train(train_delta("T1", Some("SEC02"), 2));
        hub.publish_train(train_delta("T3", Some("SEC01"), 3));
        hub.publish_section(section_delta("SEC01", 3));

        let got = by_train.try_recv().unwrap().unwrap();
        assert_eq!(got.version(), 2);
        assert!(by_train.try_recv().unwrap().is_none());

        match by_section.try_recv().unwrap().unwrap() {
            SyncEvent::Train(d) => assert_eq!(d.train_id, "T3"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            by_section.try_recv().unwrap(),
            Some(SyncEvent::Section(_))
        ));
        assert!(by_section.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = Synchronizer::new(4);
        hub.publish_train(train_delta("T1", None, 1));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_lagging_subscriber() {
        let hub = Synchronizer::new(2);
        let mut sub = hub.subscribe(Interest::everything());
        for v in 0..5 {
            hub.publish_train(train_delta("T1", None, v));
        }
        assert_eq!(sub.try_recv(), Err(SyncError::Lagged(3)));
        // Receiver resumes at the oldest retained message
        assert_eq!(sub.try_recv().unwrap().unwrap().version(), 3);
    }

    #[tokio::test]
    async fn test_async_recv_resolution() {
        let hub = Synchronizer::new(8);
        let mut sub = hub.subscribe(Interest::default().with_section("SEC01"));
        hub.publish_resolution(ResolutionEvent {
            version: 9,
            section_id: "SEC02".into(),
            provenance: Provenance::Solver,
            fallback_reason: None,
            conflicts_resolved: 1,
            trains_rescheduled: vec![],
            timestamp_ms: 0,
        });
        hub.publish_resolution(ResolutionEvent {
            version: 10,
            section_id: "SEC01".into(),
            provenance: Provenance::Heuristic,
            fallback_reason: None,
            conflicts_resolved: 2,
            trains_rescheduled: vec!["T2".into()],
            timestamp_ms: 0,
        });
        match sub.recv().await.unwrap() {
            SyncEvent::Resolution(e) => {
                assert_eq!(e.version, 10);
                assert_eq!(e.provenance, Provenance::Heuristic);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
