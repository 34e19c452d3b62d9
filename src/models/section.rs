//! Railway section model.
//!
//! A section is a track segment with bounded simultaneous occupancy.
//! Sections are configuration data loaded with the topology; only the
//! occupant set and the status change at runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Operational status of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionStatus {
    Active,
    Maintenance,
    Blocked,
    Closed,
}

impl SectionStatus {
    /// Whether trains may enter the section.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A track section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailwaySection {
    /// Unique section identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Maximum number of simultaneous trains (>= 1).
    pub capacity: u32,
    /// Trains currently inside the section.
    pub occupants: BTreeSet<String>,
    /// Line speed (km/h).
    pub max_speed_kmh: f64,
    /// Section length (km).
    pub length_km: f64,
    /// Operational status.
    pub status: SectionStatus,
}

impl RailwaySection {
    /// Creates an active section.
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            capacity,
            occupants: BTreeSet::new(),
            max_speed_kmh: 100.0,
            length_km: 10.0,
            status: SectionStatus::Active,
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the length.
    pub fn with_length(mut self, length_km: f64) -> Self {
        self.length_km = length_km;
        self
    }

    /// Sets the line speed.
    pub fn with_max_speed(mut self, max_speed_kmh: f64) -> Self {
        self.max_speed_kmh = max_speed_kmh;
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: SectionStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether trains may enter.
    pub fn is_available(&self) -> bool {
        self.status.is_available()
    }

    /// Number of trains inside.
    pub fn occupancy(&self) -> usize {
        self.occupants.len()
    }

    /// Whether the occupant set exceeds capacity.
    pub fn is_over_capacity(&self) -> bool {
        self.occupancy() > self.capacity as usize
    }

    /// Occupancy as a percentage of capacity.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupancy() as f64 / self.capacity as f64 * 100.0
    }

    /// Adds an occupant. Returns `false` if already present.
    pub fn add_occupant(&mut self, train_id: impl Into<String>) -> bool {
        self.occupants.insert(train_id.into())
    }

    /// Removes an occupant. Returns `false` if absent.
    pub fn remove_occupant(&mut self, train_id: &str) -> bool {
        self.occupants.remove(train_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupancy_tracking() {
        let mut s = RailwaySection::new("SEC01", 1);
        assert!(s.add_occupant("T1"));
        assert!(!s.add_occupant("T1"));
        assert!(!s.is_over_capacity());
        s.add_occupant("T2");
        assert!(s.is_over_capacity());
        assert!((s.utilization() - 200.0).abs() < 1e-10);
        assert!(s.remove_occupant("T1"));
        assert!(!s.remove_occupant("T1"));
        assert_eq!(s.occupancy(), 1);
    }

    #[test]
    fn test_availability() {
        assert!(RailwaySection::new("A", 1).is_available());
        for status in [
            SectionStatus::Maintenance,
            SectionStatus::Blocked,
            SectionStatus::Closed,
        ] {
            assert!(!RailwaySection::new("A", 1).with_status(status).is_available());
        }
    }
}
