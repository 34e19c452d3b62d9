//! Schedule revision model.
//!
//! A `ScheduleUpdate` revises one train's passage through one section:
//! new effective departure/arrival, an optional platform, the delay
//! adjustment it implies, and a speed profile describing the trajectory.
//!
//! # Speed Profile Invariant
//! Samples are strictly increasing in position and non-decreasing in time
//! offset. A profile violating this is not physically realizable and must
//! never be committed.

use serde::{Deserialize, Serialize};

use super::{TimeWindow, MINUTE_MS};

/// One trajectory sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfilePoint {
    /// Distance from section start (km).
    pub position_km: f64,
    /// Speed at this point (km/h).
    pub speed_kmh: f64,
    /// Minutes since the revised departure.
    pub time_offset_minutes: f64,
}

impl SpeedProfilePoint {
    /// Creates a sample.
    pub fn new(position_km: f64, speed_kmh: f64, time_offset_minutes: f64) -> Self {
        Self {
            position_km,
            speed_kmh,
            time_offset_minutes,
        }
    }
}

/// Checks the profile monotonicity invariant.
///
/// Empty and single-sample profiles are trivially monotonic. Non-finite
/// values are rejected.
pub fn is_monotonic(profile: &[SpeedProfilePoint]) -> bool {
    if profile.iter().any(|p| {
        !p.position_km.is_finite() || !p.speed_kmh.is_finite() || !p.time_offset_minutes.is_finite()
    }) {
        return false;
    }
    profile.windows(2).all(|w| {
        w[1].position_km > w[0].position_km && w[1].time_offset_minutes >= w[0].time_offset_minutes
    })
}

/// Builds a constant-speed profile over a section.
///
/// The speed is the one needed to cover `length_km` in `duration_ms`,
/// capped at `max_speed_kmh`.
pub fn linear_profile(length_km: f64, duration_ms: i64, max_speed_kmh: f64) -> Vec<SpeedProfilePoint> {
    let minutes = duration_ms.max(0) as f64 / MINUTE_MS as f64;
    let speed = if minutes > 0.0 {
        (length_km / (minutes / 60.0)).min(max_speed_kmh)
    } else {
        max_speed_kmh
    };
    vec![
        SpeedProfilePoint::new(0.0, speed, 0.0),
        SpeedProfilePoint::new(length_km, speed, minutes),
    ]
}

/// A revised passage of one train through one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    /// Train being revised.
    pub train_id: String,
    /// Section the slot belongs to.
    pub section_id: String,
    /// Revised effective departure into the section (ms).
    pub departure_ms: i64,
    /// Revised effective arrival at the section end (ms).
    pub arrival_ms: i64,
    /// Platform assignment, if any.
    pub platform: Option<String>,
    /// Change to the train's delay in minutes (negative = improvement).
    pub delay_adjustment_minutes: i32,
    /// Trajectory samples.
    pub speed_profile: Vec<SpeedProfilePoint>,
}

impl ScheduleUpdate {
    /// Creates an update without platform or profile.
    pub fn new(
        train_id: impl Into<String>,
        section_id: impl Into<String>,
        departure_ms: i64,
        arrival_ms: i64,
    ) -> Self {
        Self {
            train_id: train_id.into(),
            section_id: section_id.into(),
            departure_ms,
            arrival_ms,
            platform: None,
            delay_adjustment_minutes: 0,
            speed_profile: Vec::new(),
        }
    }

    /// Sets the delay adjustment.
    pub fn with_delay_adjustment(mut self, minutes: i32) -> Self {
        self.delay_adjustment_minutes = minutes;
        self
    }

    /// Sets the platform.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Sets the speed profile.
    pub fn with_profile(mut self, profile: Vec<SpeedProfilePoint>) -> Self {
        self.speed_profile = profile;
        self
    }

    /// Revised occupancy window.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.departure_ms, self.arrival_ms)
    }

    /// Checks the update's own invariants.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.train_id.is_empty() {
            return Err("schedule update has an empty train id".into());
        }
        if self.departure_ms > self.arrival_ms {
            return Err(format!(
                "train {}: departure {} after arrival {}",
                self.train_id, self.departure_ms, self.arrival_ms
            ));
        }
        if !is_monotonic(&self.speed_profile) {
            return Err(format!(
                "train {}: speed profile is not monotonic",
                self.train_id
            ));
        }
        Ok(())
    }
}
