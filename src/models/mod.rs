//! Railway domain models.
//!
//! Value types shared by every component: trains and their timetables,
//! track sections, operating constraints, derived conflicts, schedule
//! revisions and the solver request/response contract.
//!
//! # Domain Mappings
//!
//! | u-railway | Scheduling term |
//! |-----------|-----------------|
//! | Train | Job |
//! | SectionSlot | Operation |
//! | RailwaySection | Resource with capacity |
//! | ScheduleUpdate | Revised assignment |
//! | Conflict | Violation |

mod conflict;
mod constraint;
mod optimization;
mod schedule;
mod section;
mod train;
mod window;

pub use conflict::{sort_by_severity, Conflict, ConflictKind};
pub use constraint::{Constraint, ConstraintKind, ConstraintRule, HARD_WEIGHT};
pub use optimization::{
    FallbackReason, Objective, OptimizationRequest, OptimizationResponse, Provenance, Resolution,
    SectionInfo,
};
pub use schedule::{is_monotonic, linear_profile, ScheduleUpdate, SpeedProfilePoint};
pub use section::{RailwaySection, SectionStatus};
pub use train::{SectionSlot, Train, TrainPatch, TrainPriority, TrainStatus};
pub use window::{ceil_minutes, TimeWindow, MINUTE_MS};
