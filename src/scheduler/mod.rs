//! Fallback resolution and KPI evaluation.
//!
//! Provides the greedy hold-back resolver used when the external solver
//! cannot deliver, and operational quality metrics.
//!
//! # Algorithm
//!
//! `HeuristicResolver` ranks conflicting trains by precedence and holds
//! each back by the smallest whole number of minutes that clears every
//! hard rule. It is not optimal, but always terminates quickly with a
//! safe schedule or a precise reason why none exists.
//!
//! # KPI
//!
//! `ScheduleKpi` computes punctuality, delay, throughput and utilization.
//!
//! # References
//!
//! - Törnquist (2006), "Computer-based decision support for railway
//!   traffic scheduling and dispatching"
//! - UIC Code 406 (2013), "Capacity"

mod heuristic;
mod kpi;

pub use heuristic::{HeuristicPlan, HeuristicResolver, HeuristicSolver};
pub use kpi::{ScheduleKpi, ON_TIME_THRESHOLD_MINUTES};
