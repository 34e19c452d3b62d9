//! Train scheduling and conflict resolution core.
//!
//! Tracks live train state per track section, detects scheduling conflicts
//! (headway, capacity, precedence, unavailable sections), and resolves them
//! through an external optimization service with a deterministic heuristic
//! fallback. Committed schedules are pushed to subscribers as deltas.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Train`, `RailwaySection`, `Constraint`,
//!   `Conflict`, `ScheduleUpdate`, solver request/response
//! - **`store`**: Versioned state store with snapshots, atomic commits and
//!   delta fan-out
//! - **`detection`**: Conflict detection over section occupancy
//! - **`dispatching`**: Precedence rules and section safety rules
//! - **`gateway`**: Solver trait and HTTP/JSON client
//! - **`scheduler`**: Fallback heuristic and KPIs
//! - **`orchestrator`**: Resolution passes and the periodic monitor
//! - **`validation`**: Input and solver-output integrity checks
//! - **`metrics`**: Prometheus counters for detection and resolution
//! - **`config`**, **`logging`**, **`error`**: Ambient plumbing
//!
//! # Example
//!
//! ```
//! use u_railway::detection::ConflictDetector;
//! use u_railway::models::{RailwaySection, Train, TrainPriority, MINUTE_MS};
//! use u_railway::store::Snapshot;
//!
//! let snapshot = Snapshot::from_parts(
//!     vec![
//!         Train::new("EXP", 1, TrainPriority::Express).with_slot("SEC01", 0, 10 * MINUTE_MS),
//!         Train::new("FRT", 2, TrainPriority::Freight)
//!             .with_slot("SEC01", 12 * MINUTE_MS, 20 * MINUTE_MS),
//!     ],
//!     vec![RailwaySection::new("SEC01", 2)],
//!     vec![],
//!     0,
//! );
//! let conflicts = ConflictDetector::default().detect(&snapshot);
//! assert_eq!(conflicts.len(), 1);
//! ```
//!
//! # References
//!
//! - Hansen & Pachl (2014), "Railway Timetabling & Operations"
//! - Törnquist (2006), "Computer-based decision support for railway
//!   traffic scheduling and dispatching"

pub mod config;
pub mod detection;
pub mod dispatching;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod scheduler;
pub mod store;
pub mod validation;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use metrics::CoreMetrics;
pub use orchestrator::{Monitor, Orchestrator};
pub use store::StateStore;
