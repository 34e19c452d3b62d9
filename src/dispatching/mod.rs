//! Precedence rules, rule engine and section safety rules.
//!
//! Provides priority-based precedence rules (declared priority, earliest
//! scheduled time, ...), a composable rule engine for ordering competing
//! trains, and [`SectionRules`], which evaluates every operating constraint
//! against a candidate section schedule.
//!
//! The detector uses these for tie-breaking; the fallback heuristic uses
//! them to decide who goes first and to re-check its own output.
//!
//! # Usage
//!
//! ```
//! use u_railway::dispatching::{RuleEngine, RankingContext};
//! use u_railway::dispatching::rules;
//!
//! let engine = RuleEngine::new()
//!     .with_rule(rules::DeclaredPriority)
//!     .with_tie_breaker(rules::EarliestScheduled);
//!
//! let context = RankingContext::at_time(0).for_section("SEC01");
//! // let ordered = engine.order(&trains, &context);
//! ```
//!
//! # References
//!
//! - Hansen & Pachl (2014), "Railway Timetabling & Operations", Ch. 8
//! - Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

mod context;
mod engine;
pub mod rules;
mod safety;

pub use context::RankingContext;
pub use engine::{EvaluationMode, RankKey, RuleEngine, TieBreaker};
pub use safety::{
    forced_wait_ms, max_concurrency, CandidateEntry, CandidateSchedule, EntryRole, SectionRules,
};

use crate::models::Train;
use std::fmt::Debug;

/// Score returned by a precedence rule.
///
/// Lower scores = higher precedence (goes first).
pub type RuleScore = f64;

/// A rule that evaluates train precedence.
///
/// # Score Convention
/// **Lower score = higher precedence.** Rules should return smaller values
/// for trains that should go first.
pub trait DispatchingRule: Send + Sync + Debug {
    /// Rule name (e.g., "PRIORITY", "EARLIEST").
    fn name(&self) -> &'static str;

    /// Evaluates the precedence of a train in the given context.
    ///
    /// Returns a score where lower = goes first.
    fn evaluate(&self, train: &Train, context: &RankingContext) -> RuleScore;

    /// Rule description.
    fn description(&self) -> &'static str {
        self.name()
    }
}
