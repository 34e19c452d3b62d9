//! Built-in precedence rules.
//!
//! # Categories
//!
//! - **Declared**: PRIORITY, NUMBER
//! - **Time-based**: EARLIEST, LEAST_DELAY
//!
//! # Score Convention
//! All rules return lower scores for trains that go first.
//!
//! # References
//! - Hansen & Pachl (2014), "Railway Timetabling & Operations", Ch. 8
//! - Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use super::{DispatchingRule, RankingContext, RuleScore};
use crate::models::Train;

// ======================== Declared rules ========================

/// Declared train priority.
///
/// Emergency (1) goes before Maintenance (6).
#[derive(Debug, Clone, Copy)]
pub struct DeclaredPriority;

impl DispatchingRule for DeclaredPriority {
    fn name(&self) -> &'static str {
        "PRIORITY"
    }

    fn evaluate(&self, train: &Train, _context: &RankingContext) -> RuleScore {
        train.priority.value() as f64
    }

    fn description(&self) -> &'static str {
        "Declared Train Priority"
    }
}

/// Lowest train number first.
///
/// A stable, human-meaningful ordering for otherwise equal trains.
#[derive(Debug, Clone, Copy)]
pub struct TrainNumber;

impl DispatchingRule for TrainNumber {
    fn name(&self) -> &'static str {
        "NUMBER"
    }

    fn evaluate(&self, train: &Train, _context: &RankingContext) -> RuleScore {
        train.train_number as f64
    }

    fn description(&self) -> &'static str {
        "Lowest Train Number"
    }
}

// ======================== Time-based rules ========================

/// Earliest scheduled time first.
///
/// Uses the train's effective entry into the context section when known,
/// otherwise its earliest effective entry over the whole timetable.
/// Trains without a declared schedule go last.
#[derive(Debug, Clone, Copy)]
pub struct EarliestScheduled;

impl DispatchingRule for EarliestScheduled {
    fn name(&self) -> &'static str {
        "EARLIEST"
    }

    fn evaluate(&self, train: &Train, context: &RankingContext) -> RuleScore {
        if !train.is_scheduled() {
            return f64::MAX;
        }
        context
            .section_entry
            .get(&train.id)
            .copied()
            .or_else(|| {
                context
                    .section_id
                    .as_deref()
                    .and_then(|s| train.effective_window(s))
                    .map(|w| w.start_ms)
            })
            .or_else(|| train.earliest_scheduled_ms())
            .map(|t| t as f64)
            .unwrap_or(f64::MAX)
    }

    fn description(&self) -> &'static str {
        "Earliest Scheduled Time"
    }
}

/// Least delayed first.
///
/// Keeps punctual trains punctual. Trains without a schedule go last.
#[derive(Debug, Clone, Copy)]
pub struct LeastDelay;

impl DispatchingRule for LeastDelay {
    fn name(&self) -> &'static str {
        "LEAST_DELAY"
    }

    fn evaluate(&self, train: &Train, _context: &RankingContext) -> RuleScore {
        match train.delay_minutes {
            Some(d) => d as f64,
            None => f64::MAX,
        }
    }

    fn description(&self) -> &'static str {
        "Least Delay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TrainPriority, MINUTE_MS};

    #[test]
    fn test_declared_priority() {
        let ctx = RankingContext::at_time(0);
        let express = Train::new("E", 1, TrainPriority::Express);
        let freight = Train::new("F", 2, TrainPriority::Freight);
        assert!(
            DeclaredPriority.evaluate(&express, &ctx) < DeclaredPriority.evaluate(&freight, &ctx)
        );
    }

    #[test]
    fn test_earliest_scheduled_prefers_section_entry() {
        let train = Train::new("T1", 1, TrainPriority::Passenger)
            .with_slot("A", 0, MINUTE_MS)
            .with_slot("B", 5 * MINUTE_MS, 6 * MINUTE_MS);
        let global = RankingContext::at_time(0);
        let scoped = RankingContext::at_time(0).for_section("B");
        let explicit = RankingContext::at_time(0).with_entry("T1", 42);

        assert_eq!(EarliestScheduled.evaluate(&train, &global), 0.0);
        assert_eq!(
            EarliestScheduled.evaluate(&train, &scoped),
            (5 * MINUTE_MS) as f64
        );
        assert_eq!(EarliestScheduled.evaluate(&train, &explicit), 42.0);
    }

    #[test]
    fn test_unscheduled_goes_last() {
        let ctx = RankingContext::at_time(0);
        let ghost = Train::new("G", 1, TrainPriority::Passenger).unscheduled();
        assert_eq!(EarliestScheduled.evaluate(&ghost, &ctx), f64::MAX);
        assert_eq!(LeastDelay.evaluate(&ghost, &ctx), f64::MAX);
    }

    #[test]
    fn test_least_delay_and_number() {
        let ctx = RankingContext::at_time(0);
        let late = Train::new("L", 20, TrainPriority::Passenger).with_delay(12);
        let early = Train::new("E", 10, TrainPriority::Passenger).with_delay(-2);
        assert!(LeastDelay.evaluate(&early, &ctx) < LeastDelay.evaluate(&late, &ctx));
        assert!(TrainNumber.evaluate(&early, &ctx) < TrainNumber.evaluate(&late, &ctx));
    }
}
