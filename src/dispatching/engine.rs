//! Train precedence engine.
//!
//! Chains precedence rules into an ordering of competing trains. Rules are
//! either consulted one after another (a later rule only settles what the
//! earlier ones left equal) or summed with weights.
//!
//! # Reference
//! Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{rules, DispatchingRule, RankingContext, RuleScore};
use crate::models::Train;

/// Rule combination.
#[derive(Debug, Clone, Default)]
pub enum EvaluationMode {
    /// First differing rule decides.
    #[default]
    Sequential,
    /// Lowest weighted score sum goes first.
    Weighted,
}

/// Last resort when every rule scores two trains equally.
#[derive(Debug, Clone, Default)]
pub enum TieBreaker {
    /// Leave them equal (stable sort keeps input order).
    #[default]
    NextRule,
    /// Lexicographic train id.
    ById,
}

#[derive(Clone)]
struct WeightedRule {
    rule: Arc<dyn DispatchingRule>,
    weight: f64,
}

/// Ordering key of one train under an engine.
///
/// Compares rule scores lexicographically, then the train id.
#[derive(Debug, Clone, PartialEq)]
pub struct RankKey {
    pub scores: Vec<RuleScore>,
    pub train_id: String,
}

impl Eq for RankKey {}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.scores.iter().zip(&other.scores) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.train_id.cmp(&other.train_id)
    }
}

/// Orders trains competing for a section.
///
/// # Example
/// ```
/// use u_railway::dispatching::{RuleEngine, RankingContext};
/// use u_railway::dispatching::rules;
///
/// let engine = RuleEngine::new()
///     .with_rule(rules::DeclaredPriority)
///     .with_tie_breaker(rules::EarliestScheduled);
/// ```
#[derive(Clone)]
pub struct RuleEngine {
    rules: Vec<WeightedRule>,
    mode: EvaluationMode,
    tie_breaker: TieBreaker,
    epsilon: f64,
}

impl RuleEngine {
    /// Engine with no rules; every pair ties.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            mode: EvaluationMode::Sequential,
            tie_breaker: TieBreaker::NextRule,
            epsilon: 1e-9,
        }
    }

    /// Resolution precedence: declared priority, then earliest scheduled
    /// time (unscheduled last), then train id. A total order.
    pub fn precedence() -> Self {
        Self::new()
            .with_rule(rules::DeclaredPriority)
            .with_tie_breaker(rules::EarliestScheduled)
            .with_final_tie_breaker(TieBreaker::ById)
    }

    /// Appends a rule with weight 1.
    pub fn with_rule<R: DispatchingRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(WeightedRule {
            rule: Arc::new(rule),
            weight: 1.0,
        });
        self
    }

    /// Appends a rule with an explicit weight (used in weighted mode).
    pub fn with_weighted_rule<R: DispatchingRule + 'static>(
        mut self,
        rule: R,
        weight: f64,
    ) -> Self {
        self.rules.push(WeightedRule {
            rule: Arc::new(rule),
            weight,
        });
        self
    }

    /// Appends a rule that only separates trains in sequential mode.
    pub fn with_tie_breaker<R: DispatchingRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(WeightedRule {
            rule: Arc::new(rule),
            weight: 0.0,
        });
        self
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_final_tie_breaker(mut self, tie_breaker: TieBreaker) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    /// Sorts trains by precedence (first to go first).
    ///
    /// Returns indices into the original slice.
    pub fn sort_indices<T: Borrow<Train>>(&self, trains: &[T], context: &RankingContext) -> Vec<usize> {
        if trains.is_empty() {
            return Vec::new();
        }

        let mut indices: Vec<usize> = (0..trains.len()).collect();

        match &self.mode {
            EvaluationMode::Sequential => {
                indices.sort_by(|&a, &b| self.compare(trains[a].borrow(), trains[b].borrow(), context));
            }
            EvaluationMode::Weighted => {
                let scores: Vec<f64> = trains
                    .iter()
                    .map(|t| self.weighted_score(t.borrow(), context))
                    .collect();
                indices.sort_by(|&a, &b| {
                    scores[a]
                        .partial_cmp(&scores[b])
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| self.final_tie(trains[a].borrow(), trains[b].borrow()))
                });
            }
        }

        indices
    }

    /// Returns the trains in precedence order.
    pub fn order<'a>(&self, trains: &[&'a Train], context: &RankingContext) -> Vec<&'a Train> {
        self.sort_indices(trains, context)
            .into_iter()
            .map(|i| trains[i])
            .collect()
    }

    /// Returns the index of the train that goes first.
    pub fn select_best<T: Borrow<Train>>(&self, trains: &[T], context: &RankingContext) -> Option<usize> {
        self.sort_indices(trains, context).first().copied()
    }

    /// Weighted per-rule scores of one train.
    pub fn evaluate(&self, train: &Train, context: &RankingContext) -> Vec<RuleScore> {
        self.rules
            .iter()
            .map(|wr| wr.rule.evaluate(train, context) * wr.weight)
            .collect()
    }

    /// Ordering key of a train (unweighted rule scores, then id).
    pub fn rank(&self, train: &Train, context: &RankingContext) -> RankKey {
        RankKey {
            scores: self
                .rules
                .iter()
                .map(|wr| wr.rule.evaluate(train, context))
                .collect(),
            train_id: train.id.clone(),
        }
    }

    /// Compares two trains under sequential evaluation.
    pub fn compare(&self, a: &Train, b: &Train, context: &RankingContext) -> Ordering {
        for wr in &self.rules {
            let score_a = wr.rule.evaluate(a, context);
            let score_b = wr.rule.evaluate(b, context);

            if (score_a - score_b).abs() > self.epsilon {
                return score_a.total_cmp(&score_b);
            }
        }

        self.final_tie(a, b)
    }

    fn final_tie(&self, a: &Train, b: &Train) -> Ordering {
        match &self.tie_breaker {
            TieBreaker::NextRule => Ordering::Equal,
            TieBreaker::ById => a.id.cmp(&b.id),
        }
    }

    fn weighted_score(&self, train: &Train, context: &RankingContext) -> f64 {
        self.rules
            .iter()
            .map(|wr| wr.rule.evaluate(train, context) * wr.weight)
            .sum()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field(
                "rules",
                &self
                    .rules
                    .iter()
                    .map(|r| format!("{}(w={})", r.rule.name(), r.weight))
                    .collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatching::rules;
    use crate::models::{TrainPriority, MINUTE_MS};

    fn make_train(id: &str, priority: TrainPriority, entry_min: i64) -> Train {
        Train::new(id, 100, priority).with_slot(
            "SEC01",
            entry_min * MINUTE_MS,
            (entry_min + 5) * MINUTE_MS,
        )
    }

    #[test]
    fn test_declared_priority_order() {
        let trains = vec![
            make_train("freight", TrainPriority::Freight, 0),
            make_train("mail", TrainPriority::Mail, 10),
            make_train("express", TrainPriority::Express, 5),
        ];
        let ctx = RankingContext::at_time(0);
        let engine = RuleEngine::new().with_rule(rules::DeclaredPriority);

        let indices = engine.sort_indices(&trains, &ctx);
        assert_eq!(trains[indices[0]].id, "mail");
        assert_eq!(trains[indices[1]].id, "express");
        assert_eq!(trains[indices[2]].id, "freight");
    }

    #[test]
    fn test_precedence_breaks_ties_by_time_then_id() {
        let trains = vec![
            make_train("B", TrainPriority::Passenger, 3),
            make_train("C", TrainPriority::Passenger, 1),
            make_train("A", TrainPriority::Passenger, 3),
            make_train("U", TrainPriority::Passenger, 0).unscheduled(),
        ];
        let ctx = RankingContext::at_time(0).for_section("SEC01");
        let order: Vec<_> = RuleEngine::precedence()
            .sort_indices(&trains, &ctx)
            .into_iter()
            .map(|i| trains[i].id.as_str())
            .collect();
        assert_eq!(order, vec!["C", "A", "B", "U"]);
    }

    #[test]
    fn test_weighted_delay_outweighs_priority() {
        let trains = vec![
            make_train("A", TrainPriority::Express, 0).with_delay(20),
            make_train("B", TrainPriority::Freight, 0).with_delay(0),
        ];
        let ctx = RankingContext::at_time(0);
        let engine = RuleEngine::new()
            .with_mode(EvaluationMode::Weighted)
            .with_weighted_rule(rules::DeclaredPriority, 1.0)
            .with_weighted_rule(rules::LeastDelay, 1.0);

        // A: 3 + 20 = 23, B: 5 + 0 = 5
        let indices = engine.sort_indices(&trains, &ctx);
        assert_eq!(trains[indices[0]].id, "B");
    }

    #[test]
    fn test_rank_key_is_total() {
        let ctx = RankingContext::at_time(0).for_section("SEC01");
        let engine = RuleEngine::precedence();
        let a = make_train("A", TrainPriority::Express, 4);
        let b = make_train("B", TrainPriority::Express, 4);
        let f = make_train("F", TrainPriority::Freight, 0);
        assert!(engine.rank(&a, &ctx) < engine.rank(&b, &ctx));
        assert!(engine.rank(&b, &ctx) < engine.rank(&f, &ctx));
        assert_eq!(engine.compare(&a, &a, &ctx), Ordering::Equal);
    }

    #[test]
    fn test_order_and_select_best() {
        let express = make_train("E", TrainPriority::Express, 9);
        let freight = make_train("F", TrainPriority::Freight, 0);
        let ctx = RankingContext::at_time(0);
        let engine = RuleEngine::precedence();

        let ordered = engine.order(&[&freight, &express], &ctx);
        assert_eq!(ordered[0].id, "E");
        assert_eq!(engine.select_best(&[&freight, &express], &ctx), Some(1));

        let empty: [&Train; 0] = [];
        assert!(engine.sort_indices(&empty, &ctx).is_empty());
    }

    #[test]
    fn test_per_rule_scores() {
        let train = make_train("T1", TrainPriority::Mail, 2).with_delay(4);
        let ctx = RankingContext::at_time(0);
        let engine = RuleEngine::new()
            .with_rule(rules::DeclaredPriority)
            .with_rule(rules::LeastDelay);

        let scores = engine.evaluate(&train, &ctx);
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 2.0).abs() < 1e-10);
        assert!((scores[1] - 4.0).abs() < 1e-10);
    }
}
