//! Ranking context for dispatching rule evaluation.

use std::collections::HashMap;

/// Runtime state passed to dispatching rules.
///
/// Carries the evaluation clock and, when ranking trains competing for one
/// section, each train's effective entry time into that section.
///
/// All times are in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Default)]
pub struct RankingContext {
    /// Evaluation time (ms).
    pub current_time_ms: i64,
    /// Section the trains compete for, if any.
    pub section_id: Option<String>,
    /// Effective entry time per train into `section_id` (train_id → ms).
    pub section_entry: HashMap<String, i64>,
}

impl RankingContext {
    /// Creates a context at the given time.
    pub fn at_time(current_time_ms: i64) -> Self {
        Self {
            current_time_ms,
            ..Default::default()
        }
    }

    /// Scopes the context to one section.
    pub fn for_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    /// Sets a train's entry time into the section.
    pub fn with_entry(mut self, train_id: impl Into<String>, time_ms: i64) -> Self {
        self.section_entry.insert(train_id.into(), time_ms);
        self
    }
}
