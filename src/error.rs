//! Error taxonomy.
//!
//! `CoreError` is what callers of the store and orchestrator see. Every
//! schedule-related variant carries the section id and the conflicts that
//! triggered the pass, so a failure never loses its context.
//!
//! Solver failures (`SolverError`) are normally absorbed by the
//! orchestrator's fallback and surface only as provenance metadata.

use std::fmt;
use thiserror::Error;

use crate::models::Conflict;

/// Entity category for `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Train,
    Section,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => f.write_str("train"),
            Self::Section => f.write_str("section"),
        }
    }
}

/// Core error types
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown {entity}: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("State conflict on train {train_id}: {reason}")]
    StateConflict { train_id: String, reason: String },

    #[error("Section {section_id} changed during resolution; retry exhausted")]
    StaleState {
        section_id: String,
        conflicts: Vec<Conflict>,
    },

    #[error("Solver unavailable for section {section_id}: {reason}")]
    SolverUnavailable {
        section_id: String,
        reason: String,
        conflicts: Vec<Conflict>,
    },

    #[error("No schedule honoring hard constraints for section {section_id} ({} unresolved)", unresolved.len())]
    Unsatisfiable {
        section_id: String,
        unresolved: Vec<Conflict>,
    },

    #[error("Invariant violated in section {section_id}: {detail}")]
    InternalInvariant {
        section_id: String,
        detail: String,
        conflicts: Vec<Conflict>,
    },
}

impl CoreError {
    /// Shorthand for an unknown train.
    pub fn train_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: EntityKind::Train,
            id: id.into(),
        }
    }

    /// Shorthand for an unknown section.
    pub fn section_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: EntityKind::Section,
            id: id.into(),
        }
    }

    /// Section the failure belongs to, when it has one.
    pub fn section_id(&self) -> Option<&str> {
        match self {
            Self::StaleState { section_id, .. }
            | Self::SolverUnavailable { section_id, .. }
            | Self::Unsatisfiable { section_id, .. }
            | Self::InternalInvariant { section_id, .. } => Some(section_id),
            Self::NotFound {
                entity: EntityKind::Section,
                id,
            } => Some(id),
            _ => None,
        }
    }

    /// Variant name, used as a metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::StateConflict { .. } => "state_conflict",
            Self::StaleState { .. } => "stale_state",
            Self::SolverUnavailable { .. } => "solver_unavailable",
            Self::Unsatisfiable { .. } => "unsatisfiable",
            Self::InternalInvariant { .. } => "internal_invariant",
        }
    }

    /// Conflicts that triggered the failing pass.
    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            Self::StaleState { conflicts, .. }
            | Self::SolverUnavailable { conflicts, .. }
            | Self::InternalInvariant { conflicts, .. } => conflicts,
            Self::Unsatisfiable { unresolved, .. } => unresolved,
            _ => &[],
        }
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Solver gateway error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("Solver timed out after {0} ms")]
    Timeout(u64),

    #[error("Solver unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Solver declined: {0}")]
    Declined(String),
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    Env { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Solver client: {0}")]
    Solver(#[from] SolverError),

    #[error("Metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Subscription error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Subscriber lagged behind by {0} messages; re-fetch a snapshot")]
    Lagged(u64),

    #[error("Synchronizer closed")]
    Closed,
}
