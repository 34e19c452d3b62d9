//! Core configuration.
//!
//! Loaded from TOML (`CoreConfig::from_file`), from `RAIL_*` environment
//! variables (`CoreConfig::from_env`), or built from defaults. Every
//! section has serde defaults, so a partial file is valid.
//!
//! Headway and tolerance defaults are operating-rule inputs; confirm them
//! against the infrastructure manager's rules before production use.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::{Objective, MINUTE_MS};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub detection: DetectionConfig,
    pub optimization: OptimizationConfig,
    pub solver: SolverConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Conflict detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Headway used when no SafetyDistance constraint applies (minutes).
    pub default_headway_minutes: u32,
    /// Wait a higher-priority train may absorb before a precedence
    /// conflict is raised (minutes).
    pub precedence_tolerance_minutes: u32,
    /// Assumed dwell of an occupant without a slot for its section (minutes).
    pub unscheduled_dwell_minutes: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            default_headway_minutes: 5,
            precedence_tolerance_minutes: 5,
            unscheduled_dwell_minutes: 10,
        }
    }
}

impl DetectionConfig {
    pub fn default_headway_ms(&self) -> i64 {
        self.default_headway_minutes as i64 * MINUTE_MS
    }

    pub fn precedence_tolerance_ms(&self) -> i64 {
        self.precedence_tolerance_minutes as i64 * MINUTE_MS
    }

    pub fn unscheduled_dwell_ms(&self) -> i64 {
        self.unscheduled_dwell_minutes as i64 * MINUTE_MS
    }
}

/// Orchestrator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Hard bound on one solver call (seconds).
    pub solver_timeout_seconds: u64,
    /// Horizon used by the periodic sweep (minutes).
    pub default_time_horizon_minutes: u32,
    /// Largest horizon a caller may request (minutes).
    pub max_time_horizon_minutes: u32,
    /// Objective used by the periodic sweep.
    pub default_objective: Objective,
    /// Interval between periodic sweeps (seconds).
    pub sweep_interval_seconds: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            solver_timeout_seconds: 30,
            default_time_horizon_minutes: 120,
            max_time_horizon_minutes: 1440,
            default_objective: Objective::BalancedOptimal,
            sweep_interval_seconds: 30,
        }
    }
}

impl OptimizationConfig {
    pub fn solver_timeout(&self) -> Duration {
        Duration::from_secs(self.solver_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Remote solver connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Base URL of the solver service; `None` runs heuristic-only.
    pub endpoint: Option<String>,
    /// First reconnect delay (ms).
    pub backoff_base_ms: u64,
    /// Reconnect delay ceiling (ms).
    pub backoff_max_ms: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// State store parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long retired trains stay visible for audit (minutes).
    pub retention_minutes: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_minutes: 60,
        }
    }
}

impl StoreConfig {
    pub fn retention_ms(&self) -> i64 {
        self.retention_minutes as i64 * MINUTE_MS
    }
}

/// Synchronizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Per-channel broadcast buffer.
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Logging parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive (e.g. `info`, `u_railway=debug`).
    pub level: String,
    /// Emit JSON lines instead of plain text.
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl CoreConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `RAIL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value.parse().map_err(|_| ConfigError::Env {
                key: key.to_string(),
                value,
            })
        }

        if let Some(v) = lookup("RAIL_HEADWAY_MINUTES") {
            self.detection.default_headway_minutes = parse("RAIL_HEADWAY_MINUTES", v)?;
        }
        if let Some(v) = lookup("RAIL_PRECEDENCE_TOLERANCE_MINUTES") {
            self.detection.precedence_tolerance_minutes =
                parse("RAIL_PRECEDENCE_TOLERANCE_MINUTES", v)?;
        }
        if let Some(v) = lookup("RAIL_SOLVER_TIMEOUT_SECONDS") {
            self.optimization.solver_timeout_seconds = parse("RAIL_SOLVER_TIMEOUT_SECONDS", v)?;
        }
        if let Some(v) = lookup("RAIL_TIME_HORIZON_MINUTES") {
            self.optimization.default_time_horizon_minutes =
                parse("RAIL_TIME_HORIZON_MINUTES", v)?;
        }
        if let Some(v) = lookup("RAIL_OBJECTIVE") {
            self.optimization.default_objective =
                Objective::parse(&v).ok_or_else(|| ConfigError::Env {
                    key: "RAIL_OBJECTIVE".to_string(),
                    value: v.clone(),
                })?;
        }
        if let Some(v) = lookup("RAIL_SWEEP_INTERVAL_SECONDS") {
            self.optimization.sweep_interval_seconds = parse("RAIL_SWEEP_INTERVAL_SECONDS", v)?;
        }
        if let Some(v) = lookup("RAIL_SOLVER_ENDPOINT") {
            self.solver.endpoint = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("RAIL_RETENTION_MINUTES") {
            self.store.retention_minutes = parse("RAIL_RETENTION_MINUTES", v)?;
        }
        if let Some(v) = lookup("RAIL_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("RAIL_LOG_JSON") {
            self.logging.json_format = parse("RAIL_LOG_JSON", v)?;
        }
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let opt = &self.optimization;
        if opt.solver_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("solver timeout must be > 0".into()));
        }
        if opt.max_time_horizon_minutes == 0 {
            return Err(ConfigError::Invalid("max time horizon must be > 0".into()));
        }
        if opt.default_time_horizon_minutes == 0
            || opt.default_time_horizon_minutes > opt.max_time_horizon_minutes
        {
            return Err(ConfigError::Invalid(format!(
                "default time horizon must be in 1..={}",
                opt.max_time_horizon_minutes
            )));
        }
        if opt.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid("sweep interval must be > 0".into()));
        }
        if self.solver.backoff_base_ms == 0 || self.solver.backoff_base_ms > self.solver.backoff_max_ms
        {
            return Err(ConfigError::Invalid(
                "solver backoff must satisfy 0 < base <= max".into(),
            ));
        }
        if self.sync.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel capacity must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = CoreConfig::default();
        assert_eq!(c.detection.default_headway_ms(), 5 * MINUTE_MS);
        assert_eq!(c.optimization.solver_timeout(), Duration::from_secs(30));
        assert_eq!(c.optimization.default_time_horizon_minutes, 120);
        assert_eq!(c.store.retention_ms(), 60 * MINUTE_MS);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let c = CoreConfig::from_toml(
            r#"
            [detection]
            default_headway_minutes = 3

            [optimization]
            solver_timeout_seconds = 5
            default_objective = "MinimizeDelay"

            [solver]
            endpoint = "http://solver:50051"
            "#,
        )
        .unwrap();
        assert_eq!(c.detection.default_headway_minutes, 3);
        assert_eq!(c.detection.precedence_tolerance_minutes, 5);
        assert_eq!(c.optimization.solver_timeout_seconds, 5);
        assert_eq!(c.optimization.default_objective, Objective::MinimizeDelay);
        assert_eq!(c.solver.endpoint.as_deref(), Some("http://solver:50051"));
        assert_eq!(c.sync.channel_capacity, 1024);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            CoreConfig::from_toml("[optimization]\nsolver_timeout_seconds = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CoreConfig::from_toml("detection = 7"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RAIL_HEADWAY_MINUTES", "4"),
            ("RAIL_OBJECTIVE", "minimize_energy"),
            ("RAIL_SOLVER_ENDPOINT", "http://localhost:9000"),
            ("RAIL_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();
        let mut c = CoreConfig::default();
        c.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.detection.default_headway_minutes, 4);
        assert_eq!(c.optimization.default_objective, Objective::MinimizeEnergy);
        assert_eq!(c.solver.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(c.logging.json_format);
    }

    #[test]
    fn test_env_bad_value() {
        let mut c = CoreConfig::default();
        let err = c
            .apply_overrides(|k| (k == "RAIL_HEADWAY_MINUTES").then(|| "five".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_horizon_bounds() {
        let mut c = CoreConfig::default();
        c.optimization.default_time_horizon_minutes = 2000;
        assert!(c.validate().is_err());
    }
}
