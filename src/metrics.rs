//! Runtime counters.
//!
//! Prometheus metrics for detection and resolution passes, kept in a
//! private [`Registry`] that the host process can render or merge into its
//! own exposition endpoint.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::CoreError;
use crate::models::{Conflict, FallbackReason, Provenance};

/// Detection and resolution metrics.
#[derive(Debug, Clone)]
pub struct CoreMetrics {
    /// Conflicts found by resolution passes, by kind.
    pub conflicts_detected_total: IntCounterVec,
    /// Conflicts cleared by a commit, by provenance.
    pub conflicts_resolved_total: IntCounterVec,
    pub optimization_requests_total: IntCounter,
    /// Committed passes, by provenance and fallback reason ("none" when the
    /// solver answer was used).
    pub optimization_success_total: IntCounterVec,
    /// Failed passes, by error kind.
    pub optimization_failures_total: IntCounterVec,
    pub optimization_duration: Histogram,

    registry: Registry,
}

impl CoreMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let conflicts_detected_total = IntCounterVec::new(
            Opts::new("conflicts_detected_total", "Total number of conflicts detected"),
            &["kind"],
        )?;
        let conflicts_resolved_total = IntCounterVec::new(
            Opts::new("conflicts_resolved_total", "Total number of conflicts resolved"),
            &["provenance"],
        )?;
        let optimization_requests_total = IntCounter::with_opts(Opts::new(
            "optimization_requests_total",
            "Total number of resolution requests",
        ))?;
        let optimization_success_total = IntCounterVec::new(
            Opts::new(
                "optimization_success_total",
                "Total number of committed resolution passes",
            ),
            &["provenance", "fallback"],
        )?;
        let optimization_failures_total = IntCounterVec::new(
            Opts::new(
                "optimization_failures_total",
                "Total number of failed resolution passes",
            ),
            &["reason"],
        )?;
        let optimization_duration = Histogram::with_opts(HistogramOpts::new(
            "optimization_duration_seconds",
            "Resolution pass duration",
        ))?;

        registry.register(Box::new(conflicts_detected_total.clone()))?;
        registry.register(Box::new(conflicts_resolved_total.clone()))?;
        registry.register(Box::new(optimization_requests_total.clone()))?;
        registry.register(Box::new(optimization_success_total.clone()))?;
        registry.register(Box::new(optimization_failures_total.clone()))?;
        registry.register(Box::new(optimization_duration.clone()))?;

        Ok(Self {
            conflicts_detected_total,
            conflicts_resolved_total,
            optimization_requests_total,
            optimization_success_total,
            optimization_failures_total,
            optimization_duration,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Counts detected conflicts by kind.
    pub fn record_detected(&self, conflicts: &[Conflict]) {
        for conflict in conflicts {
            self.conflicts_detected_total
                .with_label_values(&[conflict.kind.label()])
                .inc();
        }
    }

    pub fn record_request(&self) {
        self.optimization_requests_total.inc();
    }

    /// Records a committed pass.
    pub fn record_success(
        &self,
        provenance: Provenance,
        fallback: Option<&FallbackReason>,
        conflicts_resolved: usize,
        duration_seconds: f64,
    ) {
        let provenance = match provenance {
            Provenance::Solver => "solver",
            Provenance::Heuristic => "heuristic",
        };
        let fallback = fallback.map_or("none", FallbackReason::label);
        self.optimization_success_total
            .with_label_values(&[provenance, fallback])
            .inc();
        self.conflicts_resolved_total
            .with_label_values(&[provenance])
            .inc_by(conflicts_resolved as u64);
        self.optimization_duration.observe(duration_seconds);
    }

    /// Records a pass that ended in an error.
    pub fn record_failure(&self, error: &CoreError, duration_seconds: f64) {
        self.optimization_failures_total
            .with_label_values(&[error.label()])
            .inc();
        self.optimization_duration.observe(duration_seconds);
    }

    /// Text exposition of every metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictKind, TimeWindow, TrainPriority};

    fn conflict(kind: ConflictKind) -> Conflict {
        Conflict::new(
            kind,
            "SEC01",
            &[("A", TrainPriority::Express), ("B", TrainPriority::Freight)],
            TimeWindow::new(0, 1),
            0,
        )
    }

    #[test]
    fn test_counters_split_by_label() {
        let metrics = CoreMetrics::new().unwrap();
        metrics.record_detected(&[
            conflict(ConflictKind::HeadwayViolation),
            conflict(ConflictKind::HeadwayViolation),
            conflict(ConflictKind::CapacityExceeded),
        ]);
        metrics.record_request();
        metrics.record_success(Provenance::Heuristic, Some(&FallbackReason::Timeout), 3, 0.2);
        metrics.record_failure(&CoreError::Validation("bad".into()), 0.1);

        let detected = |kind: &str| {
            metrics
                .conflicts_detected_total
                .with_label_values(&[kind])
                .get()
        };
        assert_eq!(detected("headway"), 2);
        assert_eq!(detected("capacity"), 1);
        assert_eq!(metrics.optimization_requests_total.get(), 1);
        assert_eq!(
            metrics
                .optimization_success_total
                .with_label_values(&["heuristic", "timeout"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .conflicts_resolved_total
                .with_label_values(&["heuristic"])
                .get(),
            3
        );
        assert_eq!(
            metrics
                .optimization_failures_total
                .with_label_values(&["validation"])
                .get(),
            1
        );
        assert_eq!(metrics.optimization_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_render_exposes_registered_metrics() {
        let metrics = CoreMetrics::new().unwrap();
        metrics.record_request();
        metrics.record_success(Provenance::Solver, None, 1, 0.05);

        let text = metrics.render().unwrap();
        assert!(text.contains("optimization_requests_total 1"));
        assert!(text.contains("optimization_success_total"));
        assert!(text.contains("fallback=\"none\""));
        assert!(text.contains("optimization_duration_seconds_count 1"));
    }
}
