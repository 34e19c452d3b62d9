//! HTTP/JSON client for the external optimization service.
//!
//! # Reconnect policy
//! Every unreachable-service failure doubles the wait before the next
//! attempt (from `backoff_base_ms` up to `backoff_max_ms`), with random
//! jitter over the upper half of the delay. While the wait runs, `solve`
//! fails fast with [`SolverError::Unavailable`] so the orchestrator falls
//! back without paying a connect timeout on every pass.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::wire::{self, WireRequest, WireResponse};
use super::ScheduleSolver;
use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::models::{OptimizationRequest, OptimizationResponse};

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
            retry_at: None,
        }
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay ceiling for the next failure, before jitter.
    pub fn next_delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failures.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Records a failure at `now`; returns the wait before the next attempt.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        let ceiling = self.next_delay();
        let half = ceiling / 2;
        let jitter_ms = rand::rng().random_range(0..=half.as_millis() as u64);
        let delay = half + Duration::from_millis(jitter_ms);

        self.failures = self.failures.saturating_add(1);
        self.retry_at = Some(now + delay);
        delay
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }

    /// Time left before another attempt is allowed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.retry_at
            .filter(|at| *at > now)
            .map(|at| at.duration_since(now))
    }
}

/// Remote solver over HTTP/JSON.
#[derive(Debug)]
pub struct RemoteSolver {
    client: reqwest::Client,
    endpoint: String,
    backoff: Mutex<Backoff>,
}

impl RemoteSolver {
    /// Creates a client for `endpoint` (base URL).
    pub fn new(endpoint: impl Into<String>, config: &SolverConfig) -> Result<Self, SolverError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SolverError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            backoff: Mutex::new(Backoff::new(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            )),
        })
    }

    /// Client for the configured endpoint, if one is set.
    pub fn from_config(config: &SolverConfig) -> Result<Option<Self>, SolverError> {
        config
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, config))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self) -> String {
        format!("{}/optimize", self.endpoint.trim_end_matches('/'))
    }

    fn backoff(&self) -> std::sync::MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, body: &WireRequest) -> Result<WireResponse, SolverError> {
        let response = self
            .client
            .post(self.url())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SolverError::Unavailable(e.to_string())
                } else {
                    SolverError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SolverError::Unavailable(format!("service returned {status}")));
        }
        if !status.is_success() {
            return Err(SolverError::Protocol(format!("service returned {status}")));
        }
        response
            .json::<WireResponse>()
            .await
            .map_err(|e| SolverError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl ScheduleSolver for RemoteSolver {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn solve(&self, request: &OptimizationRequest) -> Result<OptimizationResponse, SolverError> {
        let waiting = self.backoff().remaining(Instant::now());
        if let Some(wait) = waiting {
            return Err(SolverError::Unavailable(format!(
                "reconnecting in {} ms",
                wait.as_millis()
            )));
        }

        let body = wire::encode_request(request)?;
        debug!(
            request_id = %request.request_id,
            section = %request.section_id,
            trains = body.trains.len(),
            "sending optimization request"
        );

        match self.send(&body).await {
            Ok(response) => {
                self.backoff().record_success();
                wire::decode_response(response, request)
            }
            Err(e @ (SolverError::Unavailable(_) | SolverError::Transport(_))) => {
                let mut backoff = self.backoff();
                let delay = backoff.record_failure(Instant::now());
                warn!(
                    endpoint = %self.endpoint,
                    failures = backoff.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "solver unreachable, backing off"
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
