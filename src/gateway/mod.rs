//! Solver gateway.
//!
//! [`ScheduleSolver`] is the seam between the orchestrator and whatever
//! produces revised schedules. Two implementations ship with the crate:
//!
//! - [`RemoteSolver`]: HTTP/JSON client for an external optimization
//!   service, with bounded exponential reconnect backoff.
//! - [`HeuristicSolver`](crate::scheduler::HeuristicSolver): the in-process
//!   greedy fallback.
//!
//! Solvers receive a detached [`OptimizationRequest`] and never touch the
//! state store; the orchestrator validates every answer before commit.

mod remote;
pub mod wire;

pub use remote::{Backoff, RemoteSolver};

use async_trait::async_trait;

use crate::error::SolverError;
use crate::models::{OptimizationRequest, OptimizationResponse};

/// Something that can propose a schedule for one section.
#[async_trait]
pub trait ScheduleSolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Solves one request.
    ///
    /// A response with `success == false` is a declined solve, not an error.
    async fn solve(&self, request: &OptimizationRequest) -> Result<OptimizationResponse, SolverError>;
}
