//! # Oddsmith Engine
//!
//! The live runtime: it emits decisions through the shared gate, books
//! settled tips, sweeps active strategies for drift, and keeps batch work
//! from starving the live path.
//!
//! ## Architectural Principles
//!
//! - **Same Gate As Replay:** `LiveDecisionService` builds the same
//!   `GateInput` the backtester does, differing only in the decision path
//!   and in where the point-in-time context comes from.
//! - **Bounded External Calls:** Market inference runs under a timeout and
//!   degrades to `TimedOut` / `Unavailable`, which the gate's policy modes
//!   resolve. Context fetches retry transient failures only.
//! - **Workload Isolation:** `ResourceGovernor` keeps separate permit pools
//!   for live, risk and batch work and pauses batch checkpoints while the
//!   live p95 latency is above its ceiling.
//!
//! ## Public API
//!
//! - `LiveDecisionService`: Live decisions and tip settlement.
//! - `DriftMonitor`: The periodic drift sweep.
//! - `ResourceGovernor`, `WorkloadClass`, `LatencyBreaker`: Workload isolation.
//! - `MatchContextSource`, `MarketInference`: External collaborators.
//! - `with_retry`: Transient-only retry with exponential backoff.

pub mod drift;
pub mod error;
pub mod governor;
pub mod live;
pub mod retry;

pub use drift::{DriftMonitor, DriftSweep};
pub use error::EngineError;
pub use governor::{LatencyBreaker, ResourceGovernor, WorkloadClass};
pub use live::{LiveDecisionService, MarketInference, MatchContextSource};
pub use retry::with_retry;
