//! # Oddsmith Analytics
//!
//! The Fitness Evaluator and the statistical math it rests on. It acts as
//! the "unbiased judge" of every DNA the search proposes.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of
//!   external systems.
//! - **Stateless Calculation:** `FitnessEvaluator` holds only constants. It
//!   takes a DNA and a historical window and produces an `Evaluation`, so it
//!   is safe to share across worker threads.
//!
//! ## Public API
//!
//! - `FitnessEvaluator`: Simulation, aggregation and the weighted fitness.
//! - `Evaluation` / `SettledBet`: The aggregate terms and the per-bet ledger.
//! - `expected_calibration_error`: Smoothed ECE, shared with the time-machine.
//! - `PopulationContext`: What the complexity penalty compares against.
//! - `stats`: Percentiles, ranks, correlation and drawdown helpers.

// Declare the modules that constitute this crate.
pub mod calibration;
pub mod complexity;
pub mod engine;
pub mod error;
pub mod report;
pub mod stats;

// Re-export the key components to create a clean, public-facing API.
pub use calibration::{CalibrationReport, CalibrationSample, expected_calibration_error};
pub use complexity::{
    ComplexityPenalty, LinkedPair, PopulationContext, complexity_penalty, normalized_flat,
};
pub use engine::{FitnessEvaluator, decay_weight};
pub use error::AnalyticsError;
pub use report::{Evaluation, FitnessBreakdown, SettledBet};
