//! # Oddsmith Core Types
//!
//! Layer 0 data structures shared by every crate in the workspace: gene
//! vectors and DNA, normalized match records, search candidates, stress
//! results, the strategy lifecycle and the decision trace vocabulary.

pub mod candidate;
pub mod enums;
pub mod error;
#[cfg(feature = "fixtures")]
pub mod fixtures;
pub mod genes;
pub mod records;
pub mod snapshot;
pub mod strategy;
pub mod stress;
pub mod trace;

// Re-export the core types to provide a clean public API.
pub use candidate::{derive_seed, Candidate, FitnessTerms, Lineage};
pub use enums::{
    Archetype, Cadence, DecisionPath, Outcome, SearchMode, SnapshotSource, StrategyStatus,
    VolatilityRegime,
};
pub use error::CoreError;
pub use genes::{Dna, GeneRange, GeneRanges, GeneVector, MarketId};
pub use records::{MatchRecord, OutcomeTriple};
pub use snapshot::{CalibrationBucket, CalibrationSnapshot, SnapshotOrigin};
pub use strategy::{
    ActiveState, ArchivedState, Lifecycle, MarketOverride, OptimizationNotes, ShadowState,
    Strategy, TipOutcome, TransitionAudit, TransitionReason,
};
pub use stress::{Rescue, StressCheck, StressResult, StressStage};
pub use trace::{
    DecisionOutcome, DecisionTrace, GateStage, InferenceStatus, ReasonCode, SanityField,
    SignalPayload, StageMetrics, StageRecord, StageVerdict,
};
