//! # Oddsmith Database Crate
//!
//! Persistence for strategies, lifecycle audits, decision traces,
//! calibration snapshots, the versioned policy and market overrides.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** Components depend on the store traits in [`store`],
//!   never on SQL. `DbRepository` implements them over PostgreSQL;
//!   `MemoryRepository` implements them in process for tests and dry runs.
//! - **Append-only history:** Strategies are inserted once. Only their
//!   lifecycle and running tallies change afterwards, through versioned
//!   conditional writes that fail with `StoreError::Conflict` when another
//!   writer got there first.
//! - **Asynchronous & Pooled:** All operations are asynchronous, and the
//!   PostgreSQL adapter uses a connection pool (`PgPool`).
//!
//! ## Public API
//!
//! - `connect`: The async function to establish the database connection pool.
//! - `run_migrations`: Applies the embedded schema migrations.
//! - `StrategyStore`, `TraceStore`, `SnapshotStore`, `PolicyStore`,
//!   `OverrideStore`, `OutcomeSource`: The persistence contracts.
//! - `DbRepository` / `MemoryRepository`: The two adapters.
//! - `StoreError` / `SourceError`: Storage failures and external-data failures.

pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

pub use connection::{connect, run_migrations};
pub use error::{SourceError, StoreError};
pub use memory::MemoryRepository;
pub use repository::DbRepository;
pub use store::{
    LifecycleChange, OutcomeSource, OverrideStore, PolicyAudit, PolicyStore, Repository,
    SnapshotStore, StrategyStore, TraceStore,
};
