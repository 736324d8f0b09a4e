//! # Oddsmith Time-Machine
//!
//! Replays outcome history in calendar-month windows and writes
//! point-in-time calibration snapshots, one per market per monthly anchor.
//!
//! ## Architectural Principles
//!
//! - **Gap-free:** Every anchor of the lookback gets a snapshot. Anchors a
//!   quarterly pass does not compute are carried forward from the nearest
//!   prior direct snapshot and tagged as such.
//! - **Isolated workers:** Markets share nothing. Each is computed on a
//!   dedicated rayon pool from its own history and produces its own records;
//!   `sequential` runs them one at a time for debugging.
//! - **Retroactive only:** Reruns delete the retroactive snapshots of the
//!   targeted markets, and finish doing so before any worker starts. Live
//!   snapshots are never touched.
//!
//! ## Public API
//!
//! - `TimeMachine`: The runner.
//! - `TimeMachineRequest` / `TimeMachineReport`: One invocation and its summary.
//! - `build_market_snapshots`: The pure per-market computation.

pub mod anchors;
pub mod error;
pub mod snapshot;

pub use error::TimeMachineError;
pub use snapshot::{SnapshotParams, carry_forward, compute_snapshot};

use anchors::{is_direct, monthly_anchors, months_before, resolve_cadence};
use chrono::{DateTime, NaiveDate, Utc};
use configuration::{Config, FitnessConfig, TimeMachineConfig};
use core_types::{Cadence, CalibrationSnapshot, MarketId, MatchRecord, SnapshotOrigin};
use database::{OutcomeSource, SnapshotStore};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

/// One time-machine invocation.
#[derive(Debug, Clone)]
pub struct TimeMachineRequest {
    pub markets: Vec<MarketId>,
    /// The last anchor is the first day of this date's month.
    pub as_of: NaiveDate,
    /// Overrides the configured cadence for this run.
    pub cadence: Option<Cadence>,
    pub rerun: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketReport {
    pub market: MarketId,
    pub cadence: Cadence,
    pub records: usize,
    pub direct: usize,
    pub carried_forward: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeMachineReport {
    pub cleared: u64,
    pub first_anchor: NaiveDate,
    pub last_anchor: NaiveDate,
    pub markets: Vec<MarketReport>,
}

/// Snapshots for every anchor of one market, oldest first.
pub fn build_market_snapshots(
    market: &MarketId,
    records: &[MatchRecord],
    anchors: &[NaiveDate],
    cadence: Cadence,
    params: &SnapshotParams,
) -> Result<Vec<CalibrationSnapshot>, TimeMachineError> {
    let mut snapshots: Vec<CalibrationSnapshot> = Vec::with_capacity(anchors.len());
    let mut last_direct: Option<usize> = None;
    for (index, &anchor) in anchors.iter().enumerate() {
        let snapshot = match last_direct {
            Some(source) if !is_direct(anchor, index, cadence) => {
                carry_forward(&snapshots[source], anchor, cadence, params)?
            }
            _ => {
                last_direct = Some(index);
                compute_snapshot(market, anchor, records, cadence, params)?
            }
        };
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}

/// The work handed to one market worker.
struct MarketJob {
    market: MarketId,
    records: Vec<MatchRecord>,
    cadence: Cadence,
}

/// What one market worker produced.
struct MarketRun {
    market: MarketId,
    cadence: Cadence,
    records: usize,
    snapshots: Vec<CalibrationSnapshot>,
}

#[derive(Debug, Clone)]
pub struct TimeMachine {
    config: TimeMachineConfig,
    fitness: FitnessConfig,
}

impl TimeMachine {
    pub fn new(config: TimeMachineConfig, fitness: FitnessConfig) -> Self {
        Self { config, fitness }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.time_machine.clone(), config.fitness.clone())
    }

    pub fn config(&self) -> &TimeMachineConfig {
        &self.config
    }

    fn params(&self, computed_at: DateTime<Utc>) -> SnapshotParams {
        SnapshotParams {
            window_months: self.config.window_months,
            decay_floor: self.fitness.decay_floor,
            ece_buckets: self.fitness.ece_buckets,
            ece_min_bucket_n: self.fitness.ece_min_bucket_n,
            script_version: self.config.script_version.clone(),
            computed_at,
        }
    }

    fn progress_bar(&self, len: usize, show: bool) -> Result<ProgressBar, TimeMachineError> {
        if !show {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} markets ({eta}) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(bar)
    }

    /// Runs the time-machine for the requested markets and persists the
    /// snapshots.
    pub async fn run<S>(
        &self,
        store: &S,
        request: &TimeMachineRequest,
    ) -> Result<TimeMachineReport, TimeMachineError>
    where
        S: SnapshotStore + OutcomeSource,
    {
        if request.markets.is_empty() {
            return Err(TimeMachineError::NoMarkets);
        }
        let anchors = monthly_anchors(request.as_of, self.config.lookback_years)?;
        let (Some(&first_anchor), Some(&last_anchor)) = (anchors.first(), anchors.last()) else {
            return Err(TimeMachineError::DateError("empty anchor range".to_string()));
        };

        // Cleanup is awaited in full before any worker is spawned.
        let cleared = if request.rerun {
            let cleared = store.clear_retroactive(&request.markets).await?;
            info!(markets = request.markets.len(), cleared, "Cleared retroactive snapshots");
            cleared
        } else {
            0
        };

        let from = months_before(first_anchor, self.config.window_months)?;
        let mut jobs = Vec::with_capacity(request.markets.len());
        for market in &request.markets {
            let has_prior = !store.snapshots(market).await?.is_empty();
            let cadence = resolve_cadence(
                request.cadence.unwrap_or(self.config.cadence),
                has_prior,
            );
            let records = store
                .fetch_history(market, midnight(from), midnight(last_anchor))
                .await?;
            debug!(market = %market, records = records.len(), ?cadence, "Loaded history");
            jobs.push(MarketJob {
                market: market.clone(),
                records,
                cadence,
            });
        }

        info!(
            markets = jobs.len(),
            anchors = anchors.len(),
            %first_anchor,
            %last_anchor,
            sequential = self.config.sequential,
            "Starting time-machine"
        );

        let params = self.params(Utc::now());
        let progress = self.progress_bar(jobs.len(), request.show_progress)?;
        let runner = self.clone();
        let worker_progress = progress.clone();
        let results = tokio::task::spawn_blocking(move || {
            runner.compute_all(jobs, &anchors, &params, &worker_progress)
        })
        .await
        .map_err(|e| TimeMachineError::Join(e.to_string()))??;
        progress.finish_and_clear();

        let mut reports = Vec::with_capacity(results.len());
        for run in results {
            store.save_snapshots(&run.snapshots).await?;
            let direct = run
                .snapshots
                .iter()
                .filter(|s| s.origin == SnapshotOrigin::Direct)
                .count();
            let carried_forward = run.snapshots.len() - direct;
            info!(market = %run.market, direct, carried_forward, "Saved calibration snapshots");
            reports.push(MarketReport {
                market: run.market,
                cadence: run.cadence,
                records: run.records,
                direct,
                carried_forward,
            });
        }

        Ok(TimeMachineReport {
            cleared,
            first_anchor,
            last_anchor,
            markets: reports,
        })
    }

    /// Computes every market, in parallel unless configured sequential.
    /// Results come back in request order.
    fn compute_all(
        &self,
        jobs: Vec<MarketJob>,
        anchors: &[NaiveDate],
        params: &SnapshotParams,
        progress: &ProgressBar,
    ) -> Result<Vec<MarketRun>, TimeMachineError> {
        let work = |job: &MarketJob| -> Result<MarketRun, TimeMachineError> {
            let snapshots =
                build_market_snapshots(&job.market, &job.records, anchors, job.cadence, params)?;
            progress.inc(1);
            Ok(MarketRun {
                market: job.market.clone(),
                cadence: job.cadence,
                records: job.records.len(),
                snapshots,
            })
        };

        if self.config.sequential {
            return jobs.iter().map(work).collect();
        }

        let workers = if self.config.workers == 0 {
            num_cpus::get()
        } else {
            self.config.workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| TimeMachineError::ThreadPool(e.to_string()))?;
        pool.install(|| jobs.par_iter().map(work).collect())
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
