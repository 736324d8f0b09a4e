//! Workload isolation between the live gate, risk jobs and batch jobs.
//!
//! Each class draws permits from its own semaphore, so a saturated batch
//! pool never delays a live decision. Batch work also calls
//! [`ResourceGovernor::checkpoint`] between units; while the live p95 is above
//! its ceiling the checkpoint waits.

use crate::error::EngineError;
use configuration::{Config, EngineConfig};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadClass {
    Live,
    Risk,
    Batch,
}

/// Rolling p95 of live decision latencies.
#[derive(Debug)]
pub struct LatencyBreaker {
    window: usize,
    min_samples: usize,
    ceiling: Duration,
    horizon: Duration,
    samples: Mutex<VecDeque<(Instant, Duration)>>,
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[Duration], q: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

impl LatencyBreaker {
    pub fn new(window: usize, min_samples: usize, ceiling: Duration, horizon: Duration) -> Self {
        Self {
            window: window.max(1),
            min_samples,
            ceiling,
            horizon,
            samples: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    pub async fn record(&self, latency: Duration) {
        let mut samples = self.samples.lock().await;
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back((Instant::now(), latency));
    }

    /// The p95 over samples younger than the horizon, if any.
    pub async fn p95(&self) -> Option<Duration> {
        let mut samples = self.samples.lock().await;
        let now = Instant::now();
        while samples
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > self.horizon)
        {
            samples.pop_front();
        }
        if samples.len() < self.min_samples {
            return None;
        }
        let mut sorted: Vec<Duration> = samples.iter().map(|(_, latency)| *latency).collect();
        sorted.sort_unstable();
        percentile(&sorted, 0.95)
    }

    pub async fn is_open(&self) -> bool {
        self.p95().await.is_some_and(|p95| p95 > self.ceiling)
    }
}

pub struct ResourceGovernor {
    live: Arc<Semaphore>,
    risk: Arc<Semaphore>,
    batch: Arc<Semaphore>,
    breaker: LatencyBreaker,
    poll: Duration,
}

impl ResourceGovernor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            live: Arc::new(Semaphore::new(config.live_concurrency)),
            risk: Arc::new(Semaphore::new(config.risk_concurrency)),
            batch: Arc::new(Semaphore::new(config.batch_concurrency)),
            breaker: LatencyBreaker::new(
                config.latency_window,
                config.min_latency_samples,
                Duration::from_millis(config.p95_ceiling_ms),
                Duration::from_secs(config.latency_horizon_secs),
            ),
            poll: Duration::from_millis(config.breaker_poll_ms.max(1)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.engine)
    }

    fn pool(&self, class: WorkloadClass) -> &Arc<Semaphore> {
        match class {
            WorkloadClass::Live => &self.live,
            WorkloadClass::Risk => &self.risk,
            WorkloadClass::Batch => &self.batch,
        }
    }

    /// Waits for a permit of `class`. The permit is released on drop.
    pub async fn acquire(&self, class: WorkloadClass) -> Result<OwnedSemaphorePermit, EngineError> {
        let permit = Arc::clone(self.pool(class)).acquire_owned().await?;
        debug!(?class, available = self.available(class), "Workload permit acquired");
        Ok(permit)
    }

    pub fn available(&self, class: WorkloadClass) -> usize {
        self.pool(class).available_permits()
    }

    pub fn breaker(&self) -> &LatencyBreaker {
        &self.breaker
    }

    pub async fn record_live_latency(&self, latency: Duration) {
        self.breaker.record(latency).await;
    }

    /// Called by batch jobs between units of work. Returns once the latency
    /// breaker is closed.
    pub async fn checkpoint(&self) {
        if !self.breaker.is_open().await {
            return;
        }
        let started = Instant::now();
        warn!(ceiling_ms = self.breaker.ceiling.as_millis() as u64, "Live latency above ceiling, pausing batch work");
        while self.breaker.is_open().await {
            sleep(self.poll).await;
        }
        info!(paused_ms = started.elapsed().as_millis() as u64, "Live latency recovered, resuming batch work");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            latency_window: 50,
            min_latency_samples: 10,
            p95_ceiling_ms: 250,
            latency_horizon_secs: 5,
            batch_concurrency: 1,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let sorted: Vec<Duration> = (1..=20).map(Duration::from_millis).collect();
        assert_eq!(percentile(&sorted, 0.95), Some(Duration::from_millis(19)));
        assert_eq!(percentile(&sorted[..1], 0.95), Some(Duration::from_millis(1)));
        assert_eq!(percentile(&[], 0.95), None);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_needs_enough_samples() {
        let governor = ResourceGovernor::new(&config());
        for _ in 0..9 {
            governor.record_live_latency(Duration::from_millis(900)).await;
        }
        assert!(!governor.breaker().is_open().await);
        governor.record_live_latency(Duration::from_millis(900)).await;
        assert!(governor.breaker().is_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tail_opens_the_breaker() {
        let governor = ResourceGovernor::new(&config());
        for i in 0..40 {
            let ms = if i % 10 == 0 { 400 } else { 20 };
            governor.record_live_latency(Duration::from_millis(ms)).await;
        }
        // 4 of 40 samples are slow, so the 38th ranked sample is slow.
        assert_eq!(governor.breaker().p95().await, Some(Duration::from_millis(400)));
        assert!(governor.breaker().is_open().await);

        let governor = ResourceGovernor::new(&config());
        for _ in 0..40 {
            governor.record_live_latency(Duration::from_millis(30)).await;
        }
        assert!(!governor.breaker().is_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn checkpoint_waits_until_slow_samples_age_out() {
        let governor = ResourceGovernor::new(&config());
        for _ in 0..20 {
            governor.record_live_latency(Duration::from_millis(800)).await;
        }
        let started = Instant::now();
        governor.checkpoint().await;
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(!governor.breaker().is_open().await);
    }

    #[tokio::test]
    async fn classes_have_separate_pools() {
        let governor = ResourceGovernor::new(&config());
        let _batch = governor.acquire(WorkloadClass::Batch).await.unwrap();
        assert_eq!(governor.available(WorkloadClass::Batch), 0);
        assert_eq!(governor.available(WorkloadClass::Live), 64);
        let live = tokio::time::timeout(
            Duration::from_millis(100),
            governor.acquire(WorkloadClass::Live),
        )
        .await;
        assert!(matches!(live, Ok(Ok(_))));
    }
}
