//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered provider
//! - Record probe outcomes like live attempts
//! - Publish a health snapshot per provider

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::engine::{FallbackEngine, ProbeResult};
use crate::observability::{metrics, StatsEvent};

pub struct HealthMonitor {
    engine: Arc<FallbackEngine>,
    enabled: bool,
    interval: Duration,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(engine: Arc<FallbackEngine>, config: &HealthCheckConfig) -> Self {
        Self {
            engine,
            enabled: config.enabled,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe all providers once. Returns the probes that completed.
    pub async fn check_all(&self) -> usize {
        let entries = self.engine.registry().entries();
        // Never let a probe outlive its round.
        let timeout = self.timeout.min(self.interval);

        let results = join_all(entries.iter().map(|entry| self.engine.probe(entry, timeout))).await;

        let now = Instant::now();
        let mut completed = 0;
        for (entry, result) in entries.iter().zip(results) {
            match result {
                ProbeResult::Completed(outcome) => {
                    completed += 1;
                    if !outcome.is_success() {
                        tracing::warn!(provider = %entry.id(), outcome = outcome.as_str(), "Health probe failed");
                    }
                }
                ProbeResult::Skipped(reason) => {
                    tracing::debug!(provider = %entry.id(), reason = ?reason, "Health probe skipped");
                }
            }

            let stats = entry.stats(now);
            metrics::record_provider_health(entry.id().as_str(), stats.is_healthy());
            self.engine.sink().record(&StatsEvent::Health(&stats));
        }
        completed
    }
}
