//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every adapter in the pool
//! - Feed results into the pool, which replaces unhealthy active adapters

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::config::HealthCheckConfig;
use crate::lifecycle::RepeatingTask;
use crate::provider::pool::ProviderPool;

pub struct HealthMonitor {
    pool: Arc<ProviderPool>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(pool: Arc<ProviderPool>, config: HealthCheckConfig) -> Self {
        Self { pool, config }
    }

    /// Start probing on a repeating task. Returns `None` when disabled.
    pub fn start(self: Arc<Self>) -> Option<RepeatingTask> {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return None;
        }

        tracing::info!(interval = self.config.interval_secs, "Health monitor starting");
        let mut task = RepeatingTask::new("health-monitor");
        let monitor = self.clone();
        task.start(Duration::from_secs(self.config.interval_secs), move || {
            let monitor = monitor.clone();
            async move { monitor.check_all().await }
        });
        Some(task)
    }

    /// Probe every record once with a block number query.
    pub async fn check_all(&self) {
        let timeout = Duration::from_secs(self.config.timeout_secs);

        for record in self.pool.records() {
            let adapter = record.adapter();
            let healthy = match time::timeout(timeout, adapter.block_number()).await {
                Ok(Ok(block)) => {
                    tracing::trace!(provider = %record.name, block, "Health probe ok");
                    true
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = %record.name, error = %e, "Health probe failed");
                    false
                }
                Err(_) => {
                    tracing::warn!(provider = %record.name, "Health probe timed out");
                    false
                }
            };
            self.pool.report_probe(&record, healthy);
        }
    }
}
