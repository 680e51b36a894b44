//! Configuration for the sync engine.

use crate::scheduler::NetworkQuality;
use std::time::Duration;

/// Tunable parameters for the sync engine and scheduler.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device name for logging/identification.
    pub device_name: String,
    /// Per-call transport timeout.
    pub request_timeout: Duration,
    /// Failed-delivery attempts before an operation surfaces as a
    /// user-visible failure (it stays queued for manual retry).
    pub retry_ceiling: u32,
    /// Optional cap on queued operations.
    pub queue_capacity: Option<usize>,
    /// Periodic pass interval on a slow network.
    pub slow_interval: Duration,
    /// Periodic pass interval on a medium network.
    pub medium_interval: Duration,
    /// Periodic pass interval on a fast network.
    pub fast_interval: Duration,
}

impl SyncConfig {
    /// The periodic pass interval for a network-quality bucket.
    /// Slower networks get longer periods to avoid wasted retries.
    #[must_use]
    pub fn interval_for(&self, quality: NetworkQuality) -> Duration {
        match quality {
            NetworkQuality::Slow => self.slow_interval,
            NetworkQuality::Medium => self.medium_interval,
            NetworkQuality::Fast => self.fast_interval,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_name: "FieldSync Device".to_string(),
            request_timeout: Duration::from_secs(30),
            retry_ceiling: 4,
            queue_capacity: None,
            slow_interval: Duration::from_secs(300),
            medium_interval: Duration::from_secs(120),
            fast_interval: Duration::from_secs(30),
        }
    }
}
