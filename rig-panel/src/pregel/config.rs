//! Pregel runtime configuration
//!
//! Parallelism, timeouts, checkpoint cadence and retry policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pregel runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PregelConfig {
    /// Maximum supersteps before forced termination
    pub max_supersteps: usize,

    /// Maximum concurrent vertex computations
    pub parallelism: usize,

    /// Checkpoint frequency (every N supersteps, 0 = disabled)
    pub checkpoint_interval: usize,

    #[serde(with = "humantime_serde")]
    pub vertex_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub workflow_timeout: Duration,

    pub retry_policy: RetryPolicy,
}

impl Default for PregelConfig {
    fn default() -> Self {
        Self {
            max_supersteps: 100,
            parallelism: num_cpus::get(),
            checkpoint_interval: 10,
            vertex_timeout: Duration::from_secs(300),
            workflow_timeout: Duration::from_secs(3600),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl PregelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_supersteps(mut self, max: usize) -> Self {
        self.max_supersteps = max;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set checkpoint interval (0 to disable periodic checkpoints)
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_vertex_timeout(mut self, timeout: Duration) -> Self {
        self.vertex_timeout = timeout;
        self
    }

    pub fn with_workflow_timeout(mut self, timeout: Duration) -> Self {
        self.workflow_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn checkpointing_enabled(&self) -> bool {
        self.checkpoint_interval > 0
    }

    /// Whether a periodic checkpoint is due after `superstep`
    pub fn should_checkpoint(&self, superstep: usize) -> bool {
        self.checkpointing_enabled() && superstep > 0 && superstep % self.checkpoint_interval == 0
    }
}

/// Retry policy for failed vertex computations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: usize,

    /// Base delay for exponential backoff
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Upper bound for a single backoff delay
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    /// Exponential backoff delay for the given attempt, capped at `backoff_max`
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        self.backoff_base.saturating_mul(multiplier).min(self.backoff_max)
    }

    pub fn should_retry(&self, attempts: usize) -> bool {
        attempts < self.max_retries
    }

    /// Fail on the first error
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PregelConfig::default();
        assert_eq!(config.max_supersteps, 100);
        assert!(config.parallelism > 0);
        assert_eq!(config.checkpoint_interval, 10);
    }

    #[test]
    fn test_config_builder() {
        let config = PregelConfig::default()
            .with_max_supersteps(50)
            .with_parallelism(4)
            .with_checkpoint_interval(1);

        assert_eq!(config.max_supersteps, 50);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.checkpoint_interval, 1);
    }

    #[test]
    fn test_parallelism_minimum() {
        let config = PregelConfig::default().with_parallelism(0);
        assert_eq!(config.parallelism, 1);
    }

    #[test]
    fn test_should_checkpoint() {
        let config = PregelConfig::default().with_checkpoint_interval(5);

        assert!(!config.should_checkpoint(0));
        assert!(!config.should_checkpoint(1));
        assert!(config.should_checkpoint(5));
        assert!(config.should_checkpoint(10));
        assert!(!config.should_checkpoint(7));

        let disabled = config.with_checkpoint_interval(0);
        assert!(!disabled.checkpointing_enabled());
        assert!(!disabled.should_checkpoint(5));
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        let policy = RetryPolicy::new(5)
            .with_backoff_base(Duration::from_millis(100))
            .with_backoff_max(Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.should_retry(0));
        assert!(RetryPolicy::new(2).should_retry(1));
        assert!(!RetryPolicy::new(2).should_retry(2));
    }

    #[test]
    fn test_config_serde_durations() {
        let config = PregelConfig::default().with_vertex_timeout(Duration::from_secs(90));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("1m 30s"));

        let back: PregelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vertex_timeout, Duration::from_secs(90));
    }
}
