use std::time::Duration;

use thiserror::Error;

/// Knobs for a single batch run.
///
/// `concurrency` is the only admission-control knob: at most that many
/// fetch+extract tasks run at any moment. `request_timeout` bounds each
/// individual fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub request_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        // Sized for low-memory hosts; raise for beefier machines.
        Self {
            concurrency: 8,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

impl PoolConfig {
    pub fn new(concurrency: usize, request_timeout: Duration) -> Self {
        Self {
            concurrency,
            request_timeout,
        }
    }

    /// Reject an unusable configuration before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
