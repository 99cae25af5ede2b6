//! Configuration for the sync client.

use bucketsync_core::CompileConfig;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server URL.
    pub server_url: String,
    /// Encrypt payloads client-side before upload.
    pub encrypt: bool,
    /// Maximum operations per change-set.
    pub batch_size: usize,
    /// Compiler pipeline configuration.
    pub compile: CompileConfig,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Sync interval for the automatic runner.
    pub sync_interval: Option<Duration>,
    /// Deadline for each network request.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            encrypt: false,
            batch_size: 100,
            compile: CompileConfig::default(),
            retry: RetryConfig::default(),
            sync_interval: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Enables client-side encryption of payloads.
    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Sets the maximum operations per change-set.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the compiler pipeline configuration.
    pub fn with_compile(mut self, compile: CompileConfig) -> Self {
        self.compile = compile;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the sync interval for the automatic runner.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Retry policy for transient sync failures.
///
/// Waits use full jitter: each one is drawn uniformly between zero and
/// a ceiling that doubles per retry, capped at `max_wait`. Drawing the
/// whole wait at random spreads simultaneous reconnects apart instead
/// of clustering them around a shared exponential curve.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, counting the first.
    pub max_attempts: u32,
    /// Ceiling for the first retry wait.
    pub base_wait: Duration,
    /// Hard cap on any single wait.
    pub max_wait: Duration,
}

impl RetryConfig {
    /// Creates a policy allowing `max_attempts` total attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_wait: Duration::from_millis(250),
            max_wait: Duration::from_secs(30),
        }
    }

    /// A policy that tries exactly once and never waits.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Sets the ceiling for the first retry wait.
    pub fn with_base_wait(mut self, wait: Duration) -> Self {
        self.base_wait = wait;
        self
    }

    /// Sets the hard cap on any single wait.
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// The wait ceiling before the given retry (1-indexed; the first
    /// attempt is not a retry and has no wait).
    pub fn ceiling_before(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        // Saturate the shift well before Duration overflows.
        let exponent = retry.saturating_sub(1).min(20);
        self.base_wait
            .saturating_mul(1u32 << exponent)
            .min(self.max_wait)
    }

    /// Draws the actual wait before the given retry.
    pub fn wait_before(&self, retry: u32) -> Duration {
        self.ceiling_before(retry).mul_f64(rand::random::<f64>())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
