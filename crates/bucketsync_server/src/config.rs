//! Server configuration.

use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long an issued nonce stays valid.
    pub nonce_ttl: Duration,
    /// Maximum number of operations in one change-set.
    pub max_batch_ops: usize,
    /// Maximum notifications returned by one poll.
    pub max_poll_batch: usize,
    /// Whether unregistered buckets are created on first challenge.
    pub auto_create_buckets: bool,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            nonce_ttl: Duration::from_secs(5 * 60),
            max_batch_ops: 500,
            max_poll_batch: 1000,
            auto_create_buckets: false,
        }
    }

    /// Sets the nonce time-to-live.
    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = ttl;
        self
    }

    /// Sets the maximum operations per change-set.
    pub fn with_max_batch_ops(mut self, max: usize) -> Self {
        self.max_batch_ops = max;
        self
    }

    /// Sets the maximum notifications per poll.
    pub fn with_max_poll_batch(mut self, max: usize) -> Self {
        self.max_poll_batch = max;
        self
    }

    /// Creates buckets on first challenge instead of requiring explicit
    /// registration.
    pub fn with_auto_create_buckets(mut self, enabled: bool) -> Self {
        self.auto_create_buckets = enabled;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_batch_ops, 500);
        assert!(!config.auto_create_buckets);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_nonce_ttl(Duration::from_secs(30))
            .with_max_batch_ops(10)
            .with_auto_create_buckets(true);
        assert_eq!(config.nonce_ttl, Duration::from_secs(30));
        assert_eq!(config.max_batch_ops, 10);
        assert!(config.auto_create_buckets);
    }
}
