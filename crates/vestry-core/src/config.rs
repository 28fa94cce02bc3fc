//! Engine configuration

use std::time::Duration;

use crate::queue::BackoffConfig;

/// Configuration for an [`crate::engine::OfflineEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// REST API base URL, e.g. `https://api.vestry.app`
    pub api_base_url: String,
    /// Bearer token attached to every delivery, when present
    pub auth_token: Option<String>,
    /// Automatic sync interval (`None` = manual and reconnect triggers only)
    pub sync_interval: Option<Duration>,
    /// Retry scheduling for failed deliveries
    pub backoff: BackoffConfig,
    /// Retention window for unmodified cached records
    pub cache_ttl: Duration,
    /// Soft storage quota used for usage reporting
    pub storage_limit_bytes: u64,
    /// Per-request timeout applied by the bundled HTTP transport
    pub request_timeout: Duration,
}

impl EngineConfig {
    /// Create a configuration with production defaults.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            auth_token: None,
            sync_interval: Some(Duration::from_secs(60)),
            backoff: BackoffConfig::default(),
            cache_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            storage_limit_bytes: 64 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Attach a bearer token to deliveries.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the automatic sync interval.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable automatic sync (manual and reconnect triggers only).
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    /// Override retry scheduling.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the retention window for unmodified cached records.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Override the soft storage quota.
    #[must_use]
    pub const fn with_storage_limit(mut self, bytes: u64) -> Self {
        self.storage_limit_bytes = bytes;
        self
    }

    /// Override the per-request timeout of the bundled HTTP transport.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
