//! Adapter configuration
//!
//! Passed explicitly to every component that needs it. Deserializable so it
//! can come from a file or environment layer owned by the caller; every
//! field has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AdapterError, AdapterResult};

/// What a paginated fetch does when it runs out of page budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLimitMode {
    /// Fail with `DQ_SCAN_PAGE_LIMIT`
    #[default]
    Throw,
    /// Keep paging until the store reports no continuation token
    Unbounded,
}

/// Backoff settings for transient store failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per request, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound on any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Retry settings with no sleeping, for tests and local stores
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Top-level adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Page budget for a single query or scan
    pub max_pages: usize,
    /// Behavior when the page budget is exhausted
    pub page_limit_mode: PageLimitMode,
    /// Cardinality cap for one-to-many joins without an explicit limit
    pub default_join_limit: usize,
    /// Retry settings for transient failures and unprocessed keys
    pub retry: RetryConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            page_limit_mode: PageLimitMode::Throw,
            default_join_limit: 100,
            retry: RetryConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Parse a configuration from JSON, filling in defaults, then validate it.
    pub fn from_json(raw: &str) -> AdapterResult<Self> {
        let config: AdapterConfig = serde_json::from_str(raw)
            .map_err(|e| AdapterError::config_invalid(format!("Malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AdapterResult<()> {
        if self.max_pages == 0 {
            return Err(AdapterError::config_invalid("max_pages must be positive"));
        }
        if self.default_join_limit == 0 {
            return Err(AdapterError::config_invalid(
                "default_join_limit must be positive",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AdapterError::config_invalid(
                "retry.max_attempts must be positive",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(AdapterError::config_invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AdapterErrorCode;

    #[test]
    fn test_defaults_are_valid() {
        let config = AdapterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_limit_mode, PageLimitMode::Throw);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            AdapterConfig::from_json(r#"{"page_limit_mode": "unbounded", "retry": {"max_attempts": 2}}"#)
                .unwrap();
        assert_eq!(config.page_limit_mode, PageLimitMode::Unbounded);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 50);
        assert_eq!(config.max_pages, 100);
    }

    #[test]
    fn test_zero_pages_rejected() {
        let err = AdapterConfig::from_json(r#"{"max_pages": 0}"#).unwrap_err();
        assert_eq!(err.code(), AdapterErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(800));
        assert_eq!(retry.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(retry.delay_for(63), Duration::from_millis(1_000));
    }
}
