// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client configuration.
//!
//! One explicit value type with defaulted fields and a fail-fast validating
//! constructor. Validation runs once at client construction; the rest of the
//! pipeline consumes the configuration read-only.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::Error;

/// Configuration for the Loki client.
///
/// All limits are consumed read-only by the buffer and transport. Construct
/// with [`LokiConfig::new`] and adjust fields as needed, then hand it to
/// [`crate::Loki::new`], which validates it.
///
/// # Example
///
/// ```rust
/// use loki_client::LokiConfig;
/// use std::time::Duration;
///
/// let mut config = LokiConfig::new("http://localhost:3100");
/// config.app = "checkout".to_string();
/// config.batch_size = 500;
/// config.flush_interval = Duration::from_secs(2);
/// ```
#[derive(Debug, Clone)]
pub struct LokiConfig {
    /// Base URL of the Loki instance (e.g., "http://localhost:3100").
    /// The push path is appended by the transport.
    pub endpoint: String,
    /// Value of the `app` label attached to every stream.
    pub app: String,
    /// Value of the `env` label attached to every stream.
    pub environment: String,
    /// Number of pending entries that triggers an immediate send.
    pub batch_size: usize,
    /// Interval of the background flush task.
    pub flush_interval: Duration,
    /// Maximum number of pending entries; appends beyond this are dropped.
    pub max_buffer_size: usize,
    /// Byte budget for a single wire payload (uncompressed).
    pub max_batch_bytes: usize,
    /// Maximum retry attempts per failed batch. Zero disables retries:
    /// failed entries are dropped immediately.
    pub max_retries: u32,
    /// Base backoff delay; attempt k waits `retry_backoff * 2^k`.
    pub retry_backoff: Duration,
    /// Request timeout, also bounds how long `stop` waits for the
    /// background task.
    pub timeout: Duration,
    /// Gzip-compress request bodies and set `Content-Encoding: gzip`.
    pub gzip_enabled: bool,
    /// Value sent as the `Authorization` header, when set.
    pub auth_header: Option<String>,
    /// Entries whose message exceeds this many bytes are dropped, when set.
    pub max_message_bytes: Option<usize>,
    /// Additional labels merged into every stream's label set.
    pub extra_labels: BTreeMap<String, String>,
}

impl Default for LokiConfig {
    fn default() -> Self {
        LokiConfig {
            endpoint: String::new(),
            app: "default".to_string(),
            environment: "production".to_string(),
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            max_buffer_size: 10_000,
            max_batch_bytes: 1_048_576,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            gzip_enabled: true,
            auth_header: None,
            max_message_bytes: None,
            extra_labels: BTreeMap::new(),
        }
    }
}

impl LokiConfig {
    /// Creates a configuration with the given endpoint and default limits.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        LokiConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validates the configuration, failing fast on invalid values.
    pub fn validate(&self) -> Result<(), Error> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::InvalidConfig("endpoint cannot be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "max_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_size > self.max_buffer_size {
            return Err(Error::InvalidConfig(
                "batch_size cannot exceed max_buffer_size".to_string(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_batch_bytes must be greater than 0".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "flush_interval must be greater than 0".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = LokiConfig::new("http://localhost:3100");

        assert_eq!(config.endpoint, "http://localhost:3100");
        assert_eq!(config.app, "default");
        assert_eq!(config.environment, "production");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.max_buffer_size, 10_000);
        assert_eq!(config.max_batch_bytes, 1_048_576);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.gzip_enabled);
        assert!(config.auth_header.is_none());
        assert!(config.max_message_bytes.is_none());
        assert!(config.extra_labels.is_empty());
    }

    #[test]
    fn test_validate_accepts_defaults_with_endpoint() {
        let config = LokiConfig::new("http://localhost:3100");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_endpoint() {
        let config = LokiConfig::new("  ");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = LokiConfig {
            batch_size: 0,
            ..LokiConfig::new("http://localhost:3100")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_buffer_size() {
        let config = LokiConfig {
            max_buffer_size: 0,
            ..LokiConfig::new("http://localhost:3100")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_batch_size_above_buffer_size() {
        let config = LokiConfig {
            batch_size: 200,
            max_buffer_size: 100,
            ..LokiConfig::new("http://localhost:3100")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_batch_bytes() {
        let config = LokiConfig {
            max_batch_bytes: 0,
            ..LokiConfig::new("http://localhost:3100")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_flush_interval() {
        let config = LokiConfig {
            flush_interval: Duration::ZERO,
            ..LokiConfig::new("http://localhost:3100")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = LokiConfig {
            timeout: Duration::ZERO,
            ..LokiConfig::new("http://localhost:3100")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_allows_zero_retries() {
        // Zero retries is a valid policy: failed batches are dropped.
        let config = LokiConfig {
            max_retries: 0,
            ..LokiConfig::new("http://localhost:3100")
        };
        assert!(config.validate().is_ok());
    }
}
