// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing client facade.
//!
//! Composes the buffer and transport, stamps every entry with the
//! configured label set, and exposes one level method per severity.
//! Logging calls never fail and never block on the backend; the only
//! fallible operation is construction, which validates the configuration.

use std::sync::Arc;

use crate::buffer::LogBuffer;
use crate::config::LokiConfig;
use crate::entry::{LogEntry, LogLevel};
use crate::error::Error;
use crate::transport::{HttpTransport, Transport};

/// Flat snapshot across the buffer and transport.
///
/// Eventually consistent: the two subsystems are read one after the other,
/// without a global lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LokiStats {
    /// Entries successfully delivered.
    pub sent: u64,
    /// Batches rejected by the server (non-2xx).
    pub errors: u64,
    /// Transport-level drops plus buffer-side drops (capacity, oversized
    /// message, retries exhausted).
    pub dropped: u64,
    /// Entries currently pending in the buffer.
    pub pending: usize,
    /// Retry items currently scheduled.
    pub retrying: usize,
    /// Batches handed to the transport.
    pub flushes: u64,
}

/// Buffered Loki client.
///
/// # Example
///
/// ```rust,no_run
/// use loki_client::{Loki, LokiConfig};
///
/// # async fn run() -> Result<(), loki_client::Error> {
/// let client = Loki::new(LokiConfig::new("http://localhost:3100"))?;
/// client.info("service started", &[("version", "1.4.2")]).await;
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Loki {
    config: Arc<LokiConfig>,
    transport: Arc<dyn Transport>,
    buffer: Arc<LogBuffer>,
}

impl Loki {
    /// Validates the configuration and starts the client with the real
    /// HTTP transport. Must be called within a tokio runtime.
    pub fn new(config: LokiConfig) -> Result<Self, Error> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::assemble(Arc::new(config), transport))
    }

    /// Starts the client with a caller-provided transport.
    pub fn with_transport(
        config: LokiConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self::assemble(Arc::new(config), transport))
    }

    fn assemble(config: Arc<LokiConfig>, transport: Arc<dyn Transport>) -> Self {
        let buffer = LogBuffer::start(Arc::clone(&transport), Arc::clone(&config));
        Loki {
            config,
            transport,
            buffer,
        }
    }

    pub async fn debug(&self, message: &str, metadata: &[(&str, &str)]) {
        self.log(LogLevel::Debug, message, metadata).await;
    }

    pub async fn info(&self, message: &str, metadata: &[(&str, &str)]) {
        self.log(LogLevel::Info, message, metadata).await;
    }

    pub async fn warn(&self, message: &str, metadata: &[(&str, &str)]) {
        self.log(LogLevel::Warn, message, metadata).await;
    }

    pub async fn error(&self, message: &str, metadata: &[(&str, &str)]) {
        self.log(LogLevel::Error, message, metadata).await;
    }

    /// Buffers one entry under the configured label set plus the level
    /// label. Best-effort: never returns an error, never blocks on the
    /// backend.
    pub async fn log(&self, level: LogLevel, message: &str, metadata: &[(&str, &str)]) {
        let mut labels = self.config.extra_labels.clone();
        labels.insert("app".to_string(), self.config.app.clone());
        labels.insert("env".to_string(), self.config.environment.clone());
        labels.insert("level".to_string(), level.as_str().to_string());

        let metadata = metadata
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();

        let entry = LogEntry::new(level, message, labels, metadata);
        self.buffer.append(entry).await;
    }

    /// Sends everything pending and runs one retry pass.
    pub async fn flush(&self) {
        self.buffer.flush().await;
    }

    /// Stops the background task, performs a final best-effort flush, and
    /// closes the transport. Returns within the configured timeout even if
    /// the backend is unreachable.
    pub async fn stop(&self) {
        self.buffer.stop().await;
        self.transport.close();
    }

    /// Aggregate stats across the buffer and transport, non-blocking.
    #[must_use]
    pub fn stats(&self) -> LokiStats {
        let transport = self.transport.stats();
        let buffer = self.buffer.stats();
        LokiStats {
            sent: transport.sent,
            errors: transport.errors,
            dropped: transport.dropped + buffer.dropped,
            pending: buffer.buffered,
            retrying: buffer.retrying,
            flushes: buffer.flushes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::transport::MockTransport;

    fn create_test_config() -> LokiConfig {
        LokiConfig {
            app: "testapp".to_string(),
            environment: "test".to_string(),
            flush_interval: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(10),
            ..LokiConfig::new("http://localhost:3100")
        }
    }

    fn create_client(mock: Arc<MockTransport>, config: LokiConfig) -> Loki {
        Loki::with_transport(config, mock).expect("valid test config")
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let result = Loki::new(LokiConfig::new(""));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_level_methods_stamp_level_label() {
        let mock = MockTransport::new();
        let client = create_client(Arc::clone(&mock), create_test_config());

        client.debug("d", &[]).await;
        client.info("i", &[]).await;
        client.warn("w", &[]).await;
        client.error("e", &[]).await;
        client.flush().await;

        let calls = mock.calls();
        let entries = &calls[0];
        assert_eq!(entries.len(), 4);
        let levels: Vec<&str> = entries
            .iter()
            .map(|e| e.labels.get("level").unwrap().as_str())
            .collect();
        assert_eq!(levels, vec!["debug", "info", "warn", "error"]);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_entries_carry_app_and_env_labels() {
        let mock = MockTransport::new();
        let client = create_client(Arc::clone(&mock), create_test_config());

        client.info("hello", &[]).await;
        client.flush().await;

        let calls = mock.calls();
        let entry = &calls[0][0];
        assert_eq!(entry.labels.get("app").unwrap(), "testapp");
        assert_eq!(entry.labels.get("env").unwrap(), "test");
        client.stop().await;
    }

    #[tokio::test]
    async fn test_extra_labels_are_merged_but_never_override_builtins() {
        let mut extra = BTreeMap::new();
        extra.insert("region".to_string(), "eu-west-1".to_string());
        extra.insert("app".to_string(), "impostor".to_string());
        let config = LokiConfig {
            extra_labels: extra,
            ..create_test_config()
        };

        let mock = MockTransport::new();
        let client = create_client(Arc::clone(&mock), config);

        client.info("hello", &[]).await;
        client.flush().await;

        let calls = mock.calls();
        let entry = &calls[0][0];
        assert_eq!(entry.labels.get("region").unwrap(), "eu-west-1");
        assert_eq!(entry.labels.get("app").unwrap(), "testapp");
        client.stop().await;
    }

    #[tokio::test]
    async fn test_metadata_reaches_the_entry_in_order() {
        let mock = MockTransport::new();
        let client = create_client(Arc::clone(&mock), create_test_config());

        client
            .info("req done", &[("status", "200"), ("path", "/x")])
            .await;
        client.flush().await;

        let calls = mock.calls();
        let entry = &calls[0][0];
        assert_eq!(entry.rendered_line(), "req done | status=200 path=/x");
        client.stop().await;
    }

    #[tokio::test]
    async fn test_stats_combine_buffer_and_transport() {
        let mock = MockTransport::new();
        let client = create_client(Arc::clone(&mock), create_test_config());

        client.info("one", &[]).await;
        client.info("two", &[]).await;

        let stats = client.stats();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.sent, 0);

        client.flush().await;
        let stats = client.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.dropped, 0);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_stats_dropped_folds_in_buffer_drops() {
        let mock = MockTransport::always_failing();
        let client = create_client(
            Arc::clone(&mock),
            LokiConfig {
                max_retries: 0,
                ..create_test_config()
            },
        );

        client.info("one", &[]).await;
        client.flush().await;

        let stats = client.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.errors, 1);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_stop_flushes_and_closes() {
        let mock = MockTransport::new();
        let client = create_client(Arc::clone(&mock), create_test_config());

        client.info("last words", &[]).await;
        client.stop().await;

        assert_eq!(mock.send_count(), 1);
        assert_eq!(client.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_stop_twice_is_safe() {
        let mock = MockTransport::new();
        let client = create_client(Arc::clone(&mock), create_test_config());

        client.info("one", &[]).await;
        client.stop().await;
        client.stop().await;

        assert_eq!(mock.send_count(), 1);
    }
}
