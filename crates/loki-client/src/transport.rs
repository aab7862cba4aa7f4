// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery to the Loki push API.
//!
//! The transport serializes entry batches into wire payloads and POSTs each
//! one independently; a failed batch never blocks the ones after it. Failed
//! batches are handed back to the caller as their original entry groups so
//! the buffer can schedule retries.
//!
//! Counter semantics (monotonic, process-lifetime):
//! - `sent`: entries successfully delivered (2xx)
//! - `errors`: batches rejected by the server (non-2xx response)
//! - `dropped`: batches that never reached the server (connect/timeout)
//!
//! The two failure categories differ only in which counter they bump; both
//! are equally eligible for retry.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use tracing::debug;

use crate::config::LokiConfig;
use crate::entry::LogEntry;
use crate::error::Error;
use crate::payload::{self, Batch};

/// Snapshot of the transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub sent: u64,
    pub errors: u64,
    pub dropped: u64,
}

/// Delivery seam between the buffer and the backend.
///
/// The buffer only depends on this trait; production uses [`HttpTransport`],
/// tests use an in-memory double.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers the entries, returning the original entry group of every
    /// batch that failed. An empty input returns an empty result without
    /// any network activity.
    async fn send(&self, entries: &[Arc<LogEntry>]) -> Vec<Vec<Arc<LogEntry>>>;

    /// Releases network resources. Called at shutdown; safe to call
    /// repeatedly.
    fn close(&self);

    /// Current counter snapshot, non-blocking.
    fn stats(&self) -> TransportStats;
}

/// Real transport: reqwest client POSTing to `{endpoint}/loki/api/v1/push`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    gzip_enabled: bool,
    max_batch_bytes: usize,
    sent: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
}

impl HttpTransport {
    /// Builds the client, URL, and headers once up front.
    ///
    /// Fails on an unbuildable HTTP client or an `auth_header` value that is
    /// not a valid header.
    pub fn new(config: &LokiConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let url = format!(
            "{}/loki/api/v1/push",
            config.endpoint.trim_end_matches('/')
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if config.gzip_enabled {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        if let Some(auth) = &config.auth_header {
            let value = HeaderValue::from_str(auth).map_err(|_| {
                Error::InvalidConfig("auth_header is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(HttpTransport {
            client,
            url,
            headers,
            gzip_enabled: config.gzip_enabled,
            max_batch_bytes: config.max_batch_bytes,
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    fn encode(&self, body: Vec<u8>) -> Vec<u8> {
        if !self.gzip_enabled {
            return body;
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(&body).is_err() {
            debug!("failed to gzip payload, sending uncompressed");
            return body;
        }
        match encoder.finish() {
            Ok(compressed) => compressed,
            Err(e) => {
                debug!("failed to gzip payload: {e}");
                body
            }
        }
    }

    /// POSTs one batch. Returns true on 2xx.
    async fn post(&self, batch: &Batch) -> bool {
        let body = self.encode(batch.body());
        let result = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                self.sent
                    .fetch_add(batch.entry_count() as u64, Ordering::Relaxed);
                true
            }
            Ok(resp) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                debug!("loki rejected batch: status {}", resp.status());
                false
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("failed to reach loki: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, entries: &[Arc<LogEntry>]) -> Vec<Vec<Arc<LogEntry>>> {
        if entries.is_empty() {
            return Vec::new();
        }

        let streams = payload::build_streams(entries);
        let streams = payload::split_oversized(streams, self.max_batch_bytes);
        let batches = payload::pack_batches(streams, self.max_batch_bytes);

        let mut failed = Vec::new();
        for batch in &batches {
            if !self.post(batch).await {
                failed.push(batch.entries());
            }
        }
        failed
    }

    fn close(&self) {
        // reqwest's connection pool is released when the client drops;
        // nothing to tear down eagerly.
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            sent: self.sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
pub(crate) use mock::MockTransport;
