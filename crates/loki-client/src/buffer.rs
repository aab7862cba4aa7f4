// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory buffering with threshold-triggered sends and bounded retries.
//!
//! # Locking
//!
//! One mutex guards the pending list, the retry queue, and the buffer-side
//! counters. It is held only for in-memory mutation — detach, insert,
//! snapshot — and never across a network call. Batches are detached under
//! the lock and handed to the transport after it is released, so slow or
//! unreachable backends never stall concurrent appenders.
//!
//! # Backpressure
//!
//! The buffer is bounded and sheds: an append beyond `max_buffer_size` is
//! dropped and counted, the caller never blocks.
//!
//! # Retries
//!
//! Failed batches enter a retry queue with a monotonic not-before deadline.
//! Every flush resends due items; a re-failed item at attempt k is
//! rescheduled `retry_backoff * 2^k` later until `max_retries` attempts are
//! exhausted, at which point its entries are dropped and counted.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LokiConfig;
use crate::entry::LogEntry;
use crate::transport::Transport;

/// A failed batch waiting for its next attempt.
struct RetryItem {
    entries: Vec<Arc<LogEntry>>,
    attempts: u32,
    not_before: Instant,
}

/// Everything the buffer mutates, behind the single lock.
struct BufferState {
    pending: Vec<Arc<LogEntry>>,
    retry_queue: Vec<RetryItem>,
    flush_count: u64,
    drop_count: u64,
}

/// Snapshot of the buffer-side counters and queue depths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Entries currently pending in the buffer.
    pub buffered: usize,
    /// Retry items currently scheduled.
    pub retrying: usize,
    /// Batches handed to the transport.
    pub flushes: u64,
    /// Entries dropped: capacity exceeded, oversized message, or retries
    /// exhausted.
    pub dropped: u64,
}

/// Bounded entry buffer that owns the background flush task.
pub struct LogBuffer {
    transport: Arc<dyn Transport>,
    config: Arc<LokiConfig>,
    state: Mutex<BufferState>,
    cancel_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[allow(clippy::expect_used)]
impl LogBuffer {
    /// Creates the buffer and spawns its periodic flush task.
    ///
    /// Must be called within a tokio runtime. The task runs until
    /// [`LogBuffer::stop`] cancels it.
    #[must_use]
    pub fn start(transport: Arc<dyn Transport>, config: Arc<LokiConfig>) -> Arc<Self> {
        let buffer = Arc::new(LogBuffer {
            transport,
            config,
            state: Mutex::new(BufferState {
                pending: Vec::new(),
                retry_queue: Vec::new(),
                flush_count: 0,
                drop_count: 0,
            }),
            cancel_token: CancellationToken::new(),
            task: Mutex::new(None),
        });

        let task_buffer = Arc::clone(&buffer);
        let token = buffer.cancel_token.clone();
        let interval = buffer.config.flush_interval;
        let handle = tokio::spawn(async move {
            debug!("flush task started, interval {interval:?}");
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        task_buffer.flush().await;
                    }
                    () = token.cancelled() => {
                        debug!("flush task shutting down");
                        break;
                    }
                }
            }
        });
        *buffer.task.lock().expect("lock poisoned") = Some(handle);

        buffer
    }

    /// Appends one entry. Never blocks on the backend.
    ///
    /// Drops the entry (counted) when the buffer is at capacity or the
    /// message exceeds `max_message_bytes`. When the pending count reaches
    /// `batch_size`, the pending list is detached and sent immediately.
    pub async fn append(&self, entry: Arc<LogEntry>) {
        let batch = {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.pending.len() >= self.config.max_buffer_size {
                state.drop_count += 1;
                warn!(
                    "buffer full ({} entries), dropping log entry",
                    self.config.max_buffer_size
                );
                return;
            }
            if let Some(max_bytes) = self.config.max_message_bytes {
                if entry.message.len() > max_bytes {
                    state.drop_count += 1;
                    warn!(
                        "message size {} exceeds the {max_bytes} byte limit, dropping log entry",
                        entry.message.len()
                    );
                    return;
                }
            }
            state.pending.push(entry);
            if state.pending.len() >= self.config.batch_size {
                Some(std::mem::take(&mut state.pending))
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            self.send_batch(batch).await;
        }
    }

    /// Detaches and sends everything pending, then runs one retry pass.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.state.lock().expect("lock poisoned");
            std::mem::take(&mut state.pending)
        };
        if !batch.is_empty() {
            self.send_batch(batch).await;
        }
        self.process_retries().await;
    }

    /// Stops the background task and performs one final best-effort flush.
    ///
    /// Idempotent under concurrent callers: only the first caller joins the
    /// task, later calls return immediately. Waits at most the configured
    /// timeout; an unresponsive task is abandoned rather than hung on.
    pub async fn stop(&self) {
        let handle = self.task.lock().expect("lock poisoned").take();
        self.cancel_token.cancel();
        let Some(handle) = handle else {
            return;
        };
        if tokio::time::timeout(self.config.timeout, handle)
            .await
            .is_err()
        {
            warn!(
                "flush task did not stop within {:?}, proceeding with shutdown",
                self.config.timeout
            );
        }
        self.flush().await;
    }

    /// Consistent snapshot of queue depths and counters, taken under the
    /// single lock.
    pub fn stats(&self) -> BufferStats {
        let state = self.state.lock().expect("lock poisoned");
        BufferStats {
            buffered: state.pending.len(),
            retrying: state.retry_queue.len(),
            flushes: state.flush_count,
            dropped: state.drop_count,
        }
    }

    /// Hands a detached batch to the transport (lock released) and enqueues
    /// whatever the transport reports as failed.
    async fn send_batch(&self, entries: Vec<Arc<LogEntry>>) {
        let failed = self.transport.send(&entries).await;
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.flush_count += 1;
        }
        for group in failed {
            self.enqueue_retry(group);
        }
    }

    fn enqueue_retry(&self, entries: Vec<Arc<LogEntry>>) {
        let mut state = self.state.lock().expect("lock poisoned");
        if self.config.max_retries == 0 {
            state.drop_count += entries.len() as u64;
            debug!("retries disabled, dropping {} entries", entries.len());
            return;
        }
        state.retry_queue.push(RetryItem {
            entries,
            attempts: 0,
            not_before: Instant::now() + self.config.retry_backoff,
        });
    }

    /// Resends every retry item whose deadline has elapsed, outside the lock.
    async fn process_retries(&self) {
        let now = Instant::now();
        let due: Vec<RetryItem> = {
            let mut state = self.state.lock().expect("lock poisoned");
            let queue = std::mem::take(&mut state.retry_queue);
            let (due, waiting): (Vec<_>, Vec<_>) =
                queue.into_iter().partition(|item| item.not_before <= now);
            state.retry_queue = waiting;
            due
        };

        for mut item in due {
            item.attempts += 1;
            let failed = self.transport.send(&item.entries).await;
            if failed.is_empty() {
                continue;
            }
            if item.attempts < self.config.max_retries {
                let backoff = self.config.retry_backoff * 2u32.saturating_pow(item.attempts);
                item.not_before = Instant::now() + backoff;
                debug!(
                    "retry attempt {} failed, next attempt in {backoff:?}",
                    item.attempts
                );
                let mut state = self.state.lock().expect("lock poisoned");
                state.retry_queue.push(item);
            } else {
                warn!(
                    "dropping {} entries after {} failed attempts",
                    item.entries.len(),
                    item.attempts
                );
                let mut state = self.state.lock().expect("lock poisoned");
                state.drop_count += item.entries.len() as u64;
            }
        }
    }
}
