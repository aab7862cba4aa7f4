// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream grouping and byte-budget batch packing.
//!
//! This module turns a flat list of entries into wire payloads:
//!
//! ```text
//!   entries
//!      │ group by identical label set (append order preserved)
//!      v
//!   streams
//!      │ split streams whose serialized size exceeds the budget
//!      v
//!   streams (each fits one payload, single-value overflows excepted)
//!      │ greedy first-fit packing against the byte budget
//!      v
//!   batches (one HTTP POST each)
//! ```
//!
//! All sizes are measured on the compact JSON serialization, the same bytes
//! the transport puts on the wire. Packing starts from the serialized size
//! of the empty wrapper so a batch total is exact, not an estimate.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::entry::LogEntry;

/// Serialized size of an empty push body: `{"streams":[]}`.
const WRAPPER_OVERHEAD: usize = "{\"streams\":[]}".len();

/// Cost of the `,` between two streams or two values in a JSON array.
const SEPARATOR_OVERHEAD: usize = 1;

/// One stream: a label set plus its values in append order.
///
/// The source entries ride along so a failed batch can be reported back as
/// the original entry group for retry.
#[derive(Debug)]
pub(crate) struct Stream {
    pub labels: BTreeMap<String, String>,
    pub entries: Vec<Arc<LogEntry>>,
    /// `(timestamp_ns as decimal string, rendered line)`, parallel to
    /// `entries`.
    pub values: Vec<(String, String)>,
}

impl Stream {
    fn with_labels(labels: BTreeMap<String, String>) -> Self {
        Stream {
            labels,
            entries: Vec::new(),
            values: Vec::new(),
        }
    }

    fn push(&mut self, entry: Arc<LogEntry>) {
        self.values
            .push((entry.timestamp_ns.to_string(), entry.rendered_line()));
        self.entries.push(entry);
    }

    fn serialized_size(&self) -> usize {
        json_size(&StreamPayload {
            stream: &self.labels,
            values: &self.values,
        })
    }
}

#[derive(Serialize)]
struct StreamPayload<'a> {
    stream: &'a BTreeMap<String, String>,
    values: &'a [(String, String)],
}

#[derive(Serialize)]
struct PushPayload<'a> {
    streams: Vec<StreamPayload<'a>>,
}

/// One wire-level request: an ordered list of streams within the byte budget.
#[derive(Debug)]
pub(crate) struct Batch {
    pub streams: Vec<Stream>,
}

impl Batch {
    /// The canonical JSON body for this batch.
    pub(crate) fn body(&self) -> Vec<u8> {
        let payload = PushPayload {
            streams: self
                .streams
                .iter()
                .map(|s| StreamPayload {
                    stream: &s.labels,
                    values: &s.values,
                })
                .collect(),
        };
        // In-memory serialization of strings and maps cannot fail.
        serde_json::to_vec(&payload).unwrap_or_default()
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.streams.iter().map(|s| s.entries.len()).sum()
    }

    /// The original entries carried by this batch, in stream order.
    pub(crate) fn entries(&self) -> Vec<Arc<LogEntry>> {
        self.streams
            .iter()
            .flat_map(|s| s.entries.iter().cloned())
            .collect()
    }
}

fn json_size<T: Serialize>(value: &T) -> usize {
    serde_json::to_vec(value).map_or(0, |body| body.len())
}

/// Groups entries by exact label-set equality, preserving intra-group append
/// order and first-appearance order of the groups.
pub(crate) fn build_streams(entries: &[Arc<LogEntry>]) -> Vec<Stream> {
    let mut streams: Vec<Stream> = Vec::new();
    let mut index: HashMap<BTreeMap<String, String>, usize> = HashMap::new();
    for entry in entries {
        let idx = *index.entry(entry.labels.clone()).or_insert_with(|| {
            streams.push(Stream::with_labels(entry.labels.clone()));
            streams.len() - 1
        });
        streams[idx].push(Arc::clone(entry));
    }
    streams
}

/// Splits any stream whose serialized size exceeds the budget into multiple
/// same-label streams, greedily accumulating values first-fit.
///
/// A stream whose single smallest value already exceeds the budget is left
/// as a one-value stream; the batch packer ships it alone.
pub(crate) fn split_oversized(streams: Vec<Stream>, max_batch_bytes: usize) -> Vec<Stream> {
    let mut out = Vec::with_capacity(streams.len());
    for stream in streams {
        if WRAPPER_OVERHEAD + stream.serialized_size() <= max_batch_bytes {
            out.push(stream);
        } else {
            out.extend(split_stream(stream, max_batch_bytes));
        }
    }
    out
}

fn split_stream(stream: Stream, max_batch_bytes: usize) -> Vec<Stream> {
    // Fixed structural cost of one piece: the batch wrapper plus this
    // stream's labels with an empty values array.
    let overhead = WRAPPER_OVERHEAD
        + json_size(&StreamPayload {
            stream: &stream.labels,
            values: &[],
        });
    let labels = stream.labels.clone();

    let mut pieces = Vec::new();
    let mut current = Stream::with_labels(labels.clone());
    let mut values_size = 0usize;

    for (entry, value) in stream.entries.into_iter().zip(stream.values) {
        let value_size = json_size(&value);
        let separator = if current.values.is_empty() {
            0
        } else {
            SEPARATOR_OVERHEAD
        };

        if !current.values.is_empty()
            && overhead + values_size + separator + value_size > max_batch_bytes
        {
            pieces.push(current);
            current = Stream::with_labels(labels.clone());
            values_size = 0;
        }

        values_size += if current.values.is_empty() {
            0
        } else {
            SEPARATOR_OVERHEAD
        } + value_size;
        current.values.push(value);
        current.entries.push(entry);
    }

    if !current.values.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Packs streams into batches using greedy first-fit against the byte budget.
///
/// The running total starts at the wrapper overhead; a stream is added while
/// the projected serialized size stays within budget, otherwise the current
/// batch is closed and a new one started. A single stream exceeding the
/// budget on its own still ships as its own batch.
pub(crate) fn pack_batches(streams: Vec<Stream>, max_batch_bytes: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<Stream> = Vec::new();
    let mut current_size = WRAPPER_OVERHEAD;

    for stream in streams {
        let stream_size = stream.serialized_size();
        let separator = if current.is_empty() {
            0
        } else {
            SEPARATOR_OVERHEAD
        };

        if !current.is_empty() && current_size + separator + stream_size > max_batch_bytes {
            batches.push(Batch {
                streams: std::mem::take(&mut current),
            });
            current_size = WRAPPER_OVERHEAD;
        }

        current_size += if current.is_empty() {
            0
        } else {
            SEPARATOR_OVERHEAD
        } + stream_size;
        current.push(stream);
    }

    if !current.is_empty() {
        batches.push(Batch { streams: current });
    }
    batches
}
