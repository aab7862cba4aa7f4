// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Immutable log entries and line rendering.
//!
//! A [`LogEntry`] is created once by the caller-facing API and then shared
//! across the pipeline as `Arc<LogEntry>` without copying. The label set is
//! the identity of the stream the entry belongs to; metadata is appended to
//! the rendered line in insertion order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The lowercase wire representation, also used as the `level` label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable log record.
///
/// # Fields
///
/// - `labels`: stream identity; entries with an identical label set land in
///   the same stream (order-irrelevant, hence a `BTreeMap`)
/// - `metadata`: key/value pairs rendered after the message, order preserved
/// - `timestamp_ns`: unix epoch nanoseconds, assigned at creation
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub labels: BTreeMap<String, String>,
    pub metadata: Vec<(String, String)>,
    pub timestamp_ns: i64,
}

impl LogEntry {
    /// Creates an entry, stamping it with the current time.
    #[must_use]
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        labels: BTreeMap<String, String>,
        metadata: Vec<(String, String)>,
    ) -> Arc<Self> {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64);
        Arc::new(LogEntry {
            level,
            message: message.into(),
            labels,
            metadata,
            timestamp_ns,
        })
    }

    /// Renders the wire line: the message alone when there is no metadata,
    /// otherwise `"<message> | k1=v1 k2=v2 ..."`.
    ///
    /// A key or value is quoted and backslash-escaped when it contains a
    /// space, `=`, `"`, `|`, or is empty.
    #[must_use]
    pub fn rendered_line(&self) -> String {
        if self.metadata.is_empty() {
            return self.message.clone();
        }
        let mut line = String::with_capacity(self.message.len() + 16 * self.metadata.len());
        line.push_str(&self.message);
        line.push_str(" |");
        for (key, value) in &self.metadata {
            line.push(' ');
            push_token(&mut line, key);
            line.push('=');
            push_token(&mut line, value);
        }
        line
    }
}

fn needs_quoting(token: &str) -> bool {
    token.is_empty() || token.chars().any(|c| matches!(c, ' ' | '=' | '"' | '|'))
}

fn push_token(out: &mut String, token: &str) {
    if !needs_quoting(token) {
        out.push_str(token);
        return;
    }
    out.push('"');
    for c in token.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}
