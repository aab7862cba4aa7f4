// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort buffered client for Grafana Loki's push API.
//!
//! Entries are buffered in memory, grouped into streams by label set, packed
//! into byte-budgeted batches, and shipped as JSON over HTTP by a background
//! task. Delivery failures are retried with exponential backoff up to a
//! configured cap, then dropped. Logging calls never fail and never block on
//! the network.
//!
//! ```text
//!                        append()                 flush tick / batch full
//!  Loki (facade) ───────────────────▶ LogBuffer ─────────────────────────┐
//!    debug/info/warn/error              │  pending + retry queue         │
//!                                       │                                ▼
//!                                       │                          HttpTransport
//!                                       │   failed batches          group/pack/gzip
//!                                       ◀────────────────────── POST /loki/api/v1/push
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use loki_client::{Loki, LokiConfig};
//!
//! # async fn run() -> Result<(), loki_client::Error> {
//! let mut config = LokiConfig::new("http://localhost:3100");
//! config.app = "checkout".to_string();
//! let client = Loki::new(config)?;
//!
//! client.info("order placed", &[("order_id", "91231")]).await;
//! client.error("payment declined", &[("order_id", "91231")]).await;
//!
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod client;
pub mod config;
pub mod entry;
pub mod error;
mod payload;
pub mod transport;

pub use client::{Loki, LokiStats};
pub use config::LokiConfig;
pub use entry::{LogEntry, LogLevel};
pub use error::Error;
pub use transport::{HttpTransport, Transport, TransportStats};
