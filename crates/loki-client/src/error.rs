// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can surface to the caller when constructing a client.
///
/// The delivery pipeline itself is best-effort: send failures are absorbed
/// into counters and the retry queue, never returned from `append`/`flush`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
