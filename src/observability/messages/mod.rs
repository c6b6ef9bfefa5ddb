// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for structured logging, grouped by subsystem.

pub mod config;
pub mod engine;
pub mod service;

use tracing::Span;

/// A message that knows how to log itself with structured fields.
pub trait StructuredLog {
    /// Emit the message at its level with its fields attached.
    fn log(&self);

    /// A span carrying the message's fields, for instrumenting the work it describes.
    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("microgateway", span_name = name)
    }
}
