// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for built-in service events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// A service prototype was built during warm-up.
///
/// # Log Level
/// `debug!` - Startup detail
pub struct ServiceCreated<'a> {
    pub service: &'a str,
    pub service_type: &'a str,
}

impl Display for ServiceCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Created {} service '{}'", self.service_type, self.service)
    }
}

impl StructuredLog for ServiceCreated<'_> {
    fn log(&self) {
        tracing::debug!(service = self.service, service_type = self.service_type, "{}", self);
    }
}

/// A circuit breaker context is (or just became) open.
///
/// # Log Level
/// `warn!` - Downstream is being shielded
pub struct CircuitBreakerTripped<'a> {
    pub service: &'a str,
    pub context: &'a str,
    pub mode: &'a str,
}

impl Display for CircuitBreakerTripped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Circuit breaker '{}' (context '{}', mode {}) is tripped",
            self.service, self.context, self.mode
        )
    }
}

impl StructuredLog for CircuitBreakerTripped<'_> {
    fn log(&self) {
        tracing::warn!(service = self.service, context = self.context, mode = self.mode, "{}", self);
    }
}

/// A caller ran out of quota.
///
/// # Log Level
/// `warn!` - Client is being throttled
pub struct QuotaExceeded<'a> {
    pub service: &'a str,
    pub token: &'a str,
    pub limit: &'a str,
}

impl Display for QuotaExceeded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rate limiter '{}' quota {} exceeded for token '{}'",
            self.service, self.limit, self.token
        )
    }
}

impl StructuredLog for QuotaExceeded<'_> {
    fn log(&self) {
        tracing::warn!(service = self.service, token = self.token, limit = self.limit, "{}", self);
    }
}

/// An outbound HTTP call returned.
///
/// # Log Level
/// `debug!` - Per-call detail
pub struct HttpRequestCompleted<'a> {
    pub service: &'a str,
    pub method: &'a str,
    pub url: &'a str,
    pub status: u16,
    pub duration: Duration,
}

impl Display for HttpRequestCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Service '{}' {} {} -> {} in {:?}",
            self.service, self.method, self.url, self.status, self.duration
        )
    }
}

impl StructuredLog for HttpRequestCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            service = self.service,
            method = self.method,
            url = self.url,
            status = self.status,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}

/// A `js` service script threw or timed out; the error is in its response.
///
/// # Log Level
/// `warn!` - Script defect or bad input
pub struct ScriptFailed<'a> {
    pub service: &'a str,
    pub error: &'a str,
}

impl Display for ScriptFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Script service '{}' failed: {}", self.service, self.error)
    }
}

impl StructuredLog for ScriptFailed<'_> {
    fn log(&self) {
        tracing::warn!(service = self.service, error = self.error, "{}", self);
    }
}

/// A JWT did not validate.
///
/// # Log Level
/// `info!` - Expected for bad clients
pub struct TokenRejected<'a> {
    pub service: &'a str,
    pub reason: &'a str,
}

impl Display for TokenRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "JWT service '{}' rejected token: {}", self.service, self.reason)
    }
}

impl StructuredLog for TokenRejected<'_> {
    fn log(&self) {
        tracing::info!(service = self.service, reason = self.reason, "{}", self);
    }
}

/// A payload's complexity was out of line with its context's history.
///
/// # Log Level
/// `warn!` - Possible attack or malformed client
pub struct AnomalyDetected<'a> {
    pub service: &'a str,
    pub context: &'a str,
    pub complexity: f64,
}

impl Display for AnomalyDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Anomaly service '{}' flagged payload in context '{}': z={:.2}",
            self.service, self.context, self.complexity
        )
    }
}

impl StructuredLog for AnomalyDetected<'_> {
    fn log(&self) {
        tracing::warn!(
            service = self.service,
            context = self.context,
            complexity = self.complexity,
            "{}", self
        );
    }
}

/// At least one field scored as a likely SQL injection.
///
/// # Log Level
/// `warn!` - Possible attack
pub struct InjectionSuspected<'a> {
    pub service: &'a str,
    pub field: &'a str,
    pub score: f64,
}

impl Display for InjectionSuspected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "SQL injection detector '{}' scored field '{}' at {:.1}",
            self.service, self.field, self.score
        )
    }
}

impl StructuredLog for InjectionSuspected<'_> {
    fn log(&self) {
        tracing::warn!(service = self.service, field = self.field, score = self.score, "{}", self);
    }
}
