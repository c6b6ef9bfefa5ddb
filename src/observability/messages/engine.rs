// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for dispatch engine events.
//!
//! This module contains message types for logging events related to:
//! * Route selection (and events that match no route)
//! * Step execution, skipping and failure
//! * Response selection and the final reply

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// An event entered the engine.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct ExecutionStarted {
    pub route_count: usize,
}

impl Display for ExecutionStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Dispatching event across {} routes", self.route_count)
    }
}

impl StructuredLog for ExecutionStarted {
    fn log(&self) {
        tracing::debug!(route_count = self.route_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("dispatch", span_name = name, route_count = self.route_count)
    }
}

/// A route's condition held and it was selected.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct RouteSelected {
    pub route_index: usize,
    pub is_async: bool,
    pub step_count: usize,
}

impl Display for RouteSelected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Selected route {} ({}, {} steps)",
            self.route_index,
            if self.is_async { "async" } else { "sync" },
            self.step_count
        )
    }
}

impl StructuredLog for RouteSelected {
    fn log(&self) {
        tracing::debug!(
            route_index = self.route_index,
            is_async = self.is_async,
            step_count = self.step_count,
            "{}", self
        );
    }
}

/// No route's condition held; the event gets no reply.
///
/// # Log Level
/// `info!` - Operationally interesting, not a failure
pub struct NoRouteMatched {
    pub route_count: usize,
}

impl Display for NoRouteMatched {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "No route matched among {} routes; no reply", self.route_count)
    }
}

impl StructuredLog for NoRouteMatched {
    fn log(&self) {
        tracing::info!(route_count = self.route_count, "{}", self);
    }
}

/// A guard threw or returned a non-boolean; it is treated as false.
///
/// # Log Level
/// `warn!` - Likely a configuration defect
///
/// # Example
/// ```ignore
/// use microgateway::errors::EvalError;
/// use microgateway::observability::messages::{engine::ConditionEvaluationFailed, StructuredLog};
///
/// let error = EvalError::Timeout;
/// ConditionEvaluationFailed { location: "route 0", expression: "${payload.x}", error: &error }.log();
/// ```
pub struct ConditionEvaluationFailed<'a> {
    pub location: &'a str,
    pub expression: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ConditionEvaluationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Condition of {} '{}' failed to evaluate, treating as false: {}",
            self.location, self.expression, self.error
        )
    }
}

impl StructuredLog for ConditionEvaluationFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            location = self.location,
            expression = self.expression,
            error = %self.error,
            "{}", self
        );
    }
}

/// A step's condition was false.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct StepSkipped<'a> {
    pub step_index: usize,
    pub service: &'a str,
}

impl Display for StepSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Skipped step {} ({})", self.step_index, self.service)
    }
}

impl StructuredLog for StepSkipped<'_> {
    fn log(&self) {
        tracing::debug!(step_index = self.step_index, service = self.service, "{}", self);
    }
}

/// A step's service ran successfully.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct StepCompleted<'a> {
    pub step_index: usize,
    pub service: &'a str,
    pub duration: Duration,
}

impl Display for StepCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step {} ({}) completed in {:?}",
            self.step_index, self.service, self.duration
        )
    }
}

impl StructuredLog for StepCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            step_index = self.step_index,
            service = self.service,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}

/// A step's service failed; the remaining steps of the route are abandoned.
///
/// # Log Level
/// `warn!` for domain outcomes (tripped breaker), `error!` otherwise
pub struct StepFailed<'a> {
    pub step_index: usize,
    pub service: &'a str,
    pub error: &'a crate::errors::ServiceError,
}

impl Display for StepFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step {} ({}) failed, abandoning remaining steps: {}",
            self.step_index, self.service, self.error
        )
    }
}

impl StructuredLog for StepFailed<'_> {
    fn log(&self) {
        if self.error.is_domain_error() {
            tracing::warn!(step_index = self.step_index, service = self.service, error = %self.error, "{}", self);
        } else {
            tracing::error!(step_index = self.step_index, service = self.service, error = %self.error, "{}", self);
        }
    }
}

/// A detached route started running its steps.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct DetachedRouteStarted {
    pub route_index: usize,
    pub step_count: usize,
}

impl Display for DetachedRouteStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Detached route {} started with {} steps",
            self.route_index, self.step_count
        )
    }
}

impl StructuredLog for DetachedRouteStarted {
    fn log(&self) {
        tracing::debug!(route_index = self.route_index, step_count = self.step_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "detached_route",
            span_name = name,
            route_index = self.route_index,
            step_count = self.step_count,
        )
    }
}

/// A detached route failed after its caller had already been answered.
///
/// # Log Level
/// `error!` - Nobody else will see this failure
pub struct DetachedRouteFailed<'a> {
    pub route_index: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for DetachedRouteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Detached route {} failed: {}", self.route_index, self.error)
    }
}

impl StructuredLog for DetachedRouteFailed<'_> {
    fn log(&self) {
        tracing::error!(route_index = self.route_index, error = %self.error, "{}", self);
    }
}

/// A response's condition held and it was selected.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct ResponseSelected {
    pub response_index: usize,
    pub code: u16,
    pub error: bool,
}

impl Display for ResponseSelected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Selected response {} with code {}{}",
            self.response_index,
            self.code,
            if self.error { " (error)" } else { "" }
        )
    }
}

impl StructuredLog for ResponseSelected {
    fn log(&self) {
        tracing::debug!(
            response_index = self.response_index,
            code = self.code,
            error = self.error,
            "{}", self
        );
    }
}

/// The selected route has no response whose condition held.
///
/// # Log Level
/// `info!` - Operationally interesting, not a failure
pub struct NoResponseMatched {
    pub response_count: usize,
}

impl Display for NoResponseMatched {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "No response matched among {} responses", self.response_count)
    }
}

impl StructuredLog for NoResponseMatched {
    fn log(&self) {
        tracing::info!(response_count = self.response_count, "{}", self);
    }
}

/// The engine finished with an event.
///
/// # Log Level
/// `debug!` - Per-event detail
pub struct ExecutionCompleted {
    pub code: Option<u16>,
    pub duration: Duration,
}

impl Display for ExecutionCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "Event handled in {:?}: reply {}", self.duration, code),
            None => write!(f, "Event handled in {:?}: no reply", self.duration),
        }
    }
}

impl StructuredLog for ExecutionCompleted {
    fn log(&self) {
        tracing::debug!(
            code = ?self.code,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}
