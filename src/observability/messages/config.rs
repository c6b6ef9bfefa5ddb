// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for configuration loading and gateway warm-up.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A gateway document was read and parsed.
///
/// # Log Level
/// `info!` - Startup event
pub struct ConfigLoaded<'a> {
    pub path: &'a str,
    pub gateway: &'a str,
    pub service_count: usize,
    pub dispatch_count: usize,
}

impl Display for ConfigLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded gateway '{}' from {}: {} services, {} dispatches",
            self.gateway, self.path, self.service_count, self.dispatch_count
        )
    }
}

impl StructuredLog for ConfigLoaded<'_> {
    fn log(&self) {
        tracing::info!(
            path = self.path,
            gateway = self.gateway,
            service_count = self.service_count,
            dispatch_count = self.dispatch_count,
            "{}", self
        );
    }
}

/// A gateway document failed validation.
///
/// # Log Level
/// `error!` - The gateway cannot start
pub struct ConfigValidationFailed<'a> {
    pub gateway: &'a str,
    pub error_count: usize,
}

impl Display for ConfigValidationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Gateway '{}' failed validation with {} errors",
            self.gateway, self.error_count
        )
    }
}

impl StructuredLog for ConfigValidationFailed<'_> {
    fn log(&self) {
        tracing::error!(gateway = self.gateway, error_count = self.error_count, "{}", self);
    }
}

/// A gateway instance is warm and cached.
///
/// # Log Level
/// `info!` - Startup event
pub struct GatewayWarmedUp<'a> {
    pub instance: &'a str,
    pub gateway: &'a str,
    pub service_count: usize,
    pub dispatch_count: usize,
}

impl Display for GatewayWarmedUp<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Gateway '{}' warmed up as instance '{}': {} services, {} dispatches",
            self.gateway, self.instance, self.service_count, self.dispatch_count
        )
    }
}

impl StructuredLog for GatewayWarmedUp<'_> {
    fn log(&self) {
        tracing::info!(
            instance = self.instance,
            gateway = self.gateway,
            service_count = self.service_count,
            dispatch_count = self.dispatch_count,
            "{}", self
        );
    }
}

/// A cached gateway instance was dropped.
///
/// # Log Level
/// `info!` - Lifecycle event
pub struct GatewayEvicted<'a> {
    pub instance: &'a str,
}

impl Display for GatewayEvicted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Gateway instance '{}' evicted", self.instance)
    }
}

impl StructuredLog for GatewayEvicted<'_> {
    fn log(&self) {
        tracing::info!(instance = self.instance, "{}", self);
    }
}
