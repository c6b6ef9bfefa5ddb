// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while loading, validating and warming up a gateway configuration.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ServiceType;

/// A single structural problem found in a gateway document.
///
/// Validation collects every problem it finds, so these are reported as a list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Duplicate service name: '{name}'")]
    DuplicateService { name: String },

    #[error("Duplicate dispatch name: '{name}'")]
    DuplicateDispatch { name: String },

    #[error("Duplicate trigger name: '{name}'")]
    DuplicateTrigger { name: String },

    #[error("Service name '{name}' is reserved for an execution context binding")]
    ReservedServiceName { name: String },

    #[error("Step {step} of route {route} in dispatch '{dispatch}' references unknown service '{service}'")]
    UnknownService {
        dispatch: String,
        route: usize,
        step: usize,
        service: String,
    },

    #[error("Handler {handler} of trigger '{trigger}' references unknown dispatch '{dispatch}'")]
    UnknownDispatch {
        trigger: String,
        handler: usize,
        dispatch: String,
    },

    #[error("Malformed expression at {location}: {reason}")]
    MalformedExpression { location: String, reason: String },
}

/// Configuration errors: surfaced synchronously at load, validation or warm-up time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported configuration format '{0}' (expected json, yaml or toml)")]
    UnsupportedFormat(String),

    #[error("Failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration validation failed:\n{}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("Invalid settings for {service_type} service '{service}': {reason}")]
    InvalidSettings {
        service: String,
        service_type: ServiceType,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid_settings(
        service: impl Into<String>,
        service_type: ServiceType,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSettings {
            service: service.into(),
            service_type,
            reason: reason.into(),
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
