// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::errors::ConfigError;
use crate::observability::messages::config::{ConfigLoaded, ConfigValidationFailed};
use crate::observability::messages::StructuredLog;

/// Top-level configuration document.
///
/// Everything the gateway needs lives under the `gateway` key so the document can
/// share a file with other tooling.
///
/// # Example
/// ```json
/// {
///   "gateway": {
///     "name": "PetStore",
///     "version": "1.0.0",
///     "triggers": [
///       { "name": "rest", "type": "rest", "handlers": [ { "dispatch": "Pets" } ] }
///     ],
///     "dispatches": [
///       {
///         "name": "Pets",
///         "routes": [
///           {
///             "if": "${payload.pathParams.petId == 1}",
///             "steps": [ { "service": "PetStorePets", "input": { "pathParams.petId": "${payload.pathParams.petId}" } } ],
///             "responses": [ { "output": { "code": 200, "data": "${PetStorePets.response.body}" } } ]
///           }
///         ]
///       }
///     ],
///     "services": [
///       { "name": "PetStorePets", "type": "http", "settings": { "url": "http://petstore.example", "path": "/pet/:petId" } }
///     ]
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayDocument {
    pub gateway: GatewayConfig,
}

/// A gateway: its triggers, dispatches and services. Immutable once loaded.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub dispatches: Vec<DispatchConfig>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// An inbound front-end. The engine only cares about which dispatch each handler feeds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriggerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerConfig {
    #[serde(default)]
    pub settings: Map<String, Value>,
    pub dispatch: String,
}

/// A named routing unit owning an ordered list of routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    pub name: String,
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// A guarded sequence of steps plus the responses that may answer the event.
///
/// At most one route per dispatch is selected: the first whose `if` holds.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Route {
    #[serde(rename = "if", default)]
    pub condition: String,
    #[serde(rename = "async", default)]
    pub is_async: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub responses: Vec<Response>,
}

/// One guarded invocation of a named service with mapped inputs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Step {
    #[serde(rename = "if", default)]
    pub condition: String,
    pub service: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Response {
    #[serde(rename = "if", default)]
    pub condition: String,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub output: Output,
}

/// Reply code and body. Either may be a literal or a `${...}` expression.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Output {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub data: Value,
}

/// Definition of a service: which built-in implements it and how it is configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// The closed set of built-in service implementations.
///
/// Unknown `type` strings fail at parse time rather than at first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceType {
    Http,
    Js,
    Activity,
    Flow,
    CircuitBreaker,
    RateLimiter,
    Jwt,
    Anomaly,
    Sqld,
    Grpc,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Http => "http",
            ServiceType::Js => "js",
            ServiceType::Activity => "activity",
            ServiceType::Flow => "flow",
            ServiceType::CircuitBreaker => "circuitBreaker",
            ServiceType::RateLimiter => "rateLimiter",
            ServiceType::Jwt => "jwt",
            ServiceType::Anomaly => "anomaly",
            ServiceType::Sqld => "sqld",
            ServiceType::Grpc => "grpc",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialization formats accepted for gateway documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Parse a gateway document held in memory.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<GatewayConfig, ConfigError> {
    let document: GatewayDocument = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
    };
    Ok(document.gateway)
}

/// Load a gateway document from disk; the extension selects the format.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = parse_config(&content, format)?;

    ConfigLoaded {
        path: &path.display().to_string(),
        gateway: &cfg.name,
        service_count: cfg.services.len(),
        dispatch_count: cfg.dispatches.len(),
    }
    .log();

    Ok(cfg)
}

/// Load a gateway document and check it for structural problems.
///
/// Every problem is reported, not just the first.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let cfg = load_config(path)?;
    if let Err(errors) = crate::config::validate_gateway(&cfg) {
        ConfigValidationFailed {
            gateway: &cfg.name,
            error_count: errors.len(),
        }
        .log();
        return Err(ConfigError::Invalid(errors));
    }
    Ok(cfg)
}
