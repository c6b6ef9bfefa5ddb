// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in service implementations.
//!
//! Every service implements [`Service`](crate::traits::Service) and is created from
//! its [`ServiceConfig`] by the [`ServiceFactory`]:
//!
//! ```text
//! ServiceConfig → ServiceFactory → warm prototype → fork() per execution path
//! ```
//!
//! # Available Services
//!
//! * `http` - outbound HTTP call with path templating and gzip handling
//! * `js` - a JavaScript transform run in a fresh sandbox
//! * `activity` / `flow` - adapters onto externally registered flow units
//! * `circuitBreaker` - multi-mode breaker with shared per-context state
//! * `rateLimiter` - sliding-window quota per caller token
//! * `jwt` - signed token validation
//! * `anomaly` - payload complexity z-score per context
//! * `sqld` - SQL-injection likelihood per string field
//! * `grpc` - bridge onto registered gRPC client stubs
//!
//! Stateful services keep their cross-request state in the injected
//! [`SharedState`](crate::state::SharedState), never in the prototype.

pub mod anomaly;
pub mod circuit_breaker;
pub mod factory;
pub mod flow;
pub mod grpc;
pub mod http;
pub mod jwt;
pub mod rate_limiter;
pub mod script;
pub mod sql_injection;
#[cfg(test)]
pub mod stub;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::errors::{ConfigError, ServiceError};
use crate::state::SharedState;

pub use factory::ServiceFactory;
pub use flow::FlowRegistry;
pub use grpc::GrpcRegistry;

/// Everything a service may need from outside the gateway document.
#[derive(Clone)]
pub struct Collaborators {
    pub state: Arc<SharedState>,
    pub flows: Arc<FlowRegistry>,
    pub grpc: Arc<GrpcRegistry>,
    pub http: reqwest::Client,
}

impl Collaborators {
    pub fn with_state(mut self, state: Arc<SharedState>) -> Self {
        self.state = state;
        self
    }

    pub fn with_flows(mut self, flows: Arc<FlowRegistry>) -> Self {
        self.flows = flows;
        self
    }

    pub fn with_grpc(mut self, grpc: Arc<GrpcRegistry>) -> Self {
        self.grpc = grpc;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            state: Arc::new(SharedState::default()),
            flows: Arc::new(FlowRegistry::new()),
            grpc: Arc::new(GrpcRegistry::new()),
            http: reqwest::Client::new(),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("state", &self.state)
            .field("flows", &self.flows)
            .field("grpc", &self.grpc)
            .finish()
    }
}

/// Overlay new top-level fields onto a typed request.
///
/// Fields not present in `values` keep their current value; a `null` resets the
/// field to its default.
pub fn merge_request<T>(service: &str, current: &T, values: &Map<String, Value>) -> Result<T, ServiceError>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => return Err(ServiceError::invalid_request(service, e.to_string())),
    };

    for (key, value) in values {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value(Value::Object(merged))
        .map_err(|e| ServiceError::invalid_request(service, e.to_string()))
}

/// Deserialize a service's free-form settings into its typed settings.
pub fn parse_settings<T: DeserializeOwned>(definition: &ServiceConfig) -> Result<T, ConfigError> {
    serde_json::from_value(Value::Object(definition.settings.clone())).map_err(|e| {
        ConfigError::invalid_settings(&definition.name, definition.service_type, e.to_string())
    })
}

/// Render a JSON value the way it should appear in a URL or header.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
