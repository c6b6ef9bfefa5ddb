// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Adapters onto externally registered activities and flows.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::{merge_request, parse_settings};
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::traits::{FlowUnit, Service};

/// Which namespace of the [`FlowRegistry`] a service resolves its `ref` in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Activity,
    Flow,
}

impl FlowKind {
    fn service_type(self) -> ServiceType {
        match self {
            FlowKind::Activity => ServiceType::Activity,
            FlowKind::Flow => ServiceType::Flow,
        }
    }
}

/// Flow units available to the `activity` and `flow` services, by reference name.
#[derive(Default)]
pub struct FlowRegistry {
    activities: RwLock<HashMap<String, Arc<dyn FlowUnit>>>,
    flows: RwLock<HashMap<String, Arc<dyn FlowUnit>>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_activity(&self, reference: impl Into<String>, unit: Arc<dyn FlowUnit>) {
        self.activities.write().insert(reference.into(), unit);
    }

    pub fn register_flow(&self, reference: impl Into<String>, unit: Arc<dyn FlowUnit>) {
        self.flows.write().insert(reference.into(), unit);
    }

    pub fn lookup(&self, kind: FlowKind, reference: &str) -> Option<Arc<dyn FlowUnit>> {
        match kind {
            FlowKind::Activity => self.activities.read().get(reference).cloned(),
            FlowKind::Flow => self.flows.read().get(reference).cloned(),
        }
    }

    pub fn list(&self, kind: FlowKind) -> Vec<String> {
        let mut names: Vec<String> = match kind {
            FlowKind::Activity => self.activities.read().keys().cloned().collect(),
            FlowKind::Flow => self.flows.read().keys().cloned().collect(),
        };
        names.sort();
        names
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("activities", &self.list(FlowKind::Activity))
            .field("flows", &self.list(FlowKind::Flow))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FlowSettings {
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowRequest {
    pub inputs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowResponse {
    pub outputs: Map<String, Value>,
}

pub struct FlowService {
    name: String,
    kind: FlowKind,
    reference: String,
    unit: Arc<dyn FlowUnit>,
    request: FlowRequest,
    response: Option<FlowResponse>,
}

impl FlowService {
    /// Resolve `ref` now so a typo fails warm-up rather than the first event.
    pub fn from_config(
        definition: &ServiceConfig,
        kind: FlowKind,
        registry: &Arc<FlowRegistry>,
    ) -> Result<Self, ConfigError> {
        let settings: FlowSettings = parse_settings(definition)?;
        let unit = registry.lookup(kind, &settings.reference).ok_or_else(|| {
            ConfigError::invalid_settings(
                &definition.name,
                definition.service_type,
                format!("no {} registered as '{}'", kind.service_type(), settings.reference),
            )
        })?;

        Ok(Self {
            name: definition.name.clone(),
            kind,
            reference: settings.reference,
            unit,
            request: FlowRequest::default(),
            response: None,
        })
    }
}

#[async_trait]
impl Service for FlowService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        self.kind.service_type()
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let outputs = self
            .unit
            .invoke(self.request.inputs.clone())
            .await
            .map_err(|reason| ServiceError::Flow {
                reference: self.reference.clone(),
                reason,
            })?;

        self.response = Some(FlowResponse { outputs });
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({
            "request": serde_json::to_value(&self.request).unwrap_or(Value::Null),
            "response": self.response.as_ref().map_or(Value::Null, |r| {
                serde_json::to_value(r).unwrap_or(Value::Null)
            }),
        })
    }

    fn fork(&self) -> Box<dyn Service> {
        Box::new(Self {
            name: self.name.clone(),
            kind: self.kind,
            reference: self.reference.clone(),
            unit: self.unit.clone(),
            request: FlowRequest::default(),
            response: None,
        })
    }
}
