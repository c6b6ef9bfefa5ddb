// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Payload anomaly detection.
//!
//! Each context keeps a [`ComplexityModel`] and the running statistics of the
//! costs it has produced. A payload's cost is compared with the history of its
//! context as a z-score; once the context has seen `depth` payloads, a score
//! beyond `threshold` marks the payload anomalous.

pub mod model;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::backends::{merge_request, parse_settings};
use crate::config::consts::{DEFAULT_ANOMALY_DEPTH, DEFAULT_ANOMALY_THRESHOLD};
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::observability::messages::service::AnomalyDetected;
use crate::observability::messages::StructuredLog;
use crate::state::SharedState;
use crate::traits::Service;

pub use model::{ComplexityModel, RunningStats};

/// Model and cost history for one context.
#[derive(Debug, Default)]
pub struct AnomalyState {
    model: ComplexityModel,
    stats: RunningStats,
}

impl AnomalyState {
    /// Cost `data`, score it against the history so far, then add it to the
    /// history. The score is zero until `depth` samples have been seen.
    pub fn observe(&mut self, data: &[u8], depth: u64) -> (f64, u64) {
        let bits = self.model.cost(data);
        let z = if self.stats.count() >= depth {
            self.stats.z_score(bits)
        } else {
            0.0
        };
        self.stats.push(bits);
        (z, self.stats.count())
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct AnomalySettings {
    depth: u64,
    threshold: f64,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            depth: DEFAULT_ANOMALY_DEPTH,
            threshold: DEFAULT_ANOMALY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnomalyRequest {
    pub payload: Value,
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnomalyResponse {
    pub complexity: f64,
    pub count: u64,
    pub anomalous: bool,
}

pub struct AnomalyService {
    name: String,
    settings: Arc<AnomalySettings>,
    state: Arc<SharedState>,
    request: AnomalyRequest,
    response: Option<AnomalyResponse>,
}

impl AnomalyService {
    pub fn from_config(definition: &ServiceConfig, state: Arc<SharedState>) -> Result<Self, ConfigError> {
        let settings: AnomalySettings = parse_settings(definition)?;
        if !(settings.threshold.is_finite() && settings.threshold > 0.0) {
            return Err(ConfigError::invalid_settings(
                &definition.name,
                definition.service_type,
                format!("threshold must be a positive number, got {}", settings.threshold),
            ));
        }

        Ok(Self {
            name: definition.name.clone(),
            settings: Arc::new(settings),
            state,
            request: AnomalyRequest::default(),
            response: None,
        })
    }
}

#[async_trait]
impl Service for AnomalyService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Anomaly
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let context = if self.request.context.is_empty() {
            self.name.clone()
        } else {
            self.request.context.clone()
        };
        let data = serde_json::to_vec(&self.request.payload)
            .map_err(|e| ServiceError::invalid_request(&self.name, e.to_string()))?;

        let entry = self.state.anomaly.get_or_insert_with(&context, AnomalyState::default);
        let (complexity, count) = entry.write().observe(&data, self.settings.depth);
        let anomalous = complexity.abs() > self.settings.threshold;

        if anomalous {
            AnomalyDetected {
                service: &self.name,
                context: &context,
                complexity,
            }
            .log();
        }

        self.response = Some(AnomalyResponse {
            complexity,
            count,
            anomalous,
        });
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
            settings: self.settings.clone(),
            state: self.state.clone(),
            request: AnomalyRequest::default(),
            response: None,
        })
    }
}
