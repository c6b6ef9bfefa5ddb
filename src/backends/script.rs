// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::backends::{merge_request, parse_settings};
use crate::config::consts::DEFAULT_SCRIPT_TIMEOUT_MS;
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, EvalError, ServiceError};
use crate::evaluator::Vm;
use crate::observability::messages::service::ScriptFailed;
use crate::observability::messages::StructuredLog;
use crate::traits::Service;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptSettings {
    script: String,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptRequest {
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResponse {
    pub result: Value,
    pub error: bool,
    pub error_message: String,
}

/// Runs an author-supplied script in a fresh sandbox.
///
/// The script sees `parameters` and mutates the global `result` object, which is
/// read back as the response. A throwing or runaway script is reported through
/// `error` / `errorMessage` rather than failing the step.
pub struct ScriptService {
    name: String,
    settings: Arc<ScriptSettings>,
    request: ScriptRequest,
    response: Option<ScriptResponse>,
}

impl ScriptService {
    pub fn from_config(definition: &ServiceConfig) -> Result<Self, ConfigError> {
        let settings: ScriptSettings = parse_settings(definition)?;
        if settings.script.trim().is_empty() {
            return Err(ConfigError::invalid_settings(
                &definition.name,
                definition.service_type,
                "script must not be empty",
            ));
        }
        Ok(Self::with_settings(definition.name.clone(), Arc::new(settings)))
    }

    fn with_settings(name: String, settings: Arc<ScriptSettings>) -> Self {
        Self {
            name,
            settings,
            request: ScriptRequest::default(),
            response: None,
        }
    }

    pub fn response(&self) -> Option<&ScriptResponse> {
        self.response.as_ref()
    }
}

fn run_script(script: &str, parameters: &Map<String, Value>, timeout: Duration) -> Result<Value, EvalError> {
    let mut vm = Vm::with_timeout(timeout)?;
    vm.set_in_vm("parameters", parameters)?;
    vm.set_in_vm("result", &Map::new())?;
    vm.run(script)?;
    vm.get_from_vm("result")
}

#[async_trait]
impl Service for ScriptService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Js
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let settings = self.settings.clone();
        let parameters = self.request.parameters.clone();
        let timeout = Duration::from_millis(settings.timeout_ms.unwrap_or(DEFAULT_SCRIPT_TIMEOUT_MS));

        // QuickJS is synchronous; keep it off the async workers.
        let outcome = tokio::task::spawn_blocking(move || run_script(&settings.script, &parameters, timeout))
            .await
            .map_err(|e| EvalError::Script(format!("script task failed: {}", e)))?;

        let response = match outcome {
            Ok(result) => ScriptResponse {
                result,
                ..Default::default()
            },
            Err(EvalError::Init(reason)) => return Err(EvalError::Init(reason).into()),
            Err(error) => {
                let message = error.to_string();
                ScriptFailed {
                    service: &self.name,
                    error: &message,
                }
                .log();
                ScriptResponse {
                    result: Value::Null,
                    error: true,
                    error_message: message,
                }
            }
        };

        self.response = Some(response);
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
        Box::new(Self::with_settings(self.name.clone(), self.settings.clone()))
    }
}
