// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bridge onto registered gRPC client stubs.
//!
//! Generated clients are registered in a [`GrpcRegistry`] under their
//! `(protoName, serviceName)` pair. The service dials `hosturl` lazily on first use
//! and hands the channel to the registered factory; every fork of the prototype
//! shares the resulting stub.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tonic::transport::Endpoint;

use crate::backends::{merge_request, parse_settings};
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::traits::{GrpcClientFactory, GrpcClientStub, Service};

/// Client factories by `(protoName, serviceName)`.
#[derive(Default)]
pub struct GrpcRegistry {
    factories: RwLock<HashMap<(String, String), GrpcClientFactory>>,
}

impl GrpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, proto: impl Into<String>, service: impl Into<String>, factory: GrpcClientFactory) {
        self.factories.write().insert((proto.into(), service.into()), factory);
    }

    pub fn lookup(&self, proto: &str, service: &str) -> Option<GrpcClientFactory> {
        self.factories
            .read()
            .get(&(proto.to_string(), service.to_string()))
            .cloned()
    }

    pub fn list(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.factories.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for GrpcRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcRegistry")
            .field("factories", &self.list())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Call `methodName` with `params` as the typed request.
    GrpcToGrpc,
    /// Hand REST-shaped input (`headers`, `pathParams`, `queryParams`, `content`)
    /// to the client.
    RestToGrpc,
}

impl OperatingMode {
    fn parse(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "" | "grpc-to-grpc" => Some(Self::GrpcToGrpc),
            "rest-to-grpc" => Some(Self::RestToGrpc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrpcSettings {
    hosturl: String,
    #[serde(default)]
    proto_name: String,
    #[serde(default)]
    service_name: String,
    #[serde(default)]
    operating_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrpcRequest {
    pub method_name: String,
    pub params: Value,
    pub headers: Map<String, Value>,
    pub path_params: Map<String, Value>,
    pub query_params: Map<String, Value>,
    pub content: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GrpcResponse {
    pub body: Value,
}

/// Dial target and stub, shared by a prototype and its forks.
struct Connection {
    endpoint: Endpoint,
    factory: GrpcClientFactory,
    client: Mutex<Option<Arc<dyn GrpcClientStub>>>,
}

impl Connection {
    fn client(&self) -> Arc<dyn GrpcClientStub> {
        let mut client = self.client.lock();
        if let Some(existing) = client.as_ref() {
            return existing.clone();
        }
        let created: Arc<dyn GrpcClientStub> = Arc::from((self.factory)(self.endpoint.connect_lazy()));
        *client = Some(created.clone());
        created
    }
}

pub struct GrpcService {
    name: String,
    mode: OperatingMode,
    connection: Arc<Connection>,
    request: GrpcRequest,
    response: Option<GrpcResponse>,
}

impl GrpcService {
    pub fn from_config(definition: &ServiceConfig, registry: &Arc<GrpcRegistry>) -> Result<Self, ConfigError> {
        let settings: GrpcSettings = parse_settings(definition)?;
        let invalid =
            |reason: String| ConfigError::invalid_settings(&definition.name, definition.service_type, reason);

        let mode = OperatingMode::parse(&settings.operating_mode).ok_or_else(|| {
            invalid(format!(
                "unknown operatingMode '{}' (expected grpc-to-grpc or rest-to-grpc)",
                settings.operating_mode
            ))
        })?;
        let endpoint = Endpoint::from_shared(settings.hosturl.clone())
            .map_err(|e| invalid(format!("hosturl '{}': {}", settings.hosturl, e)))?;
        let factory = registry
            .lookup(&settings.proto_name, &settings.service_name)
            .ok_or_else(|| {
                invalid(format!(
                    "no client registered for proto '{}' service '{}'",
                    settings.proto_name, settings.service_name
                ))
            })?;

        Ok(Self {
            name: definition.name.clone(),
            mode,
            connection: Arc::new(Connection {
                endpoint,
                factory,
                client: Mutex::new(None),
            }),
            request: GrpcRequest::default(),
            response: None,
        })
    }

    fn invocation(&self) -> Result<Map<String, Value>, ServiceError> {
        let request = &self.request;
        let mut invocation = Map::new();
        invocation.insert("methodName".to_string(), json!(request.method_name));

        match self.mode {
            OperatingMode::GrpcToGrpc => {
                if request.method_name.is_empty() {
                    return Err(ServiceError::invalid_request(&self.name, "methodName is required"));
                }
                invocation.insert("params".to_string(), request.params.clone());
            }
            OperatingMode::RestToGrpc => {
                invocation.insert("headers".to_string(), Value::Object(request.headers.clone()));
                invocation.insert("pathParams".to_string(), Value::Object(request.path_params.clone()));
                invocation.insert("queryParams".to_string(), Value::Object(request.query_params.clone()));
                invocation.insert("content".to_string(), request.content.clone());
            }
        }
        Ok(invocation)
    }
}

#[async_trait]
impl Service for GrpcService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Grpc
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let invocation = self.invocation()?;
        let client = self.connection.client();
        let result = client.invoke_method(invocation).await;

        self.response = Some(GrpcResponse {
            body: Value::Object(result),
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
            mode: self.mode,
            connection: self.connection.clone(),
            request: GrpcRequest::default(),
            response: None,
        })
    }
}
