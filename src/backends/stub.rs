// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceType;
use crate::errors::ServiceError;
use crate::traits::Service;

/// A service that counts its invocations and echoes its request.
///
/// The counter is shared by every fork, so tests can assert on invocations made
/// through the engine.
pub struct CountingService {
    pub name: String,
    pub calls: Arc<AtomicUsize>,
    pub delay: Option<Duration>,
    request: Map<String, Value>,
    response: Option<Value>,
}

impl CountingService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
            request: Map::new(),
            response: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Service for CountingService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Js
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        for (key, value) in values {
            if value.is_null() {
                self.request.remove(key);
            } else {
                self.request.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.response = Some(json!({"calls": calls, "echo": self.request}));
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({
            "request": self.request,
            "response": self.response.clone().unwrap_or(Value::Null),
        })
    }

    fn fork(&self) -> Box<dyn Service> {
        Box::new(Self {
            name: self.name.clone(),
            calls: self.calls.clone(),
            delay: self.delay,
            request: Map::new(),
            response: None,
        })
    }
}

/// A service whose every execution fails.
pub struct FailingService {
    pub name: String,
}

impl FailingService {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Service for FailingService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Activity
    }

    fn update_request(&mut self, _values: &Map<String, Value>) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        Err(ServiceError::Flow {
            reference: self.name.clone(),
            reason: "simulated failure".to_string(),
        })
    }

    fn snapshot(&self) -> Value {
        json!({"request": {}, "response": null})
    }

    fn fork(&self) -> Box<dyn Service> {
        Box::new(Self::new(self.name.clone()))
    }
}
