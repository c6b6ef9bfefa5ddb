// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Warm-up and caching of gateway instances.
//!
//! A gateway document is turned into a [`WarmGateway`] once per instance identifier:
//! services are built, dispatches become immutable route tables and the process
//! environment is snapshotted. Triggers then hand events to the warm gateway, which
//! runs them through its [`Engine`].

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::Collaborators;
use crate::config::{validate_gateway, GatewayConfig, Route, ServiceMap};
use crate::engine::{Engine, Reply};
use crate::errors::{ConfigError, EngineError};
use crate::observability::messages::config::{GatewayEvicted, GatewayWarmedUp};
use crate::observability::messages::StructuredLog;

/// Process-wide cache of warm gateways keyed by instance identifier.
///
/// Created at startup and passed by reference to whatever hosts the triggers.
pub struct GatewayRegistry {
    collaborators: Collaborators,
    gateways: RwLock<HashMap<String, Arc<WarmGateway>>>,
}

impl GatewayRegistry {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            gateways: RwLock::new(HashMap::new()),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Warm up a gateway, or return the cached instance for `id`.
    ///
    /// The document is validated first; a document with problems never gets cached.
    pub fn warm_up(&self, id: &str, cfg: &GatewayConfig) -> Result<Arc<WarmGateway>, ConfigError> {
        if let Some(existing) = self.gateways.read().get(id) {
            return Ok(existing.clone());
        }

        validate_gateway(cfg).map_err(ConfigError::Invalid)?;
        let warm = Arc::new(WarmGateway::build(cfg, &self.collaborators, env_snapshot())?);

        let mut gateways = self.gateways.write();
        // Another caller may have finished warming the same id while we were building.
        let entry = gateways.entry(id.to_string()).or_insert_with(|| warm.clone());

        GatewayWarmedUp {
            instance: id,
            gateway: &cfg.name,
            service_count: entry.services.len(),
            dispatch_count: entry.routes.len(),
        }
        .log();

        Ok(entry.clone())
    }

    pub fn get(&self, id: &str) -> Option<Arc<WarmGateway>> {
        self.gateways.read().get(id).cloned()
    }

    /// Drop one cached gateway. In-flight executions keep their own reference.
    pub fn evict(&self, id: &str) -> bool {
        let removed = self.gateways.write().remove(id).is_some();
        if removed {
            GatewayEvicted { instance: id }.log();
        }
        removed
    }

    pub fn clear(&self) {
        self.gateways.write().clear();
    }

    pub fn len(&self) -> usize {
        self.gateways.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.read().is_empty()
    }
}

/// One gateway, ready to serve events.
pub struct WarmGateway {
    name: String,
    engine: Engine,
    services: Arc<ServiceMap>,
    routes: HashMap<String, Arc<[Route]>>,
    bindings: HashMap<String, Vec<String>>,
}

impl WarmGateway {
    /// Build a gateway with an explicit environment snapshot.
    pub fn build(
        cfg: &GatewayConfig,
        collaborators: &Collaborators,
        env: Map<String, Value>,
    ) -> Result<Self, ConfigError> {
        let services = Arc::new(ServiceMap::from_config(cfg, collaborators)?);

        let routes: HashMap<String, Arc<[Route]>> = cfg
            .dispatches
            .iter()
            .map(|d| (d.name.clone(), Arc::from(d.routes.clone())))
            .collect();

        let bindings: HashMap<String, Vec<String>> = cfg
            .triggers
            .iter()
            .map(|t| (t.name.clone(), t.handlers.iter().map(|h| h.dispatch.clone()).collect()))
            .collect();

        Ok(Self {
            name: cfg.name.clone(),
            engine: Engine::new(env),
            services,
            routes,
            bindings,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a named dispatch against one event payload.
    pub async fn dispatch(&self, name: &str, payload: Value) -> Result<Option<Reply>, EngineError> {
        let routes = self
            .routes
            .get(name)
            .ok_or_else(|| EngineError::UnknownDispatch(name.to_string()))?;
        self.engine.execute(payload, routes, &self.services).await
    }

    /// Run whichever dispatch the given trigger handler is bound to.
    pub async fn dispatch_for_handler(
        &self,
        trigger: &str,
        handler: usize,
        payload: Value,
    ) -> Result<Option<Reply>, EngineError> {
        let dispatch = self
            .bindings
            .get(trigger)
            .and_then(|handlers| handlers.get(handler))
            .ok_or_else(|| EngineError::UnknownHandler {
                trigger: trigger.to_string(),
                handler,
            })?;
        self.dispatch(dispatch, payload).await
    }

    pub fn routes(&self, dispatch: &str) -> Option<Arc<[Route]>> {
        self.routes.get(dispatch).cloned()
    }

    pub fn services(&self) -> &Arc<ServiceMap> {
        &self.services
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Wait for every detached async route started so far.
    pub async fn wait_detached(&self) {
        self.engine.wait_detached().await;
    }
}

impl std::fmt::Debug for WarmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmGateway")
            .field("name", &self.name)
            .field("services", &self.services)
            .field("dispatches", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The process environment as a JSON object, read once.
pub fn env_snapshot() -> Map<String, Value> {
    std::env::vars().map(|(k, v)| (k, Value::String(v))).collect()
}
