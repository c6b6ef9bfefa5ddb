// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use crate::backends::{Collaborators, ServiceFactory};
use crate::config::GatewayConfig;
use crate::errors::ConfigError;
use crate::traits::Service;

/// The warm service prototypes of one gateway, keyed by service name.
///
/// Prototypes are built once at warm-up and never executed directly. Each execution
/// path calls [`ServiceMap::fork`] to get its own instance, which shares the
/// prototype's expensive resources (HTTP client, compiled regexes, gRPC channel,
/// shared-state tables) but owns its request and response.
///
/// # Example
/// ```ignore
/// use microgateway::backends::Collaborators;
/// use microgateway::config::{parse_config, ConfigFormat, ServiceMap};
///
/// let cfg = parse_config(document, ConfigFormat::Json)?;
/// let services = ServiceMap::from_config(&cfg, &Collaborators::default())?;
///
/// let mut limiter = services.fork("Limiter").expect("defined");
/// limiter.execute().await?;
/// ```
#[derive(Default)]
pub struct ServiceMap(pub HashMap<String, Box<dyn Service>>);

impl ServiceMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Build a prototype for every service the gateway defines.
    pub fn from_config(cfg: &GatewayConfig, collaborators: &Collaborators) -> Result<Self, ConfigError> {
        let mut services = HashMap::new();

        for definition in &cfg.services {
            let service = ServiceFactory::initialize(definition, collaborators)?;
            services.insert(definition.name.clone(), service);
        }

        Ok(Self(services))
    }

    pub fn insert(&mut self, name: String, service: Box<dyn Service>) {
        self.0.insert(name, service);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Service> {
        self.0.get(name).map(|s| s.as_ref())
    }

    /// A fresh per-path instance of the named service.
    pub fn fork(&self, name: &str) -> Option<Box<dyn Service>> {
        self.0.get(name).map(|s| s.fork())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ServiceMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMap")
            .field("service_count", &self.0.len())
            .field("service_names", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl From<HashMap<String, Box<dyn Service>>> for ServiceMap {
    fn from(map: HashMap<String, Box<dyn Service>>) -> Self {
        Self(map)
    }
}
