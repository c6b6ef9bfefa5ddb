// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Per-event bindings: `payload`, `env` and one snapshot per service that ran.
///
/// Cloning shares the bindings, which is how a detached route writes its step
/// outputs into the same context the caller reads. Access goes through closures so
/// no lock is ever held across an await point.
#[derive(Clone, Default)]
pub struct ExecutionContext(Arc<RwLock<Map<String, Value>>>);

impl ExecutionContext {
    pub fn new(payload: Value, env: Map<String, Value>) -> Self {
        let mut bindings = Map::new();
        bindings.insert("payload".to_string(), payload);
        bindings.insert("env".to_string(), Value::Object(env));
        Self(Arc::new(RwLock::new(bindings)))
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.0.write().insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> R {
        f(&self.0.read())
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.0.read().clone()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.0.read().keys().cloned().collect();
        f.debug_tuple("ExecutionContext").field(&keys).finish()
    }
}
