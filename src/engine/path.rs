// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{Map, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ServiceMap, Step};
use crate::engine::context::ExecutionContext;
use crate::errors::{EngineError, EvalError};
use crate::evaluator::Vm;
use crate::mapping::translate_and_expand;
use crate::observability::messages::engine::{ConditionEvaluationFailed, StepCompleted, StepFailed, StepSkipped};
use crate::observability::messages::StructuredLog;
use crate::traits::Service;

/// One line of execution through a route: its own sandbox and its own service
/// instances, over a context it may share.
///
/// A service is forked from its prototype the first time a step names it; later
/// steps naming the same service reuse that instance, so request fields set by an
/// earlier step carry over.
pub struct ExecutionPath {
    vm: Vm,
    services: Arc<ServiceMap>,
    context: ExecutionContext,
    instances: HashMap<String, Box<dyn Service>>,
}

impl ExecutionPath {
    pub fn new(vm: Vm, services: Arc<ServiceMap>, context: ExecutionContext) -> Self {
        Self {
            vm,
            services,
            context,
            instances: HashMap::new(),
        }
    }

    /// Build a sandbox seeded with the context's bindings and the `async` flag.
    pub fn sandbox(payload: &Value, env: &Map<String, Value>, is_async: bool) -> Result<Vm, EvalError> {
        let mut vm = Vm::new()?;
        vm.set_in_vm("payload", payload)?;
        vm.set_in_vm("env", env)?;
        vm.set_primitive_in_vm("async", is_async)?;
        Ok(vm)
    }

    pub fn vm(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Evaluate a guard, treating any evaluation failure as false.
    pub fn holds(&mut self, condition: &str, location: &str) -> bool {
        match self.vm.evaluate_to_bool(condition) {
            Ok(result) => result,
            Err(error) => {
                ConditionEvaluationFailed {
                    location,
                    expression: condition,
                    error: &error,
                }
                .log();
                false
            }
        }
    }

    /// Run the steps in order, stopping at the first one that fails.
    pub async fn run_steps(&mut self, steps: &[Step]) -> Result<(), EngineError> {
        for (index, step) in steps.iter().enumerate() {
            if !self.holds(&step.condition, &format!("step {}", index)) {
                StepSkipped {
                    step_index: index,
                    service: &step.service,
                }
                .log();
                continue;
            }
            self.run_step(index, step).await?;
        }
        Ok(())
    }

    async fn run_step(&mut self, index: usize, step: &Step) -> Result<(), EngineError> {
        let input = self.context.read(|ctx| translate_and_expand(ctx, &step.input))?;

        let service = match self.instances.entry(step.service.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let fork = self
                    .services
                    .fork(&step.service)
                    .ok_or_else(|| EngineError::ServiceNotFound {
                        step: index,
                        service: step.service.clone(),
                    })?;
                entry.insert(fork)
            }
        };

        let start = Instant::now();
        let outcome = match service.update_request(&input) {
            Ok(()) => service.execute().await,
            Err(error) => Err(error),
        };

        // Failed services still publish their state; a tripped breaker says so in
        // its response.
        let snapshot = service.snapshot();
        self.vm.set_in_vm(&step.service, &snapshot)?;
        self.context.insert(&step.service, snapshot);

        match outcome {
            Ok(()) => {
                StepCompleted {
                    step_index: index,
                    service: &step.service,
                    duration: start.elapsed(),
                }
                .log();
                Ok(())
            }
            Err(error) => {
                StepFailed {
                    step_index: index,
                    service: &step.service,
                    error: &error,
                }
                .log();
                Err(EngineError::StepFailed {
                    step: index,
                    service: step.service.clone(),
                    source: error,
                })
            }
        }
    }
}

impl std::fmt::Debug for ExecutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPath")
            .field("context", &self.context)
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}
