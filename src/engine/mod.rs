// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The dispatch engine.
//!
//! For one event the engine picks the first route whose guard holds, runs that
//! route's steps (inline, or detached on a [`TaskTracker`] for async routes), then
//! picks the first response whose guard holds and resolves its output into a
//! [`Reply`].
//!
//! Every execution path owns its own [`Vm`](crate::evaluator::Vm). The sync path
//! and a detached path share only the [`ExecutionContext`], so response guards of
//! an async route see `async == true` but no guarantee of any step output.

mod context;
mod path;

#[cfg(test)]
mod integration_tests;

pub use context::ExecutionContext;
pub use path::ExecutionPath;

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::config::{Route, ServiceMap};
use crate::errors::EngineError;
use crate::mapping::{extract_code, translate_value};
use crate::observability::messages::engine::{
    DetachedRouteFailed, DetachedRouteStarted, ExecutionCompleted, ExecutionStarted, NoResponseMatched,
    NoRouteMatched, ResponseSelected, RouteSelected,
};
use crate::observability::messages::StructuredLog;

/// What the trigger writes back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub code: u16,
    pub data: Value,
    /// The selected response was flagged as an error reply.
    pub error: bool,
}

#[derive(Debug)]
pub struct Engine {
    env: Map<String, Value>,
    tracker: TaskTracker,
}

impl Engine {
    pub fn new(env: Map<String, Value>) -> Self {
        Self {
            env,
            tracker: TaskTracker::new(),
        }
    }

    pub fn env(&self) -> &Map<String, Value> {
        &self.env
    }

    /// Number of detached routes still running.
    pub fn detached_count(&self) -> usize {
        self.tracker.len()
    }

    /// Handle one event. `Ok(None)` means the event gets no reply.
    pub async fn execute(
        &self,
        payload: Value,
        routes: &[Route],
        services: &Arc<ServiceMap>,
    ) -> Result<Option<Reply>, EngineError> {
        let started = ExecutionStarted {
            route_count: routes.len(),
        };
        started.log();
        let span = started.span("execute");

        let start = Instant::now();
        let result = self.run(payload, routes, services).instrument(span).await;

        if let Ok(reply) = &result {
            ExecutionCompleted {
                code: reply.as_ref().map(|r| r.code),
                duration: start.elapsed(),
            }
            .log();
        }
        result
    }

    async fn run(
        &self,
        payload: Value,
        routes: &[Route],
        services: &Arc<ServiceMap>,
    ) -> Result<Option<Reply>, EngineError> {
        let vm = ExecutionPath::sandbox(&payload, &self.env, false)?;
        let context = ExecutionContext::new(payload, self.env.clone());
        let mut primary = ExecutionPath::new(vm, services.clone(), context.clone());

        let selected = routes
            .iter()
            .enumerate()
            .find(|(index, route)| primary.holds(&route.condition, &format!("route {}", index)));

        let Some((route_index, route)) = selected else {
            NoRouteMatched {
                route_count: routes.len(),
            }
            .log();
            return Ok(None);
        };

        RouteSelected {
            route_index,
            is_async: route.is_async,
            step_count: route.steps.len(),
        }
        .log();

        let mut step_error = None;
        if route.is_async {
            self.detach(route_index, route, services, &context)?;
            primary.vm().set_primitive_in_vm("async", true)?;
        } else {
            match primary.run_steps(&route.steps).await {
                Ok(()) => {}
                Err(error @ EngineError::StepFailed { .. }) => step_error = Some(error),
                Err(error) => return Err(error),
            }
        }

        let response = route
            .responses
            .iter()
            .enumerate()
            .find(|(index, response)| primary.holds(&response.condition, &format!("response {}", index)));

        let Some((response_index, response)) = response else {
            NoResponseMatched {
                response_count: route.responses.len(),
            }
            .log();
            return match step_error {
                Some(error) => Err(error),
                None => Ok(None),
            };
        };

        let (code, data) = context.read(|ctx| {
            let code = translate_value(ctx, &response.output.code)?;
            let data = translate_value(ctx, &response.output.data)?;
            Ok::<_, EngineError>((extract_code(&code), data))
        })?;

        ResponseSelected {
            response_index,
            code,
            error: response.error,
        }
        .log();

        Ok(Some(Reply {
            code,
            data,
            error: response.error,
        }))
    }

    /// Run a route's steps on their own sandbox without waiting for them.
    fn detach(
        &self,
        route_index: usize,
        route: &Route,
        services: &Arc<ServiceMap>,
        context: &ExecutionContext,
    ) -> Result<(), EngineError> {
        let payload = context.get("payload").unwrap_or(Value::Null);
        let vm = ExecutionPath::sandbox(&payload, &self.env, true)?;
        let mut path = ExecutionPath::new(vm, services.clone(), context.clone());
        let steps = route.steps.clone();

        let started = DetachedRouteStarted {
            route_index,
            step_count: steps.len(),
        };
        started.log();
        let span = started.span("detached_route");

        self.tracker.spawn(
            async move {
                if let Err(error) = path.run_steps(&steps).await {
                    DetachedRouteFailed {
                        route_index,
                        error: &error,
                    }
                    .log();
                }
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Wait for every detached route spawned so far, then accept new ones again.
    pub async fn wait_detached(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
