// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::errors::{EvalError, MappingError, ServiceError};

/// Errors surfaced by the dispatch engine to the calling trigger.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Step {step} failed invoking service '{service}': {source}")]
    StepFailed {
        step: usize,
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("Step {step} references service '{service}' which is not registered")]
    ServiceNotFound { step: usize, service: String },

    #[error("Unknown dispatch '{0}'")]
    UnknownDispatch(String),

    #[error("Trigger '{trigger}' has no handler {handler}")]
    UnknownHandler { trigger: String, handler: usize },

    #[error("Failed to prepare the evaluator environment: {0}")]
    Evaluator(#[from] EvalError),

    #[error("Failed to resolve response output: {0}")]
    Mapping(#[from] MappingError),
}
