// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors returned by built-in services from `update_request` and `execute`.

use thiserror::Error;

use crate::errors::EvalError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The circuit breaker for this context is open. The service response also
    /// carries `tripped = true` so responses can branch on it.
    #[error("Circuit breaker '{context}' is tripped")]
    CircuitBreakerTripped { context: String },

    #[error("Invalid request for service '{service}': {reason}")]
    InvalidRequest { service: String, reason: String },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decompress gzip response from {url}: {source}")]
    Decompress {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JWT key material for service '{service}' is unusable: {reason}")]
    Jwt { service: String, reason: String },

    #[error("Flow unit '{reference}' failed: {reason}")]
    Flow { reference: String, reason: String },

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl ServiceError {
    pub fn invalid_request(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Domain errors are expected outcomes of a stateful service, not failures of it.
    pub fn is_domain_error(&self) -> bool {
        matches!(self, Self::CircuitBreakerTripped { .. })
    }
}
