// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors produced by the sandboxed script evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Failed to initialize script sandbox: {0}")]
    Init(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Script exceeded its execution time limit")]
    Timeout,

    #[error("Expression '{expression}' evaluated to {found}, expected a boolean")]
    NotBoolean { expression: String, found: String },

    #[error("Value could not be marshaled across the sandbox boundary: {0}")]
    Marshal(#[from] serde_json::Error),
}
